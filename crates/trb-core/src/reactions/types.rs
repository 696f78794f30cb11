use std::collections::HashMap;

use crate::domain::{ChatId, MessageId, UserId};

/// Inbound message notification from the messaging adapter.
#[derive(Clone, Debug)]
pub struct MessageEvent {
    pub chat_id: ChatId,
    pub message_id: MessageId,
    /// Absent for anonymous/channel senders.
    pub sender: Option<UserId>,
    /// Service messages (joins, pins, topic edits) carry no user content.
    pub service: bool,
    pub reply_to: Option<ReplyTarget>,
}

/// What a message replies to, as far as the topic filter cares.
#[derive(Clone, Copy, Debug)]
pub struct ReplyTarget {
    pub message_id: MessageId,
    /// True when the referenced message is a forum-topic root post.
    pub forum_topic: bool,
}

/// Aggregate reaction counts for one message at one point in time.
///
/// Fetched fresh on every poll; the lifecycle never caches one beyond a
/// single decision point.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReactionSnapshot {
    counts: HashMap<String, u32>,
}

impl ReactionSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a count. Zero counts are dropped so "present" == "count > 0".
    pub fn insert(&mut self, emoji: impl Into<String>, count: u32) {
        if count > 0 {
            self.counts.insert(emoji.into(), count);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Number of distinct emojis present.
    pub fn distinct(&self) -> usize {
        self.counts.len()
    }

    pub fn count(&self, emoji: &str) -> u32 {
        self.counts.get(emoji).copied().unwrap_or(0)
    }

    /// The most common emoji other than `excluded`, with its count.
    ///
    /// Ties are broken by emoji ordering so the result is deterministic.
    pub fn most_common_excluding(&self, excluded: &str) -> Option<(&str, u32)> {
        self.counts
            .iter()
            .filter(|(emoji, _)| emoji.as_str() != excluded)
            .max_by(|a, b| a.1.cmp(b.1).then_with(|| a.0.cmp(b.0)))
            .map(|(emoji, count)| (emoji.as_str(), *count))
    }
}

impl FromIterator<(String, u32)> for ReactionSnapshot {
    fn from_iter<T: IntoIterator<Item = (String, u32)>>(iter: T) -> Self {
        let mut snapshot = Self::new();
        for (emoji, count) in iter {
            snapshot.insert(emoji, count);
        }
        snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snap(pairs: &[(&str, u32)]) -> ReactionSnapshot {
        pairs
            .iter()
            .map(|(e, c)| (e.to_string(), *c))
            .collect()
    }

    #[test]
    fn zero_counts_are_not_present() {
        let mut s = ReactionSnapshot::new();
        s.insert("👍", 0);
        assert!(s.is_empty());
        assert_eq!(s.count("👍"), 0);
    }

    #[test]
    fn most_common_excluding_skips_the_excluded_emoji() {
        let s = snap(&[("👍", 5), ("❤️", 2), ("🔥", 3)]);
        assert_eq!(s.most_common_excluding("👍"), Some(("🔥", 3)));
        assert_eq!(s.most_common_excluding("🔥"), Some(("👍", 5)));
    }

    #[test]
    fn most_common_excluding_empty_when_alone() {
        let s = snap(&[("👍", 4)]);
        assert_eq!(s.most_common_excluding("👍"), None);
        assert_eq!(snap(&[]).most_common_excluding("👍"), None);
    }
}

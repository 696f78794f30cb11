//! Telegram adapter (teloxide).
//!
//! This crate implements the `trb-core` ReactionsPort over the Telegram Bot
//! API. Mutations go through `setMessageReaction`. The Bot API has no way to
//! read a message's reactions on demand; instead, aggregate counts arrive as
//! `message_reaction_count` updates (delivered only while the bot is a chat
//! administrator), which the update loop feeds into a [`ReactionRegistry`]
//! that `get_reactions` consults. The core keeps observing reactions purely
//! by polling the port; the push feed stays an adapter detail.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use teloxide::payloads::SetMessageReactionSetters;
use teloxide::prelude::*;
use teloxide::types::ReactionType;

use tokio::time::sleep;

pub mod handlers;
pub mod router;

use trb_core::{
    domain::{ChatId, MessageId, MessageRef},
    errors::Error,
    reactions::{port::ReactionsPort, types::ReactionSnapshot},
    Result,
};

/// Latest observed aggregate reaction counts, per message.
///
/// Messages we have never received a count update for read as "no reactions",
/// which is also what Telegram reports for them.
#[derive(Default)]
pub struct ReactionRegistry {
    counts: Mutex<HashMap<(i64, i32), ReactionSnapshot>>,
}

impl ReactionRegistry {
    pub fn record(&self, msg: MessageRef, snapshot: ReactionSnapshot) {
        let key = (msg.chat_id.0, msg.message_id.0);
        let mut counts = self.counts.lock().unwrap();
        if snapshot.is_empty() {
            counts.remove(&key);
        } else {
            counts.insert(key, snapshot);
        }
    }

    pub fn snapshot_for(&self, msg: MessageRef) -> ReactionSnapshot {
        let key = (msg.chat_id.0, msg.message_id.0);
        self.counts
            .lock()
            .unwrap()
            .get(&key)
            .cloned()
            .unwrap_or_default()
    }
}

pub struct TelegramReactions {
    bot: Bot,
    registry: Arc<ReactionRegistry>,
}

impl TelegramReactions {
    pub fn new(bot: Bot, registry: Arc<ReactionRegistry>) -> Self {
        Self { bot, registry }
    }

    fn tg_chat(chat_id: ChatId) -> teloxide::types::ChatId {
        teloxide::types::ChatId(chat_id.0)
    }

    fn tg_msg_id(message_id: MessageId) -> teloxide::types::MessageId {
        teloxide::types::MessageId(message_id.0)
    }

    fn map_err(e: teloxide::RequestError) -> Error {
        Error::External(format!("telegram error: {e}"))
    }
}

#[async_trait]
impl ReactionsPort for TelegramReactions {
    async fn set_reaction(&self, msg: MessageRef, emoji: Option<&str>) -> Result<()> {
        let reaction = match emoji {
            Some(e) => vec![ReactionType::Emoji {
                emoji: e.to_string(),
            }],
            None => Vec::new(),
        };

        // One retry on flood control; everything else surfaces to the caller.
        const MAX_RETRIES: usize = 1;
        let mut attempts = 0usize;
        loop {
            let req = self
                .bot
                .set_message_reaction(Self::tg_chat(msg.chat_id), Self::tg_msg_id(msg.message_id))
                .reaction(reaction.clone());
            match req.await {
                Ok(_) => return Ok(()),
                Err(teloxide::RequestError::RetryAfter(secs)) if attempts < MAX_RETRIES => {
                    attempts += 1;
                    sleep(secs.duration()).await;
                }
                Err(e) => return Err(Self::map_err(e)),
            }
        }
    }

    async fn get_reactions(&self, msg: MessageRef) -> Result<ReactionSnapshot> {
        Ok(self.registry.snapshot_for(msg))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(chat: i64, id: i32) -> MessageRef {
        MessageRef {
            chat_id: ChatId(chat),
            message_id: MessageId(id),
        }
    }

    fn snap(pairs: &[(&str, u32)]) -> ReactionSnapshot {
        pairs
            .iter()
            .map(|(e, c)| (e.to_string(), *c))
            .collect()
    }

    #[test]
    fn registry_returns_empty_for_unknown_messages() {
        let registry = ReactionRegistry::default();
        assert!(registry.snapshot_for(msg(1, 1)).is_empty());
    }

    #[test]
    fn registry_keeps_latest_counts_per_message() {
        let registry = ReactionRegistry::default();
        registry.record(msg(1, 1), snap(&[("👍", 1)]));
        registry.record(msg(1, 2), snap(&[("🔥", 3)]));
        registry.record(msg(1, 1), snap(&[("👍", 2), ("❤️", 1)]));

        let latest = registry.snapshot_for(msg(1, 1));
        assert_eq!(latest.count("👍"), 2);
        assert_eq!(latest.count("❤️"), 1);
        assert_eq!(registry.snapshot_for(msg(1, 2)).count("🔥"), 3);
    }

    #[test]
    fn registry_drops_messages_whose_reactions_vanished() {
        let registry = ReactionRegistry::default();
        registry.record(msg(1, 1), snap(&[("👍", 1)]));
        registry.record(msg(1, 1), snap(&[]));
        assert!(registry.snapshot_for(msg(1, 1)).is_empty());
    }
}

//! Per-message reaction lifecycle.
//!
//! Each accepted message gets an initial emoji reaction, a delayed re-check
//! (keep it, withdraw it, or switch to the crowd's choice), and, when the
//! reaction was withdrawn, a monitoring window that reacts once to late
//! activity. One state machine instance per tracked message; the tracked-map
//! entry owns the message's task graph and cancelling the entry cancels all
//! of it.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use chrono::{DateTime, Utc};
use rand::Rng;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    config::Config,
    domain::{MessageId, MessageRef, UserId},
    reactions::{
        port::ReactionsPort,
        types::{MessageEvent, ReactionSnapshot},
    },
};

/// Where a tracked message currently is in its lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrackState {
    /// Our reaction is on the message.
    Active,
    /// We withdrew our reaction; monitoring is about to start.
    Removed,
    /// The post-withdrawal watch window is running.
    Monitoring,
    /// The watch window ran out without new activity.
    Expired,
}

struct TrackedMessage {
    message: MessageRef,
    initial_reaction: String,
    current_reaction: String,
    created_at: DateTime<Utc>,
    state: TrackState,
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

/// Counters for the control surface.
#[derive(Clone, Copy, Debug)]
pub struct ManagerStats {
    pub enabled: bool,
    pub tracked: usize,
    pub monitoring: usize,
}

/// Owns one reaction state machine per tracked message.
#[derive(Clone)]
pub struct ReactionManager {
    inner: Arc<ManagerInner>,
}

struct ManagerInner {
    cfg: Arc<Config>,
    reactions: Arc<dyn ReactionsPort>,
    own_user: Option<UserId>,
    enabled: AtomicBool,
    tracked: tokio::sync::Mutex<HashMap<MessageId, TrackedMessage>>,
}

impl ReactionManager {
    pub fn new(
        cfg: Arc<Config>,
        reactions: Arc<dyn ReactionsPort>,
        own_user: Option<UserId>,
    ) -> Self {
        let enabled = cfg.start_enabled;
        Self {
            inner: Arc::new(ManagerInner {
                cfg,
                reactions,
                own_user,
                enabled: AtomicBool::new(enabled),
                tracked: tokio::sync::Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn enable(&self) {
        self.inner.enabled.store(true, Ordering::SeqCst);
        info!("auto-reactions enabled");
    }

    pub fn disable(&self) {
        self.inner.enabled.store(false, Ordering::SeqCst);
        info!("auto-reactions disabled");
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.enabled.load(Ordering::SeqCst)
    }

    pub async fn stats(&self) -> ManagerStats {
        let tracked = self.inner.tracked.lock().await;
        let monitoring = tracked
            .values()
            .filter(|t| t.state == TrackState::Monitoring)
            .count();
        ManagerStats {
            enabled: self.is_enabled(),
            tracked: tracked.len(),
            monitoring,
        }
    }

    /// Cancel every tracked message's pending work and forget them all.
    pub async fn stop(&self) {
        let mut tracked = self.inner.tracked.lock().await;
        for (_, entry) in tracked.drain() {
            entry.cancel.cancel();
            if let Some(handle) = entry.handle {
                handle.abort();
            }
        }
    }

    /// Entry point for inbound message events.
    ///
    /// Filters out everything we must not react to, then posts the initial
    /// reaction (after a human-like jitter) and starts tracking the message.
    /// Failures are absorbed here; one message's trouble never affects
    /// another's.
    pub async fn on_new_message(&self, event: MessageEvent) {
        if !self.is_enabled() {
            debug!("disabled, ignoring message {}", event.message_id.0);
            return;
        }
        if event.service {
            return;
        }
        if self.inner.cfg.ignore_own_messages {
            if let (Some(sender), Some(own)) = (event.sender, self.inner.own_user) {
                if sender == own {
                    return;
                }
            }
        }
        if !topic_matches(self.inner.cfg.topic_id, &event) {
            return;
        }
        if self
            .inner
            .tracked
            .lock()
            .await
            .contains_key(&event.message_id)
        {
            debug!("message {} already tracked", event.message_id.0);
            return;
        }

        let (jitter, emoji) = {
            let mut rng = rand::thread_rng();
            let min = self.inner.cfg.reaction_delay_min.as_secs_f64();
            let max = self.inner.cfg.reaction_delay_max.as_secs_f64();
            let pool = &self.inner.cfg.reactions;
            let emoji = pool[rng.gen_range(0..pool.len())].clone();
            (Duration::from_secs_f64(rng.gen_range(min..=max)), emoji)
        };
        sleep(jitter).await;

        let msg = MessageRef {
            chat_id: event.chat_id,
            message_id: event.message_id,
        };
        if let Err(e) = self.inner.reactions.set_reaction(msg, Some(&emoji)).await {
            warn!("failed to add {emoji} to {msg}: {e}");
            return;
        }
        info!("added {emoji} to {msg}");

        let cancel = CancellationToken::new();
        {
            let mut tracked = self.inner.tracked.lock().await;
            // A duplicate event may have slipped in while we slept.
            if tracked.contains_key(&event.message_id) {
                return;
            }
            tracked.insert(
                event.message_id,
                TrackedMessage {
                    message: msg,
                    initial_reaction: emoji.clone(),
                    current_reaction: emoji,
                    created_at: Utc::now(),
                    state: TrackState::Active,
                    cancel: cancel.clone(),
                    handle: None,
                },
            );
        }

        let manager = self.clone();
        let id = event.message_id;
        let task_cancel = cancel.clone();
        let handle = tokio::spawn(async move {
            manager.run_lifecycle(id, task_cancel).await;
        });

        let mut tracked = self.inner.tracked.lock().await;
        match tracked.get_mut(&id) {
            Some(entry) => entry.handle = Some(handle),
            // Stopped in the meantime; don't leave the task running.
            None => handle.abort(),
        }
    }

    async fn run_lifecycle(self, id: MessageId, cancel: CancellationToken) {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = sleep(self.inner.cfg.check_remove_delay) => {}
        }

        let monitor = self.check_and_manage(id).await;
        if monitor {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = self.monitor(id) => {}
            }
        }

        self.retire(id).await;
    }

    /// First re-check, once, after `check_remove_delay`.
    ///
    /// Returns whether the monitoring window should run.
    async fn check_and_manage(&self, id: MessageId) -> bool {
        let Some((msg, initial)) = self.tracked_identity(id).await else {
            return false;
        };

        let snapshot = match self.inner.reactions.get_reactions(msg).await {
            Ok(s) => s,
            Err(e) => {
                warn!("reaction lookup failed for {msg}: {e}");
                return false;
            }
        };

        match phase_one_action(&snapshot, &initial, self.inner.cfg.switch_threshold) {
            PhaseOneAction::Withdraw => {
                match self.inner.reactions.set_reaction(msg, None).await {
                    Ok(()) => info!("withdrew {initial} from {msg}: no one else reacted"),
                    Err(e) => warn!("failed to clear reaction on {msg}: {e}"),
                }
                self.set_state(id, TrackState::Removed).await;
                true
            }
            PhaseOneAction::Keep => {
                info!("keeping {initial} on {msg}: others reacted the same way");
                false
            }
            PhaseOneAction::Switch(popular) => {
                // One call replaces our reaction, no separate clear needed.
                match self.inner.reactions.set_reaction(msg, Some(&popular)).await {
                    Ok(()) => {
                        info!("switched {msg} from {initial} to the popular {popular}");
                        self.set_current(id, popular).await;
                    }
                    Err(e) => warn!("failed to switch reaction on {msg}: {e}"),
                }
                false
            }
            PhaseOneAction::Leave => {
                debug!("leaving {msg} as-is");
                false
            }
        }
    }

    /// Post-withdrawal watch window: poll every `check_interval` until either
    /// the window runs out or reactions show up again. New activity gets one
    /// adjustment (re-add ours, possibly follow the crowd), then the watch
    /// ends.
    async fn monitor(&self, id: MessageId) {
        let Some((msg, initial)) = self.tracked_identity(id).await else {
            return;
        };
        self.set_state(id, TrackState::Monitoring).await;

        let window = self.inner.cfg.monitor_time;
        let started = Instant::now();
        debug!("monitoring {msg} for {}s", window.as_secs());

        loop {
            sleep(self.inner.cfg.check_interval).await;

            if started.elapsed() >= window {
                self.set_state(id, TrackState::Expired).await;
                debug!("monitor window for {msg} ran out");
                return;
            }

            let snapshot = match self.inner.reactions.get_reactions(msg).await {
                Ok(s) => s,
                Err(e) => {
                    warn!("reaction lookup failed for {msg}: {e}");
                    continue;
                }
            };
            if snapshot.is_empty() {
                continue;
            }

            let mut attempted = 0u32;
            let mut applied = 0u32;

            if snapshot.count(&initial) == 0 {
                attempted += 1;
                match self.inner.reactions.set_reaction(msg, Some(&initial)).await {
                    Ok(()) => {
                        info!("re-added {initial} to {msg} after new activity");
                        self.set_current(id, initial.clone()).await;
                        applied += 1;
                    }
                    Err(e) => warn!("failed to re-add {initial} to {msg}: {e}"),
                }
            }

            if snapshot.distinct() > 1 {
                if let Some((popular, count)) = snapshot.most_common_excluding(&initial) {
                    if count >= self.inner.cfg.switch_threshold {
                        let popular = popular.to_string();
                        attempted += 1;
                        match self.inner.reactions.set_reaction(msg, Some(&popular)).await {
                            Ok(()) => {
                                info!("switched {msg} to the popular {popular}");
                                self.set_current(id, popular).await;
                                applied += 1;
                            }
                            Err(e) => warn!("failed to switch reaction on {msg}: {e}"),
                        }
                    }
                }
            }

            // Nothing we tried took effect: the next tick gets another chance.
            if attempted > 0 && applied == 0 {
                continue;
            }

            // One reaction to new activity, then stop watching.
            return;
        }
    }

    async fn retire(&self, id: MessageId) {
        let removed = self.inner.tracked.lock().await.remove(&id);
        if let Some(entry) = removed {
            let age = Utc::now().signed_duration_since(entry.created_at);
            debug!(
                "untracked {} after {}s (last reaction {}, state {:?})",
                entry.message,
                age.num_seconds(),
                entry.current_reaction,
                entry.state
            );
        }
    }

    async fn tracked_identity(&self, id: MessageId) -> Option<(MessageRef, String)> {
        let tracked = self.inner.tracked.lock().await;
        tracked
            .get(&id)
            .map(|t| (t.message, t.initial_reaction.clone()))
    }

    async fn set_state(&self, id: MessageId, state: TrackState) {
        if let Some(entry) = self.inner.tracked.lock().await.get_mut(&id) {
            entry.state = state;
        }
    }

    async fn set_current(&self, id: MessageId, emoji: String) {
        if let Some(entry) = self.inner.tracked.lock().await.get_mut(&id) {
            entry.current_reaction = emoji;
            entry.state = TrackState::Active;
        }
    }

    #[cfg(test)]
    async fn state_of(&self, id: MessageId) -> Option<TrackState> {
        self.inner.tracked.lock().await.get(&id).map(|t| t.state)
    }
}

fn topic_matches(topic_id: Option<i64>, event: &MessageEvent) -> bool {
    let Some(topic) = topic_id else {
        return true;
    };
    let Some(reply) = event.reply_to else {
        return false;
    };
    reply.forum_topic && i64::from(reply.message_id.0) == topic
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum PhaseOneAction {
    /// Withdraw our reaction and start the monitoring window.
    Withdraw,
    /// Our emoji caught on; keep it and stop tracking.
    Keep,
    /// Replace our reaction with the given popular emoji, then stop tracking.
    Switch(String),
    /// No rule matched; leave everything as it stands.
    Leave,
}

/// Decision table for the first re-check. First matching rule wins.
fn phase_one_action(
    snapshot: &ReactionSnapshot,
    initial: &str,
    switch_threshold: u32,
) -> PhaseOneAction {
    if snapshot.is_empty() {
        return PhaseOneAction::Withdraw;
    }
    // Only our own mark is left: nobody but us reacted.
    if snapshot.distinct() == 1 && snapshot.count(initial) == 1 {
        return PhaseOneAction::Withdraw;
    }
    // Others independently picked the same emoji.
    if snapshot.count(initial) > 1 {
        return PhaseOneAction::Keep;
    }
    if snapshot.count(initial) > 0 {
        if let Some((popular, count)) = snapshot.most_common_excluding(initial) {
            if count >= switch_threshold {
                return PhaseOneAction::Switch(popular.to_string());
            }
        }
    }
    PhaseOneAction::Leave
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ChatId;
    use crate::reactions::types::ReplyTarget;
    use crate::Error;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct FakeReactions {
        sets: StdMutex<Vec<(MessageRef, Option<String>)>>,
        snapshots: StdMutex<VecDeque<ReactionSnapshot>>,
        gets: AtomicUsize,
        fail_sets: AtomicBool,
        fail_gets: AtomicBool,
    }

    impl FakeReactions {
        fn script(&self, snaps: Vec<ReactionSnapshot>) {
            *self.snapshots.lock().unwrap() = snaps.into();
        }

        fn set_calls(&self) -> Vec<Option<String>> {
            self.sets
                .lock()
                .unwrap()
                .iter()
                .map(|(_, emoji)| emoji.clone())
                .collect()
        }

        fn get_calls(&self) -> usize {
            self.gets.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ReactionsPort for FakeReactions {
        async fn set_reaction(&self, msg: MessageRef, emoji: Option<&str>) -> crate::Result<()> {
            if self.fail_sets.load(Ordering::SeqCst) {
                return Err(Error::External("set_reaction refused".to_string()));
            }
            self.sets
                .lock()
                .unwrap()
                .push((msg, emoji.map(String::from)));
            Ok(())
        }

        async fn get_reactions(&self, _msg: MessageRef) -> crate::Result<ReactionSnapshot> {
            self.gets.fetch_add(1, Ordering::SeqCst);
            if self.fail_gets.load(Ordering::SeqCst) {
                return Err(Error::External("get_reactions refused".to_string()));
            }
            let next = self.snapshots.lock().unwrap().pop_front();
            Ok(next.unwrap_or_default())
        }
    }

    fn test_config() -> Config {
        Config {
            telegram_bot_token: "x".to_string(),
            chat_id: 10,
            topic_id: None,
            ignore_own_messages: false,
            // Single-entry pool keeps the random pick deterministic.
            reactions: vec!["👍".to_string()],
            reaction_delay_min: Duration::from_millis(200),
            reaction_delay_max: Duration::from_millis(1000),
            message_interval: Duration::from_secs(2),
            check_remove_delay: Duration::from_secs(20),
            check_interval: Duration::from_secs(10),
            monitor_time: Duration::from_secs(300),
            switch_threshold: 2,
            control_users: vec![],
            start_enabled: true,
        }
    }

    fn manager_with(cfg: Config, fake: Arc<FakeReactions>) -> ReactionManager {
        ReactionManager::new(Arc::new(cfg), fake, Some(UserId(99)))
    }

    fn event(id: i32) -> MessageEvent {
        MessageEvent {
            chat_id: ChatId(10),
            message_id: MessageId(id),
            sender: Some(UserId(7)),
            service: false,
            reply_to: None,
        }
    }

    fn snap(pairs: &[(&str, u32)]) -> ReactionSnapshot {
        pairs
            .iter()
            .map(|(e, c)| (e.to_string(), *c))
            .collect()
    }

    // === Decision table ===

    #[test]
    fn phase_one_empty_withdraws() {
        assert_eq!(
            phase_one_action(&snap(&[]), "👍", 2),
            PhaseOneAction::Withdraw
        );
    }

    #[test]
    fn phase_one_lone_own_reaction_withdraws() {
        assert_eq!(
            phase_one_action(&snap(&[("👍", 1)]), "👍", 2),
            PhaseOneAction::Withdraw
        );
    }

    #[test]
    fn phase_one_keeps_when_others_agree() {
        assert_eq!(
            phase_one_action(&snap(&[("👍", 5)]), "👍", 2),
            PhaseOneAction::Keep
        );
        // Even when another emoji would qualify for a switch.
        assert_eq!(
            phase_one_action(&snap(&[("👍", 3), ("🔥", 7)]), "👍", 2),
            PhaseOneAction::Keep
        );
    }

    #[test]
    fn phase_one_switches_to_popular_emoji() {
        assert_eq!(
            phase_one_action(&snap(&[("👍", 1), ("🔥", 2)]), "👍", 2),
            PhaseOneAction::Switch("🔥".to_string())
        );
    }

    #[test]
    fn phase_one_leaves_below_threshold() {
        assert_eq!(
            phase_one_action(&snap(&[("👍", 1), ("🔥", 1)]), "👍", 2),
            PhaseOneAction::Leave
        );
    }

    #[test]
    fn phase_one_leaves_when_our_reaction_vanished() {
        // Ours is gone entirely; a popular emoji alone is not a switch.
        assert_eq!(
            phase_one_action(&snap(&[("🔥", 4)]), "👍", 2),
            PhaseOneAction::Leave
        );
    }

    // === Filters ===

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn service_messages_are_ignored() {
        let fake = Arc::new(FakeReactions::default());
        let manager = manager_with(test_config(), fake.clone());

        let mut ev = event(1);
        ev.service = true;
        manager.on_new_message(ev).await;

        assert!(fake.set_calls().is_empty());
        assert_eq!(manager.stats().await.tracked, 0);
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn own_messages_are_ignored_when_configured() {
        let fake = Arc::new(FakeReactions::default());
        let mut cfg = test_config();
        cfg.ignore_own_messages = true;
        let manager = manager_with(cfg, fake.clone());

        let mut ev = event(1);
        ev.sender = Some(UserId(99));
        manager.on_new_message(ev).await;

        assert!(fake.set_calls().is_empty());
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn topic_filter_requires_matching_forum_root() {
        let fake = Arc::new(FakeReactions::default());
        let mut cfg = test_config();
        cfg.topic_id = Some(555);
        let manager = manager_with(cfg, fake.clone());

        // Not a reply at all.
        manager.on_new_message(event(1)).await;
        // Reply, but not to a forum-topic root.
        let mut ev = event(2);
        ev.reply_to = Some(ReplyTarget {
            message_id: MessageId(555),
            forum_topic: false,
        });
        manager.on_new_message(ev).await;
        // Forum-topic root, wrong topic.
        let mut ev = event(3);
        ev.reply_to = Some(ReplyTarget {
            message_id: MessageId(444),
            forum_topic: true,
        });
        manager.on_new_message(ev).await;
        assert!(fake.set_calls().is_empty());

        // The right topic root.
        let mut ev = event(4);
        ev.reply_to = Some(ReplyTarget {
            message_id: MessageId(555),
            forum_topic: true,
        });
        manager.on_new_message(ev).await;
        assert_eq!(fake.set_calls(), vec![Some("👍".to_string())]);
        assert_eq!(manager.stats().await.tracked, 1);
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn disabled_manager_ignores_messages() {
        let fake = Arc::new(FakeReactions::default());
        let manager = manager_with(test_config(), fake.clone());

        manager.disable();
        manager.on_new_message(event(1)).await;
        assert!(fake.set_calls().is_empty());

        manager.enable();
        manager.on_new_message(event(1)).await;
        assert_eq!(fake.set_calls().len(), 1);
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn duplicate_events_do_not_double_track() {
        let fake = Arc::new(FakeReactions::default());
        let manager = manager_with(test_config(), fake.clone());

        manager.on_new_message(event(1)).await;
        manager.on_new_message(event(1)).await;

        assert_eq!(fake.set_calls().len(), 1);
        assert_eq!(manager.stats().await.tracked, 1);
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn failed_initial_reaction_abandons_tracking() {
        let fake = Arc::new(FakeReactions::default());
        fake.fail_sets.store(true, Ordering::SeqCst);
        let manager = manager_with(test_config(), fake.clone());

        manager.on_new_message(event(1)).await;
        assert_eq!(manager.stats().await.tracked, 0);

        // No re-check ever fires for the abandoned message.
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(fake.get_calls(), 0);
    }

    // === Phase 1 ===

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn empty_snapshot_withdraws_and_starts_monitoring() {
        let fake = Arc::new(FakeReactions::default());
        fake.script(vec![snap(&[])]);
        let manager = manager_with(test_config(), fake.clone());

        manager.on_new_message(event(1)).await;
        tokio::time::sleep(Duration::from_secs(25)).await;

        assert_eq!(
            fake.set_calls(),
            vec![Some("👍".to_string()), None]
        );
        assert_eq!(manager.state_of(MessageId(1)).await, Some(TrackState::Monitoring));
        assert_eq!(manager.stats().await.monitoring, 1);
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn lone_own_reaction_withdraws_and_starts_monitoring() {
        let fake = Arc::new(FakeReactions::default());
        fake.script(vec![snap(&[("👍", 1)])]);
        let manager = manager_with(test_config(), fake.clone());

        manager.on_new_message(event(1)).await;
        tokio::time::sleep(Duration::from_secs(25)).await;

        assert_eq!(
            fake.set_calls(),
            vec![Some("👍".to_string()), None]
        );
        assert_eq!(manager.state_of(MessageId(1)).await, Some(TrackState::Monitoring));
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn shared_reaction_is_kept_and_tracking_ends() {
        let fake = Arc::new(FakeReactions::default());
        fake.script(vec![snap(&[("👍", 3)])]);
        let manager = manager_with(test_config(), fake.clone());

        manager.on_new_message(event(1)).await;
        tokio::time::sleep(Duration::from_secs(25)).await;

        // No clear call, entry retired, nothing left to poll.
        assert_eq!(fake.set_calls(), vec![Some("👍".to_string())]);
        assert_eq!(manager.stats().await.tracked, 0);
        assert_eq!(fake.get_calls(), 1);
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn popular_other_emoji_wins_a_switch() {
        let fake = Arc::new(FakeReactions::default());
        fake.script(vec![snap(&[("👍", 1), ("🔥", 2)])]);
        let manager = manager_with(test_config(), fake.clone());

        manager.on_new_message(event(1)).await;
        tokio::time::sleep(Duration::from_secs(25)).await;

        assert_eq!(
            fake.set_calls(),
            vec![Some("👍".to_string()), Some("🔥".to_string())]
        );
        assert_eq!(manager.stats().await.tracked, 0);
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn below_threshold_leaves_reaction_alone() {
        let fake = Arc::new(FakeReactions::default());
        fake.script(vec![snap(&[("👍", 1), ("🔥", 1)])]);
        let manager = manager_with(test_config(), fake.clone());

        manager.on_new_message(event(1)).await;
        tokio::time::sleep(Duration::from_secs(25)).await;

        assert_eq!(fake.set_calls(), vec![Some("👍".to_string())]);
        assert_eq!(manager.stats().await.tracked, 0);
    }

    // === Phase 2 ===

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn monitoring_readds_initial_reaction_once_activity_returns() {
        let fake = Arc::new(FakeReactions::default());
        // First re-check sees nothing; the watch window polls emptiness for
        // eleven ticks, then somebody reacts (without our emoji).
        let mut script = vec![snap(&[])];
        script.extend(std::iter::repeat(snap(&[])).take(11));
        script.push(snap(&[("🔥", 1)]));
        fake.script(script);
        let manager = manager_with(test_config(), fake.clone());

        manager.on_new_message(event(1)).await;
        tokio::time::sleep(Duration::from_secs(150)).await;

        assert_eq!(
            fake.set_calls(),
            vec![Some("👍".to_string()), None, Some("👍".to_string())]
        );
        // The watch ended right after reacting: entry gone, polling stopped.
        assert_eq!(manager.stats().await.tracked, 0);
        let polls = fake.get_calls();
        assert_eq!(polls, 13);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(fake.get_calls(), polls);
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn monitoring_follows_the_crowd_when_initial_is_present() {
        let fake = Arc::new(FakeReactions::default());
        // Others restored our emoji for us and also piled onto another one.
        fake.script(vec![snap(&[]), snap(&[("👍", 1), ("🔥", 2)])]);
        let manager = manager_with(test_config(), fake.clone());

        manager.on_new_message(event(1)).await;
        tokio::time::sleep(Duration::from_secs(35)).await;

        // No re-add (ours is present), but the popular emoji wins.
        assert_eq!(
            fake.set_calls(),
            vec![
                Some("👍".to_string()),
                None,
                Some("🔥".to_string())
            ]
        );
        assert_eq!(manager.stats().await.tracked, 0);
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn monitoring_expires_quietly_without_activity() {
        let fake = Arc::new(FakeReactions::default());
        fake.script(vec![snap(&[])]);
        let manager = manager_with(test_config(), fake.clone());

        manager.on_new_message(event(1)).await;
        tokio::time::sleep(Duration::from_secs(330)).await;

        assert_eq!(
            fake.set_calls(),
            vec![Some("👍".to_string()), None]
        );
        assert_eq!(manager.stats().await.tracked, 0);
        // One first re-check plus 29 in-window polls; the 300s tick expires
        // the watch before looking again.
        assert_eq!(fake.get_calls(), 30);
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn monitoring_survives_read_failures_until_timeout() {
        let fake = Arc::new(FakeReactions::default());
        fake.script(vec![snap(&[])]);
        let manager = manager_with(test_config(), fake.clone());

        manager.on_new_message(event(1)).await;
        tokio::time::sleep(Duration::from_secs(25)).await;
        assert_eq!(manager.state_of(MessageId(1)).await, Some(TrackState::Monitoring));

        // Failing lookups are absorbed tick by tick; the watch still times out.
        fake.fail_gets.store(true, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(310)).await;
        assert_eq!(manager.stats().await.tracked, 0);
        assert_eq!(fake.set_calls().len(), 2);
    }

    // === Teardown ===

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn stop_cancels_pending_work() {
        let fake = Arc::new(FakeReactions::default());
        let manager = manager_with(test_config(), fake.clone());

        manager.on_new_message(event(1)).await;
        assert_eq!(manager.stats().await.tracked, 1);

        manager.stop().await;
        assert_eq!(manager.stats().await.tracked, 0);

        // The cancelled re-check never fires.
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(fake.get_calls(), 0);
        assert_eq!(fake.set_calls().len(), 1);
    }
}

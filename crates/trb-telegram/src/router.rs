//! Update loop wiring the Telegram adapter to the core.
//!
//! Uses an explicit `getUpdates` long poll instead of a dispatcher so we can
//! request `message_reaction_count` updates, which Telegram only delivers
//! when asked for by name.

use std::sync::Arc;

use teloxide::payloads::GetUpdatesSetters;
use teloxide::prelude::*;
use teloxide::types::{AllowedUpdate, MessageReactionCountUpdated, ReactionType, UpdateKind};

use tokio::time::{sleep, Duration};
use tracing::{info, warn};

use trb_core::{
    config::Config,
    domain::{ChatId, MessageId, MessageRef, UserId},
    lifecycle::ReactionManager,
    reactions::{
        port::ReactionsPort,
        throttle::{RateLimiter, ThrottledReactions},
        types::ReactionSnapshot,
    },
};

use crate::{handlers, ReactionRegistry, TelegramReactions};

pub struct AppState {
    pub cfg: Arc<Config>,
    pub bot: Bot,
    pub manager: ReactionManager,
}

pub async fn run_polling(cfg: Arc<Config>) -> anyhow::Result<()> {
    let bot = Bot::new(cfg.telegram_bot_token.clone());

    let me = bot.get_me().await?;
    let own_user = Some(UserId(me.id.0 as i64));
    info!("trb started: @{}", me.username());
    info!(
        "watching chat {} (topic: {})",
        cfg.chat_id,
        cfg.topic_id
            .map(|t| t.to_string())
            .unwrap_or_else(|| "all".to_string())
    );

    let registry = Arc::new(ReactionRegistry::default());
    let raw: Arc<dyn ReactionsPort> =
        Arc::new(TelegramReactions::new(bot.clone(), registry.clone()));
    let limiter = Arc::new(RateLimiter::new(cfg.message_interval));
    let reactions: Arc<dyn ReactionsPort> = Arc::new(ThrottledReactions::new(raw, limiter));

    let manager = ReactionManager::new(cfg.clone(), reactions, own_user);
    let state = Arc::new(AppState {
        cfg: cfg.clone(),
        bot: bot.clone(),
        manager,
    });

    // Reaction-count updates are not delivered unless requested explicitly.
    let allowed = vec![AllowedUpdate::Message, AllowedUpdate::MessageReactionCount];

    info!("listening for messages");
    let mut offset: i32 = 0;
    loop {
        let updates = match bot
            .get_updates()
            .offset(offset)
            .timeout(10)
            .allowed_updates(allowed.clone())
            .await
        {
            Ok(u) => u,
            Err(e) => {
                warn!("getUpdates failed: {e}");
                sleep(Duration::from_secs(5)).await;
                continue;
            }
        };

        for update in updates {
            offset = offset.max(update.id.0 as i32 + 1);
            match update.kind {
                UpdateKind::Message(msg) => {
                    // Handlers run on their own task: the initial-reaction
                    // jitter must not stall the poll loop.
                    let state = state.clone();
                    tokio::spawn(async move {
                        handlers::handle_message(msg, state).await;
                    });
                }
                UpdateKind::MessageReactionCount(counts) => {
                    record_reaction_counts(&registry, &counts);
                }
                _ => {}
            }
        }
    }
}

fn record_reaction_counts(registry: &ReactionRegistry, counts: &MessageReactionCountUpdated) {
    let msg = MessageRef {
        chat_id: ChatId(counts.chat.id.0),
        message_id: MessageId(counts.message_id.0),
    };

    let mut snapshot = ReactionSnapshot::new();
    for reaction in &counts.reactions {
        // Custom-emoji and paid reactions don't participate in the emoji pool.
        if let ReactionType::Emoji { emoji } = &reaction.r#type {
            snapshot.insert(emoji.clone(), reaction.total_count.max(0) as u32);
        }
    }

    registry.record(msg, snapshot);
}

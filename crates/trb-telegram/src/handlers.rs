//! Update handlers: control commands and monitored-chat messages.

use teloxide::prelude::*;
use teloxide::types::{Message, MessageKind};

use tracing::debug;

use trb_core::{
    domain::{ChatId, MessageId, UserId},
    reactions::types::{MessageEvent, ReplyTarget},
};

use crate::router::AppState;

pub async fn handle_message(msg: Message, state: std::sync::Arc<AppState>) {
    if let Some(text) = msg.text() {
        if text.starts_with('/') {
            handle_command(&msg, text, &state).await;
            return;
        }
    }

    if msg.chat.id.0 != state.cfg.chat_id {
        return;
    }

    state.manager.on_new_message(map_message(&msg)).await;
}

/// Map a Telegram message onto the core's event shape. Forum-topic messages
/// carry their topic root in `thread_id`; plain replies point at the replied
/// message.
fn map_message(msg: &Message) -> MessageEvent {
    let reply_to = match msg.thread_id {
        Some(thread) => Some(ReplyTarget {
            message_id: MessageId((thread.0).0),
            forum_topic: msg.is_topic_message,
        }),
        None => msg.reply_to_message().map(|replied| ReplyTarget {
            message_id: MessageId(replied.id.0),
            forum_topic: false,
        }),
    };

    MessageEvent {
        chat_id: ChatId(msg.chat.id.0),
        message_id: MessageId(msg.id.0),
        sender: msg.from.as_ref().map(|u| UserId(u.id.0 as i64)),
        service: !matches!(msg.kind, MessageKind::Common(_)),
        reply_to,
    }
}

async fn handle_command(msg: &Message, text: &str, state: &AppState) {
    let user = msg.from.as_ref().map(|u| UserId(u.id.0 as i64));
    if !is_authorized(user, &state.cfg.control_users) {
        debug!("ignoring control command from unauthorized user {user:?}");
        return;
    }

    let reply = match parse_command(text).as_str() {
        "start" | "help" => "Reaction bot control:\n\
             /enable - react to new messages\n\
             /disable - stop reacting\n\
             /status - current state"
            .to_string(),
        "enable" => {
            state.manager.enable();
            "✅ Auto-reactions enabled".to_string()
        }
        "disable" => {
            state.manager.disable();
            "⏸ Auto-reactions disabled".to_string()
        }
        "status" => {
            let stats = state.manager.stats().await;
            format!(
                "Status: {}\nTracked messages: {} ({} monitoring)",
                if stats.enabled { "✅ enabled" } else { "⏸ disabled" },
                stats.tracked,
                stats.monitoring
            )
        }
        _ => return,
    };

    let _ = state.bot.send_message(msg.chat.id, reply).await;
}

fn parse_command(text: &str) -> String {
    // Telegram may send `/cmd@botname args`.
    text.trim()
        .split_whitespace()
        .next()
        .unwrap_or("")
        .trim_start_matches('/')
        .split('@')
        .next()
        .unwrap_or("")
        .to_lowercase()
}

/// An empty allowlist means anyone may control the bot.
fn is_authorized(user: Option<UserId>, allowed: &[i64]) -> bool {
    if allowed.is_empty() {
        return true;
    }
    user.map(|u| allowed.contains(&u.0)).unwrap_or(false)
}

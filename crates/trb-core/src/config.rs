use std::{env, fs, path::Path, time::Duration};

use crate::{errors::Error, Result};

/// Typed configuration for the bot.
///
/// Everything comes from the environment (with `.env` support); the numeric
/// timings all have the production defaults baked in so a token and a chat id
/// are enough to run.
#[derive(Clone, Debug)]
pub struct Config {
    // Core
    pub telegram_bot_token: String,
    /// The single chat whose messages get reactions.
    pub chat_id: i64,
    /// Forum topic filter: only react inside this topic. `None` = whole chat.
    pub topic_id: Option<i64>,
    pub ignore_own_messages: bool,

    // Reaction behavior
    /// Emoji pool the initial reaction is drawn from.
    pub reactions: Vec<String>,
    /// Human-like jitter before the initial reaction.
    pub reaction_delay_min: Duration,
    pub reaction_delay_max: Duration,
    /// Minimum spacing between outgoing reaction mutations (flood control).
    pub message_interval: Duration,

    // Lifecycle timings
    /// How long after the initial reaction the first re-check runs.
    pub check_remove_delay: Duration,
    /// Poll interval of the monitoring window.
    pub check_interval: Duration,
    /// Length of the monitoring window.
    pub monitor_time: Duration,
    /// Minimum count another emoji needs before we switch to it.
    pub switch_threshold: u32,

    // Control surface
    /// Users allowed to run control commands. Empty = anyone.
    pub control_users: Vec<i64>,
    pub start_enabled: bool,
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));

        let telegram_bot_token = env_str("TELEGRAM_BOT_TOKEN").unwrap_or_default();
        if telegram_bot_token.trim().is_empty() {
            return Err(Error::Config(
                "TELEGRAM_BOT_TOKEN environment variable is required".to_string(),
            ));
        }

        let chat_id = env_str("CHAT_ID")
            .and_then(|s| s.trim().parse::<i64>().ok())
            .ok_or_else(|| {
                Error::Config("CHAT_ID environment variable is required".to_string())
            })?;

        let topic_id = parse_topic_id(env_str("TOPIC_ID"));
        let ignore_own_messages = env_bool("IGNORE_OWN_MESSAGES").unwrap_or(false);

        let reactions = parse_reactions(env_str("REACTIONS"));
        if reactions.is_empty() {
            return Err(Error::Config("REACTIONS must not be empty".to_string()));
        }

        let reaction_delay_min =
            Duration::from_millis(env_u64("REACTION_DELAY_MIN_MS").unwrap_or(200));
        let reaction_delay_max =
            Duration::from_millis(env_u64("REACTION_DELAY_MAX_MS").unwrap_or(1000));
        if reaction_delay_min > reaction_delay_max {
            return Err(Error::Config(
                "REACTION_DELAY_MIN_MS must not exceed REACTION_DELAY_MAX_MS".to_string(),
            ));
        }

        let message_interval =
            Duration::from_millis(env_u64("MESSAGE_INTERVAL_MS").unwrap_or(2000));

        let check_remove_delay =
            Duration::from_secs(env_u64("CHECK_REMOVE_DELAY_SECS").unwrap_or(20));
        let check_interval = Duration::from_secs(env_u64("CHECK_INTERVAL_SECS").unwrap_or(10));
        let monitor_time = Duration::from_secs(env_u64("MONITOR_TIME_SECS").unwrap_or(300));

        let switch_threshold = env_u32("SWITCH_THRESHOLD").unwrap_or(2);
        if switch_threshold == 0 {
            return Err(Error::Config(
                "SWITCH_THRESHOLD must be at least 1".to_string(),
            ));
        }

        let control_users = parse_csv_i64(env_str("CONTROL_USERS"));
        let start_enabled = env_bool("START_ENABLED").unwrap_or(true);

        Ok(Self {
            telegram_bot_token,
            chat_id,
            topic_id,
            ignore_own_messages,
            reactions,
            reaction_delay_min,
            reaction_delay_max,
            message_interval,
            check_remove_delay,
            check_interval,
            monitor_time,
            switch_threshold,
            control_users,
            start_enabled,
        })
    }
}

/// `TOPIC_ID` accepts `none`, `null`, empty, or a number; anything that is
/// not a positive id disables the topic filter.
fn parse_topic_id(v: Option<String>) -> Option<i64> {
    let raw = v?;
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("none") {
        return None;
    }
    if trimmed.eq_ignore_ascii_case("null") {
        return None;
    }
    match trimmed.parse::<i64>() {
        Ok(id) if id > 0 => Some(id),
        _ => None,
    }
}

fn parse_reactions(v: Option<String>) -> Vec<String> {
    let raw = v.unwrap_or_else(|| "👍,❤️".to_string());
    raw.split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }
        if env::var_os(key).is_some() {
            continue; // do not override existing env
        }

        let mut val = v.trim().to_string();
        // Strip optional surrounding quotes.
        if val.len() >= 2
            && ((val.starts_with('"') && val.ends_with('"'))
                || (val.starts_with('\'') && val.ends_with('\'')))
        {
            val = val[1..val.len() - 1].to_string();
        }

        env::set_var(key, val);
    }
}

fn env_str(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn env_bool(key: &str) -> Option<bool> {
    env_str(key).map(|s| {
        matches!(
            s.trim().to_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        )
    })
}

fn env_u64(key: &str) -> Option<u64> {
    env_str(key).and_then(|s| s.trim().parse::<u64>().ok())
}

fn env_u32(key: &str) -> Option<u32> {
    env_str(key).and_then(|s| s.trim().parse::<u32>().ok())
}

fn parse_csv_i64(v: Option<String>) -> Vec<i64> {
    v.unwrap_or_default()
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .filter_map(|s| s.parse::<i64>().ok())
        .collect()
}

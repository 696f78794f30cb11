use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};

use crate::{
    domain::MessageRef,
    reactions::{port::ReactionsPort, types::ReactionSnapshot},
    Result,
};

#[derive(Debug)]
struct IntervalLimiter {
    interval: Duration,
    next: Instant,
}

impl IntervalLimiter {
    fn new(interval: Duration) -> Self {
        Self {
            interval,
            next: Instant::now(),
        }
    }

    /// Reserve the next slot and return the wait required before executing.
    fn reserve(&mut self) -> Duration {
        let now = Instant::now();
        let start = if now >= self.next { now } else { self.next };
        self.next = start + self.interval;
        start.saturating_duration_since(now)
    }
}

/// Process-wide spacing of outgoing reaction mutations.
///
/// `acquire()` suspends the caller until at least the configured interval has
/// elapsed since the previously granted acquisition. One shared clock, not
/// per message: concurrent lifecycle tasks all reserve from the same slot.
pub struct RateLimiter {
    inner: Mutex<IntervalLimiter>,
}

impl RateLimiter {
    pub fn new(interval: Duration) -> Self {
        Self {
            inner: Mutex::new(IntervalLimiter::new(interval)),
        }
    }

    pub async fn acquire(&self) {
        let wait = { self.inner.lock().await.reserve() };
        if wait > Duration::ZERO {
            sleep(wait).await;
        }
    }
}

/// ReactionsPort decorator that rate-limits mutations.
///
/// Only `set_reaction` goes through the limiter; read-only lookups are not
/// subject to the messaging service's mutation flood limits.
pub struct ThrottledReactions {
    inner: Arc<dyn ReactionsPort>,
    limiter: Arc<RateLimiter>,
}

impl ThrottledReactions {
    pub fn new(inner: Arc<dyn ReactionsPort>, limiter: Arc<RateLimiter>) -> Self {
        Self { inner, limiter }
    }
}

#[async_trait]
impl ReactionsPort for ThrottledReactions {
    async fn set_reaction(&self, msg: MessageRef, emoji: Option<&str>) -> Result<()> {
        self.limiter.acquire().await;
        self.inner.set_reaction(msg, emoji).await
    }

    async fn get_reactions(&self, msg: MessageRef) -> Result<ReactionSnapshot> {
        self.inner.get_reactions(msg).await
    }
}

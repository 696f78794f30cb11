use async_trait::async_trait;

use crate::{domain::MessageRef, reactions::types::ReactionSnapshot, Result};

/// Port for the messaging service's reaction surface.
///
/// Telegram is the first implementation; the shape is small enough that any
/// messenger with per-message emoji reactions can fit behind it.
#[async_trait]
pub trait ReactionsPort: Send + Sync {
    /// Set this account's reaction on a message.
    ///
    /// `Some(emoji)` replaces whatever reaction this account had on the
    /// message; `None` clears it.
    async fn set_reaction(&self, msg: MessageRef, emoji: Option<&str>) -> Result<()>;

    /// Read the current aggregate reaction counts for a message.
    ///
    /// Returns an empty snapshot when nobody has reacted.
    async fn get_reactions(&self, msg: MessageRef) -> Result<ReactionSnapshot>;
}

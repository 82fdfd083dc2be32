use async_trait::async_trait;

use crate::error::ChatError;

use super::model::MessageTarget;

/// Outbound calls the tracker makes against the chat platform.
#[async_trait]
pub trait ChatPlatform: Send + Sync {
    /// Post a message and return its id.
    async fn send_message(
        &self,
        guild_id: u64,
        channel_id: u64,
        content: &str,
    ) -> Result<u64, ChatError>;

    async fn edit_message(&self, target: &MessageTarget, content: &str) -> Result<(), ChatError>;

    async fn delete_message(&self, target: &MessageTarget) -> Result<(), ChatError>;

    async fn add_reaction(&self, target: &MessageTarget, emoji: &str) -> Result<(), ChatError>;

    /// Remove `user_id`'s reaction `emoji` from the message.
    async fn remove_reaction(
        &self,
        target: &MessageTarget,
        user_id: u64,
        emoji: &str,
    ) -> Result<(), ChatError>;
}

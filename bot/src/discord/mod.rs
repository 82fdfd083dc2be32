//! Discord side of the bot: outbound calls over serenity's HTTP client and
//! the gateway event handler.

mod handler;

pub use handler::Handler;

use std::sync::Arc;

use async_trait::async_trait;
use serenity::builder::{CreateAllowedMentions, CreateMessage, EditMessage};
use serenity::http::Http;
use serenity::model::channel::ReactionType;
use serenity::model::id::{ChannelId, MessageId, UserId};
use serenity::prelude::GatewayIntents;

use crate::engine::chat::ChatPlatform;
use crate::engine::model::MessageTarget;
use crate::error::ChatError;

/// Gateway intents the handler needs.
pub fn intents() -> GatewayIntents {
    GatewayIntents::GUILDS
        | GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::GUILD_MESSAGE_REACTIONS
}

fn classify_status(status: Option<u16>, message: String) -> ChatError {
    match status {
        Some(404) => ChatError::NotFound,
        _ => ChatError::Platform(message),
    }
}

fn classify(e: serenity::Error) -> ChatError {
    let status = match &e {
        serenity::Error::Http(http) => http.status_code().map(|s| s.as_u16()),
        _ => None,
    };
    classify_status(status, e.to_string())
}

/// Only user mentions may ping; names are escaped so they cannot add any.
fn allowed_mentions() -> CreateAllowedMentions {
    CreateAllowedMentions::new().all_users(true)
}

/// [`ChatPlatform`] backed by the Discord REST API.
pub struct DiscordChat {
    http: Arc<Http>,
}

impl DiscordChat {
    pub fn new(http: Arc<Http>) -> Self {
        Self { http }
    }
}

#[async_trait]
impl ChatPlatform for DiscordChat {
    async fn send_message(
        &self,
        _guild_id: u64,
        channel_id: u64,
        content: &str,
    ) -> Result<u64, ChatError> {
        let builder = CreateMessage::new()
            .content(content)
            .allowed_mentions(allowed_mentions());
        let message = ChannelId::new(channel_id)
            .send_message(&*self.http, builder)
            .await
            .map_err(classify)?;
        Ok(message.id.get())
    }

    async fn edit_message(&self, target: &MessageTarget, content: &str) -> Result<(), ChatError> {
        let builder = EditMessage::new()
            .content(content)
            .allowed_mentions(allowed_mentions());
        ChannelId::new(target.channel_id)
            .edit_message(&*self.http, MessageId::new(target.message_id), builder)
            .await
            .map_err(classify)?;
        Ok(())
    }

    async fn delete_message(&self, target: &MessageTarget) -> Result<(), ChatError> {
        ChannelId::new(target.channel_id)
            .delete_message(&*self.http, MessageId::new(target.message_id))
            .await
            .map_err(classify)
    }

    async fn add_reaction(&self, target: &MessageTarget, emoji: &str) -> Result<(), ChatError> {
        ChannelId::new(target.channel_id)
            .create_reaction(
                &*self.http,
                MessageId::new(target.message_id),
                ReactionType::Unicode(emoji.to_string()),
            )
            .await
            .map_err(classify)
    }

    async fn remove_reaction(
        &self,
        target: &MessageTarget,
        user_id: u64,
        emoji: &str,
    ) -> Result<(), ChatError> {
        ChannelId::new(target.channel_id)
            .delete_reaction(
                &*self.http,
                MessageId::new(target.message_id),
                Some(UserId::new(user_id)),
                ReactionType::Unicode(emoji.to_string()),
            )
            .await
            .map_err(classify)
    }
}

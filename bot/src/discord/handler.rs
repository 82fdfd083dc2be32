use std::sync::{Arc, OnceLock};

use serenity::async_trait;
use serenity::model::channel::{GuildChannel, Message, Reaction, ReactionType};
use serenity::model::gateway::Ready;
use serenity::model::id::{ChannelId, GuildId, MessageId};
use serenity::prelude::{Context, EventHandler};
use tracing::{error, info, warn};

use crate::config::WatchEntry;
use crate::engine::model::MessageTarget;
use crate::engine::notify::ReactionEvent;
use crate::engine::tracker::Tracker;

/// Forwards gateway events to the [`Tracker`].
pub struct Handler {
    tracker: Arc<Tracker>,
    watch: Vec<WatchEntry>,
    bot_user_id: OnceLock<u64>,
}

impl Handler {
    pub fn new(tracker: Arc<Tracker>, watch: Vec<WatchEntry>) -> Self {
        Self {
            tracker,
            watch,
            bot_user_id: OnceLock::new(),
        }
    }

    /// Threshold reactions are plain unicode; custom emoji never match.
    fn reaction_event(reaction: &Reaction) -> Option<ReactionEvent> {
        let guild_id = reaction.guild_id?;
        let user_id = reaction.user_id?;
        let ReactionType::Unicode(emoji) = &reaction.emoji else {
            return None;
        };
        Some(ReactionEvent {
            target: MessageTarget::new(
                guild_id.get(),
                reaction.channel_id.get(),
                reaction.message_id.get(),
            ),
            user_id: user_id.get(),
            emoji: emoji.clone(),
        })
    }

    fn bot_user_id(&self) -> Option<u64> {
        self.bot_user_id.get().copied()
    }
}

#[async_trait]
impl EventHandler for Handler {
    async fn ready(&self, _ctx: Context, ready: Ready) {
        let _ = self.bot_user_id.set(ready.user.id.get());
        info!(user = %ready.user.name, guilds = ready.guilds.len(), "connected to Discord");

        for entry in &self.watch {
            match self
                .tracker
                .ensure_tracking(entry.guild_id, entry.channel_id, &entry.address)
                .await
            {
                Ok(target) => info!(tracking = %target, address = %entry.address, "watching"),
                Err(e) => error!(
                    guild_id = entry.guild_id,
                    channel_id = entry.channel_id,
                    address = %entry.address,
                    error = %e,
                    "failed to set up watched server"
                ),
            }
        }
    }

    async fn reaction_add(&self, _ctx: Context, reaction: Reaction) {
        let (Some(bot_id), Some(event)) = (self.bot_user_id(), Self::reaction_event(&reaction))
        else {
            return;
        };
        if let Err(e) = self.tracker.handle_reaction_add(bot_id, &event).await {
            warn!(tracking = %event.target, user_id = event.user_id, error = %e, "failed to apply reaction");
        }
    }

    async fn reaction_remove(&self, _ctx: Context, reaction: Reaction) {
        let (Some(bot_id), Some(event)) = (self.bot_user_id(), Self::reaction_event(&reaction))
        else {
            return;
        };
        if let Err(e) = self.tracker.handle_reaction_remove(bot_id, &event).await {
            warn!(tracking = %event.target, user_id = event.user_id, error = %e, "failed to apply reaction removal");
        }
    }

    async fn message_delete(
        &self,
        _ctx: Context,
        channel_id: ChannelId,
        deleted_message_id: MessageId,
        guild_id: Option<GuildId>,
    ) {
        let Some(guild_id) = guild_id else {
            return;
        };
        let target = MessageTarget::new(guild_id.get(), channel_id.get(), deleted_message_id.get());
        if let Err(e) = self.tracker.handle_message_deleted(&target).await {
            warn!(tracking = %target, error = %e, "failed to drop tracking of deleted message");
        }
    }

    async fn channel_delete(
        &self,
        _ctx: Context,
        channel: GuildChannel,
        _messages: Option<Vec<Message>>,
    ) {
        let (guild_id, channel_id) = (channel.guild_id.get(), channel.id.get());
        if let Err(e) = self.tracker.handle_channel_deleted(guild_id, channel_id).await {
            warn!(guild_id, channel_id, error = %e, "failed to drop trackings of deleted channel");
        }
    }
}

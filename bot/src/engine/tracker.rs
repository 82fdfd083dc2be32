//! The poll / diff / notify loop and everything that mutates trackings.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use sqlx::SqlitePool;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::db::queries::snapshot::SqliteSnapshots;
use crate::db::queries::{channels, subscriptions, trackings};
use crate::error::{ChatError, CycleError, StoreError, TrackingError};
use crate::poll::ServerSource;

use super::chat::ChatPlatform;
use super::diff::{self, Change, ChangeKind};
use super::emoji::threshold_emoji;
use super::format;
use super::model::{MessageTarget, Threshold, Tracking};
use super::notify::{self, ReactionEvent, ReactionOutcome};
use super::repository::SnapshotRepository;
use super::snapshot::current_snapshot;
use super::validation::{validate_address, validate_message};

/// Summary of one poll cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub changed_addresses: Vec<String>,
    pub new: usize,
    pub changed: usize,
    pub offline: usize,
    /// Messages edited successfully.
    pub delivered: usize,
    /// Edits that failed and were skipped.
    pub failed: usize,
    /// Trackings dropped because their message no longer exists.
    pub removed: usize,
}

/// Owns the poll loop and the tracking lifecycle.
pub struct Tracker {
    pool: SqlitePool,
    snapshots: SqliteSnapshots,
    chat: Arc<dyn ChatPlatform>,
    source: Arc<dyn ServerSource>,
    chat_timeout: Duration,
}

impl Tracker {
    pub fn new(
        pool: SqlitePool,
        chat: Arc<dyn ChatPlatform>,
        source: Arc<dyn ServerSource>,
        chat_timeout: Duration,
    ) -> Self {
        Self {
            snapshots: SqliteSnapshots::new(pool.clone()),
            pool,
            chat,
            source,
            chat_timeout,
        }
    }

    /// Bound a chat call by the configured timeout.
    async fn call<T>(
        &self,
        fut: impl Future<Output = Result<T, ChatError>>,
    ) -> Result<T, ChatError> {
        tokio::time::timeout(self.chat_timeout, fut)
            .await
            .map_err(|_| ChatError::Timeout)?
    }

    /// Run cycles every `interval` until `cancel` fires. Cancellation is only
    /// observed between cycles.
    pub async fn run(&self, interval: Duration, cancel: CancellationToken) {
        info!(interval_secs = interval.as_secs(), "poll loop started");
        loop {
            match self.run_cycle().await {
                Ok(report) if report.new + report.changed + report.offline == 0 => {
                    debug!("poll cycle: nothing changed");
                }
                Ok(report) => {
                    info!(
                        new = report.new,
                        changed = report.changed,
                        offline = report.offline,
                        delivered = report.delivered,
                        failed = report.failed,
                        addresses = ?report.changed_addresses,
                        "poll cycle complete"
                    );
                }
                Err(e) => warn!(error = %e, "poll cycle aborted"),
            }

            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("poll loop shutting down");
                    break;
                }
                _ = tokio::time::sleep(interval) => {}
            }
        }
    }

    /// Poll once, announce every change and persist the new snapshot.
    pub async fn run_cycle(&self) -> Result<CycleReport, CycleError> {
        let servers = self.source.fetch().await?;
        let tracked = trackings::list_trackings(&self.pool).await?;
        let current = current_snapshot(&servers, &tracked);
        let previous = self.snapshots.load().await?;

        let mut diff = diff::compute(&previous, &current);
        let mut report = CycleReport {
            changed_addresses: diff.changed_addresses.clone(),
            new: diff.count(ChangeKind::New),
            changed: diff.count(ChangeKind::Changed),
            offline: diff.count(ChangeKind::Offline),
            ..Default::default()
        };
        if diff.is_empty() {
            return Ok(report);
        }

        let subs = subscriptions::list_for_targets(&self.pool, &diff.targets()).await?;
        notify::attach_mentions(&mut diff.changes, &subs);

        for change in &diff.changes {
            match self.deliver(change).await {
                Ok(()) => report.delivered += 1,
                Err(ChatError::NotFound) => {
                    report.failed += 1;
                    if self.drop_missing(&change.target).await {
                        report.removed += 1;
                    }
                }
                Err(e) => {
                    report.failed += 1;
                    warn!(tracking = %change.target, error = %e, "failed to update status message");
                }
            }
        }

        diff.commit(&self.snapshots).await?;
        Ok(report)
    }

    async fn deliver(&self, change: &Change) -> Result<(), ChatError> {
        let content = format::render(change);
        validate_message(&content).map_err(ChatError::Platform)?;
        self.call(self.chat.edit_message(&change.target, &content)).await?;
        debug!(
            tracking = %change.target,
            kind = ?change.kind(),
            mentions = change.mentions.len(),
            "status message updated"
        );
        Ok(())
    }

    /// Forget a tracking whose message vanished. Returns whether a row was removed.
    async fn drop_missing(&self, target: &MessageTarget) -> bool {
        match trackings::remove_tracking(&self.pool, target).await {
            Ok(()) => {
                info!(tracking = %target, "status message is gone, tracking removed");
                true
            }
            Err(e) if e.is_not_found() => false,
            Err(e) => {
                error!(tracking = %target, error = %e, "failed to remove tracking");
                false
            }
        }
    }

    /// Post a placeholder into the channel and start tracking `address` there.
    pub async fn add_tracking(
        &self,
        guild_id: u64,
        channel_id: u64,
        address: &str,
    ) -> Result<MessageTarget, TrackingError> {
        let address = validate_address(address)
            .map_err(|_| TrackingError::InvalidAddress(address.to_string()))?;

        let content = format::render_placeholder(&address);
        let message_id = self
            .call(self.chat.send_message(guild_id, channel_id, &content))
            .await?;
        let target = MessageTarget::new(guild_id, channel_id, message_id);

        let tracking = Tracking { target, address };
        if let Err(e) = trackings::add_tracking(&self.pool, &tracking).await {
            if let Err(del) = self.call(self.chat.delete_message(&target)).await {
                warn!(tracking = %target, error = %del, "failed to delete orphaned placeholder");
            }
            return Err(e.into());
        }

        for threshold in Threshold::all() {
            let emoji = threshold_emoji(threshold);
            if let Err(e) = self.call(self.chat.add_reaction(&target, emoji)).await {
                warn!(tracking = %target, error = %e, "failed to add threshold reactions");
                break;
            }
        }

        info!(tracking = %target, address = %tracking.address, "tracking created");
        Ok(target)
    }

    /// Make sure `address` is tracked in the channel, creating a status
    /// message only if none exists yet.
    pub async fn ensure_tracking(
        &self,
        guild_id: u64,
        channel_id: u64,
        address: &str,
    ) -> Result<MessageTarget, TrackingError> {
        let normalized = validate_address(address)
            .map_err(|_| TrackingError::InvalidAddress(address.to_string()))?;
        let existing = trackings::list_channel_trackings(&self.pool, guild_id, channel_id).await?;
        if let Some(tracking) = existing.iter().find(|t| t.address == normalized) {
            return Ok(tracking.target);
        }
        self.add_tracking(guild_id, channel_id, &normalized).await
    }

    /// Stop tracking a message and delete it from the channel.
    pub async fn remove_tracking(&self, target: &MessageTarget) -> Result<(), TrackingError> {
        trackings::remove_tracking(&self.pool, target).await?;
        match self.call(self.chat.delete_message(target)).await {
            Ok(()) | Err(ChatError::NotFound) => {}
            Err(e) => warn!(tracking = %target, error = %e, "failed to delete status message"),
        }
        info!(tracking = %target, "tracking removed");
        Ok(())
    }

    /// The message was deleted on the platform.
    pub async fn handle_message_deleted(&self, target: &MessageTarget) -> Result<(), StoreError> {
        match trackings::remove_tracking(&self.pool, target).await {
            Ok(()) => {
                info!(tracking = %target, "status message deleted, tracking removed");
                Ok(())
            }
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// The channel was deleted on the platform.
    pub async fn handle_channel_deleted(
        &self,
        guild_id: u64,
        channel_id: u64,
    ) -> Result<(), StoreError> {
        match channels::remove_channel(&self.pool, guild_id, channel_id).await {
            Ok(()) => {
                info!(guild_id, channel_id, "channel deleted, trackings removed");
                Ok(())
            }
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// A reaction was added. On a threshold switch the user's stale reaction
    /// is taken off the message.
    pub async fn handle_reaction_add(
        &self,
        bot_user_id: u64,
        event: &ReactionEvent,
    ) -> Result<ReactionOutcome, StoreError> {
        let outcome = notify::apply_reaction_add(&self.pool, bot_user_id, event).await?;
        if let ReactionOutcome::Updated { previous, .. } = outcome {
            let stale = threshold_emoji(previous);
            if let Err(e) = self
                .call(self.chat.remove_reaction(&event.target, event.user_id, stale))
                .await
            {
                warn!(
                    tracking = %event.target,
                    user_id = event.user_id,
                    error = %e,
                    "failed to remove superseded reaction"
                );
            }
        }
        Ok(outcome)
    }

    pub async fn handle_reaction_remove(
        &self,
        bot_user_id: u64,
        event: &ReactionEvent,
    ) -> Result<ReactionOutcome, StoreError> {
        notify::apply_reaction_remove(&self.pool, bot_user_id, event).await
    }
}

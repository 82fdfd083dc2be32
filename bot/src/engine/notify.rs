//! Player-count notifications: who gets mentioned on a change, and how
//! reactions on a status message turn into subscriptions.

use std::collections::{BTreeSet, HashMap};

use sqlx::SqlitePool;
use tracing::{debug, info};

use crate::db::queries::subscriptions;
use crate::error::StoreError;

use super::diff::Change;
use super::emoji::threshold_from_emoji;
use super::model::{MessageTarget, Subscription, Threshold};

/// Fill in `mentions` of every online change whose player count reached a
/// subscriber's threshold.
pub fn attach_mentions(changes: &mut [Change], subscriptions: &[Subscription]) {
    let mut by_target: HashMap<MessageTarget, Vec<&Subscription>> = HashMap::new();
    for sub in subscriptions {
        by_target.entry(sub.target).or_default().push(sub);
    }

    for change in changes {
        let Some(curr) = &change.curr else {
            change.mentions.clear();
            continue;
        };
        let players = curr.player_count();
        let firing: BTreeSet<u64> = by_target
            .get(&change.target)
            .into_iter()
            .flatten()
            .filter(|sub| sub.threshold.fires(players))
            .map(|sub| sub.user_id)
            .collect();
        change.mentions = firing.into_iter().collect();
    }
}

/// A reaction added to or removed from a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReactionEvent {
    pub target: MessageTarget,
    pub user_id: u64,
    pub emoji: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReactionOutcome {
    /// Not a threshold emoji, not a tracked message, or the bot's own reaction.
    Ignored,
    Subscribed(Threshold),
    /// The user switched thresholds; the reaction for `previous` is stale.
    Updated {
        previous: Threshold,
        current: Threshold,
    },
    /// Same threshold as before.
    Unchanged(Threshold),
    Unsubscribed(Threshold),
}

/// Subscribe the reacting user at the emoji's threshold.
pub async fn apply_reaction_add(
    pool: &SqlitePool,
    bot_user_id: u64,
    event: &ReactionEvent,
) -> Result<ReactionOutcome, StoreError> {
    if event.user_id == bot_user_id {
        return Ok(ReactionOutcome::Ignored);
    }
    let Some(threshold) = threshold_from_emoji(&event.emoji) else {
        return Ok(ReactionOutcome::Ignored);
    };

    let previous =
        match subscriptions::set_threshold(pool, &event.target, event.user_id, threshold).await {
            Ok(previous) => previous,
            Err(e) if e.is_not_found() => {
                debug!(tracking = %event.target, "reaction on untracked message");
                return Ok(ReactionOutcome::Ignored);
            }
            Err(e) => return Err(e),
        };

    let outcome = match previous {
        None => ReactionOutcome::Subscribed(threshold),
        Some(previous) if previous == threshold => ReactionOutcome::Unchanged(threshold),
        Some(previous) => ReactionOutcome::Updated {
            previous,
            current: threshold,
        },
    };
    info!(
        tracking = %event.target,
        user_id = event.user_id,
        threshold = threshold.get(),
        ?outcome,
        "subscription set"
    );
    Ok(outcome)
}

/// Unsubscribe the user, as long as the removed emoji is their current
/// threshold. Removing a superseded reaction leaves the subscription alone.
pub async fn apply_reaction_remove(
    pool: &SqlitePool,
    bot_user_id: u64,
    event: &ReactionEvent,
) -> Result<ReactionOutcome, StoreError> {
    if event.user_id == bot_user_id {
        return Ok(ReactionOutcome::Ignored);
    }
    let Some(threshold) = threshold_from_emoji(&event.emoji) else {
        return Ok(ReactionOutcome::Ignored);
    };

    match subscriptions::remove_subscription(pool, &event.target, event.user_id, threshold).await
    {
        Ok(()) => {
            info!(
                tracking = %event.target,
                user_id = event.user_id,
                threshold = threshold.get(),
                "subscription removed"
            );
            Ok(ReactionOutcome::Unsubscribed(threshold))
        }
        Err(e) if e.is_not_found() => Ok(ReactionOutcome::Ignored),
        Err(e) => Err(e),
    }
}

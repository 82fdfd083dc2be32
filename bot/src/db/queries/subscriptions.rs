use sqlx::{QueryBuilder, Sqlite, SqlitePool};

use crate::db::models::SubscriptionRow;
use crate::db::{from_db_id, to_db_id};
use crate::engine::model::{MessageTarget, Subscription, Threshold};
use crate::error::StoreError;

fn subscription_from_row(row: SubscriptionRow) -> Result<Subscription, StoreError> {
    let threshold = u8::try_from(row.threshold)
        .ok()
        .and_then(Threshold::new)
        .ok_or_else(|| {
            StoreError::Corrupt(format!(
                "threshold {} on {} for user {}",
                row.threshold,
                row.target(),
                row.user_id
            ))
        })?;
    Ok(Subscription {
        target: row.target(),
        user_id: from_db_id(row.user_id),
        threshold,
    })
}

/// Set a user's threshold on a tracked message, replacing any earlier one.
/// Returns the threshold that was replaced.
///
/// Takes the write lock up front: a deferred transaction fails with
/// `SQLITE_BUSY_SNAPSHOT` when another writer commits between its reads and
/// the upsert.
pub async fn set_threshold(
    pool: &SqlitePool,
    target: &MessageTarget,
    user_id: u64,
    threshold: Threshold,
) -> Result<Option<Threshold>, StoreError> {
    let mut tx = pool.begin_with("BEGIN IMMEDIATE").await?;

    let tracked: Option<i64> = sqlx::query_scalar(
        "SELECT 1 FROM trackings WHERE guild_id = ? AND channel_id = ? AND message_id = ?",
    )
    .bind(to_db_id(target.guild_id))
    .bind(to_db_id(target.channel_id))
    .bind(to_db_id(target.message_id))
    .fetch_optional(&mut *tx)
    .await?;
    if tracked.is_none() {
        return Err(StoreError::not_found(format!("tracking {target}")));
    }

    let previous: Option<i64> = sqlx::query_scalar(
        "SELECT threshold FROM player_count_notifications \
         WHERE guild_id = ? AND channel_id = ? AND message_id = ? AND user_id = ?",
    )
    .bind(to_db_id(target.guild_id))
    .bind(to_db_id(target.channel_id))
    .bind(to_db_id(target.message_id))
    .bind(to_db_id(user_id))
    .fetch_optional(&mut *tx)
    .await?;

    sqlx::query(
        "INSERT INTO player_count_notifications \
         (guild_id, channel_id, message_id, user_id, threshold) VALUES (?, ?, ?, ?, ?) \
         ON CONFLICT (guild_id, channel_id, message_id, user_id) \
         DO UPDATE SET threshold = excluded.threshold, updated_at = datetime('now')",
    )
    .bind(to_db_id(target.guild_id))
    .bind(to_db_id(target.channel_id))
    .bind(to_db_id(target.message_id))
    .bind(to_db_id(user_id))
    .bind(i64::from(threshold.get()))
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(previous
        .and_then(|t| u8::try_from(t).ok())
        .and_then(Threshold::new))
}

/// Remove a user's subscription, but only while it is still at `threshold`.
pub async fn remove_subscription(
    pool: &SqlitePool,
    target: &MessageTarget,
    user_id: u64,
    threshold: Threshold,
) -> Result<(), StoreError> {
    let result = sqlx::query(
        "DELETE FROM player_count_notifications \
         WHERE guild_id = ? AND channel_id = ? AND message_id = ? AND user_id = ? \
         AND threshold = ?",
    )
    .bind(to_db_id(target.guild_id))
    .bind(to_db_id(target.channel_id))
    .bind(to_db_id(target.message_id))
    .bind(to_db_id(user_id))
    .bind(i64::from(threshold.get()))
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(StoreError::not_found(format!(
            "subscription of user {user_id} at {} on {target}",
            threshold.get()
        )));
    }
    Ok(())
}

/// Current threshold of a user on a message.
#[cfg(test)]
pub async fn get_threshold(
    pool: &SqlitePool,
    target: &MessageTarget,
    user_id: u64,
) -> Result<Option<Threshold>, StoreError> {
    let row = sqlx::query_as::<_, SubscriptionRow>(
        "SELECT guild_id, channel_id, message_id, user_id, threshold \
         FROM player_count_notifications \
         WHERE guild_id = ? AND channel_id = ? AND message_id = ? AND user_id = ?",
    )
    .bind(to_db_id(target.guild_id))
    .bind(to_db_id(target.channel_id))
    .bind(to_db_id(target.message_id))
    .bind(to_db_id(user_id))
    .fetch_optional(pool)
    .await?;
    row.map(subscription_from_row)
        .transpose()
        .map(|sub| sub.map(|s| s.threshold))
}

/// All subscriptions of one message, ordered by user.
#[cfg(test)]
pub async fn list_for_target(
    pool: &SqlitePool,
    target: &MessageTarget,
) -> Result<Vec<Subscription>, StoreError> {
    let rows = sqlx::query_as::<_, SubscriptionRow>(
        "SELECT guild_id, channel_id, message_id, user_id, threshold \
         FROM player_count_notifications \
         WHERE guild_id = ? AND channel_id = ? AND message_id = ? \
         ORDER BY user_id",
    )
    .bind(to_db_id(target.guild_id))
    .bind(to_db_id(target.channel_id))
    .bind(to_db_id(target.message_id))
    .fetch_all(pool)
    .await?;
    rows.into_iter().map(subscription_from_row).collect()
}

/// Subscriptions of every message in `targets`, read in one query.
pub async fn list_for_targets(
    pool: &SqlitePool,
    targets: &[MessageTarget],
) -> Result<Vec<Subscription>, StoreError> {
    if targets.is_empty() {
        return Ok(Vec::new());
    }
    let mut query: QueryBuilder<'_, Sqlite> = QueryBuilder::new(
        "SELECT guild_id, channel_id, message_id, user_id, threshold \
         FROM player_count_notifications \
         WHERE (guild_id, channel_id, message_id) IN (",
    );
    query.push_values(targets, |mut row, target| {
        row.push_bind(to_db_id(target.guild_id))
            .push_bind(to_db_id(target.channel_id))
            .push_bind(to_db_id(target.message_id));
    });
    query.push(") ORDER BY guild_id, channel_id, message_id, user_id");

    let rows = query
        .build_query_as::<SubscriptionRow>()
        .fetch_all(pool)
        .await?;
    rows.into_iter().map(subscription_from_row).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::pool::{create_pool, run_migrations};
    use crate::db::queries::{snapshot, trackings};
    use crate::engine::diff::tests::server;
    use crate::engine::model::{Snapshot, Tracking};

    async fn setup_db() -> SqlitePool {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();
        pool
    }

    async fn track(pool: &SqlitePool, message_id: u64) -> MessageTarget {
        let target = MessageTarget::new(1, 10, message_id);
        trackings::add_tracking(
            pool,
            &Tracking {
                target,
                address: "1.2.3.4:8303".into(),
            },
        )
        .await
        .unwrap();
        target
    }

    fn t(value: u8) -> Threshold {
        Threshold::new(value).unwrap()
    }

    #[tokio::test]
    async fn test_set_threshold_creates_then_replaces() {
        let pool = setup_db().await;
        let target = track(&pool, 100).await;

        assert_eq!(set_threshold(&pool, &target, 7, t(3)).await.unwrap(), None);
        assert_eq!(
            set_threshold(&pool, &target, 7, t(5)).await.unwrap(),
            Some(t(3))
        );
        assert_eq!(get_threshold(&pool, &target, 7).await.unwrap(), Some(t(5)));
        assert_eq!(list_for_target(&pool, &target).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_set_threshold_on_untracked_message() {
        let pool = setup_db().await;
        let ghost = MessageTarget::new(1, 10, 999);
        let err = set_threshold(&pool, &ghost, 7, t(3)).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_remove_only_matching_threshold() {
        let pool = setup_db().await;
        let target = track(&pool, 100).await;
        set_threshold(&pool, &target, 7, t(4)).await.unwrap();

        let err = remove_subscription(&pool, &target, 7, t(2))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(get_threshold(&pool, &target, 7).await.unwrap(), Some(t(4)));

        remove_subscription(&pool, &target, 7, t(4)).await.unwrap();
        assert_eq!(get_threshold(&pool, &target, 7).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_list_for_targets_filters_and_orders() {
        let pool = setup_db().await;
        let a = track(&pool, 100).await;
        let b = track(&pool, 200).await;
        let c = track(&pool, 300).await;
        set_threshold(&pool, &a, 9, t(1)).await.unwrap();
        set_threshold(&pool, &a, 8, t(2)).await.unwrap();
        set_threshold(&pool, &b, 8, t(3)).await.unwrap();
        set_threshold(&pool, &c, 8, t(4)).await.unwrap();

        let subs = list_for_targets(&pool, &[b, a]).await.unwrap();
        let pairs: Vec<(u64, u64)> = subs
            .iter()
            .map(|s| (s.target.message_id, s.user_id))
            .collect();
        assert_eq!(pairs, [(100, 8), (100, 9), (200, 8)]);
        assert!(list_for_targets(&pool, &[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_subscriptions_removed_with_tracking() {
        let pool = setup_db().await;
        let target = track(&pool, 100).await;
        set_threshold(&pool, &target, 7, t(3)).await.unwrap();

        trackings::remove_tracking(&pool, &target).await.unwrap();

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM player_count_notifications")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn test_large_user_ids_survive_storage() {
        let pool = setup_db().await;
        let target = track(&pool, 100).await;
        let user = u64::MAX - 5;
        set_threshold(&pool, &target, user, t(10)).await.unwrap();
        let subs = list_for_target(&pool, &target).await.unwrap();
        assert_eq!(subs[0].user_id, user);
        assert_eq!(subs[0].threshold, t(10));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_set_threshold_races_snapshot_replace() {
        let path = std::env::temp_dir().join(format!(
            "serverwatch-subscriptions-{}.db",
            std::process::id()
        ));
        let remove_files = || {
            for suffix in ["", "-wal", "-shm"] {
                let _ = std::fs::remove_file(format!("{}{suffix}", path.display()));
            }
        };
        remove_files();
        let url = format!("sqlite:{}?mode=rwc", path.display());
        let pool = create_pool(&url).await.unwrap();
        run_migrations(&pool).await.unwrap();
        let target = track(&pool, 100).await;
        let entries: Snapshot = [(target, server("1.2.3.4:8303", 4))].into_iter().collect();

        let mut replaces = Vec::new();
        let mut sets = Vec::new();
        for user in 1..=200u64 {
            let (p, e) = (pool.clone(), entries.clone());
            replaces.push(tokio::spawn(async move {
                snapshot::replace_snapshot(&p, &[target], &e).await
            }));
            let p = pool.clone();
            sets.push(tokio::spawn(async move {
                set_threshold(&p, &target, user, t(3)).await
            }));
        }
        for handle in replaces {
            handle.await.unwrap().unwrap();
        }
        let mut failed = Vec::new();
        for handle in sets {
            if let Err(e) = handle.await.unwrap() {
                failed.push(e.to_string());
            }
        }
        let stored = list_for_target(&pool, &target).await.unwrap().len();

        pool.close().await;
        remove_files();

        assert!(failed.is_empty(), "lost subscriptions: {failed:?}");
        assert_eq!(stored, 200);
    }
}

use sqlx::SqlitePool;

use crate::db::models::TrackingRow;
use crate::db::queries::channels;
use crate::db::to_db_id;
use crate::engine::model::{MessageTarget, Tracking};
use crate::error::StoreError;

/// Record a new status message. The channel row is created on demand.
pub async fn add_tracking(pool: &SqlitePool, tracking: &Tracking) -> Result<(), StoreError> {
    let target = &tracking.target;
    let mut tx = pool.begin_with("BEGIN IMMEDIATE").await?;
    channels::ensure_channel(&mut *tx, target.guild_id, target.channel_id).await?;
    sqlx::query(
        "INSERT INTO trackings (guild_id, channel_id, message_id, address) VALUES (?, ?, ?, ?)",
    )
    .bind(to_db_id(target.guild_id))
    .bind(to_db_id(target.channel_id))
    .bind(to_db_id(target.message_id))
    .bind(&tracking.address)
    .execute(&mut *tx)
    .await?;
    tx.commit().await?;
    Ok(())
}

/// Get the tracking behind a message, if any.
#[cfg(test)]
pub async fn get_tracking(
    pool: &SqlitePool,
    target: &MessageTarget,
) -> Result<Option<Tracking>, StoreError> {
    let row = sqlx::query_as::<_, TrackingRow>(
        "SELECT guild_id, channel_id, message_id, address FROM trackings \
         WHERE guild_id = ? AND channel_id = ? AND message_id = ?",
    )
    .bind(to_db_id(target.guild_id))
    .bind(to_db_id(target.channel_id))
    .bind(to_db_id(target.message_id))
    .fetch_optional(pool)
    .await?;
    Ok(row.map(Tracking::from))
}

/// List all trackings, ordered by target.
pub async fn list_trackings(pool: &SqlitePool) -> Result<Vec<Tracking>, StoreError> {
    let rows = sqlx::query_as::<_, TrackingRow>(
        "SELECT guild_id, channel_id, message_id, address FROM trackings \
         ORDER BY guild_id, channel_id, message_id",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(Tracking::from).collect())
}

/// List the trackings of one channel, ordered by message.
pub async fn list_channel_trackings(
    pool: &SqlitePool,
    guild_id: u64,
    channel_id: u64,
) -> Result<Vec<Tracking>, StoreError> {
    let rows = sqlx::query_as::<_, TrackingRow>(
        "SELECT guild_id, channel_id, message_id, address FROM trackings \
         WHERE guild_id = ? AND channel_id = ? ORDER BY message_id",
    )
    .bind(to_db_id(guild_id))
    .bind(to_db_id(channel_id))
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(Tracking::from).collect())
}

/// Remove a tracking. Its announced state and subscriptions go with it.
pub async fn remove_tracking(pool: &SqlitePool, target: &MessageTarget) -> Result<(), StoreError> {
    let result = sqlx::query(
        "DELETE FROM trackings WHERE guild_id = ? AND channel_id = ? AND message_id = ?",
    )
    .bind(to_db_id(target.guild_id))
    .bind(to_db_id(target.channel_id))
    .bind(to_db_id(target.message_id))
    .execute(pool)
    .await?;
    if result.rows_affected() == 0 {
        return Err(StoreError::not_found(format!("tracking {target}")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::pool::{create_pool, run_migrations};

    async fn setup_db() -> SqlitePool {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();
        pool
    }

    fn tracking(message_id: u64, address: &str) -> Tracking {
        Tracking {
            target: MessageTarget::new(1, 10, message_id),
            address: address.into(),
        }
    }

    #[tokio::test]
    async fn test_add_and_get_tracking() {
        let pool = setup_db().await;
        let t = tracking(100, "1.2.3.4:8303");
        add_tracking(&pool, &t).await.unwrap();

        assert_eq!(get_tracking(&pool, &t.target).await.unwrap(), Some(t));
        assert_eq!(channels::list_channels(&pool).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_tracking_rejected() {
        let pool = setup_db().await;
        add_tracking(&pool, &tracking(100, "1.2.3.4:8303"))
            .await
            .unwrap();
        let err = add_tracking(&pool, &tracking(100, "5.6.7.8:8303")).await;
        assert!(err.is_err());
        assert_eq!(list_trackings(&pool).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_list_trackings_ordered() {
        let pool = setup_db().await;
        for id in [300, 100, 200] {
            add_tracking(&pool, &tracking(id, "1.2.3.4:8303"))
                .await
                .unwrap();
        }
        let ids: Vec<u64> = list_trackings(&pool)
            .await
            .unwrap()
            .iter()
            .map(|t| t.target.message_id)
            .collect();
        assert_eq!(ids, [100, 200, 300]);
        assert_eq!(list_channel_trackings(&pool, 1, 10).await.unwrap().len(), 3);
        assert!(list_channel_trackings(&pool, 1, 11).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_remove_tracking() {
        let pool = setup_db().await;
        let t = tracking(100, "1.2.3.4:8303");
        add_tracking(&pool, &t).await.unwrap();
        remove_tracking(&pool, &t.target).await.unwrap();

        assert!(get_tracking(&pool, &t.target).await.unwrap().is_none());
        assert!(remove_tracking(&pool, &t.target).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_removing_channel_removes_trackings() {
        let pool = setup_db().await;
        add_tracking(&pool, &tracking(100, "1.2.3.4:8303"))
            .await
            .unwrap();
        channels::remove_channel(&pool, 1, 10).await.unwrap();
        assert!(list_trackings(&pool).await.unwrap().is_empty());
    }
}

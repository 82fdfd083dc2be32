use sqlx::{Executor, Sqlite, SqlitePool};

use crate::db::models::ChannelRow;
use crate::db::to_db_id;
use crate::error::StoreError;

/// Register a channel. Ignores if it already exists. Runs on a pool or
/// inside a caller's transaction.
pub async fn ensure_channel<'e, E>(
    executor: E,
    guild_id: u64,
    channel_id: u64,
) -> Result<(), StoreError>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query("INSERT OR IGNORE INTO channels (guild_id, channel_id) VALUES (?, ?)")
        .bind(to_db_id(guild_id))
        .bind(to_db_id(channel_id))
        .execute(executor)
        .await?;
    Ok(())
}

/// List all channels, ordered by guild then channel.
pub async fn list_channels(pool: &SqlitePool) -> Result<Vec<ChannelRow>, StoreError> {
    let rows = sqlx::query_as::<_, ChannelRow>(
        "SELECT guild_id, channel_id, created_at FROM channels ORDER BY guild_id, channel_id",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Remove a channel together with its trackings, announced state and
/// subscriptions (cascade).
pub async fn remove_channel(
    pool: &SqlitePool,
    guild_id: u64,
    channel_id: u64,
) -> Result<(), StoreError> {
    let result = sqlx::query("DELETE FROM channels WHERE guild_id = ? AND channel_id = ?")
        .bind(to_db_id(guild_id))
        .bind(to_db_id(channel_id))
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(StoreError::not_found(format!(
            "channel {guild_id}/{channel_id}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::from_db_id;
    use crate::db::pool::{create_pool, run_migrations};

    async fn setup_db() -> SqlitePool {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();
        pool
    }

    #[tokio::test]
    async fn test_ensure_channel_idempotent() {
        let pool = setup_db().await;
        ensure_channel(&pool, 1, 10).await.unwrap();
        ensure_channel(&pool, 1, 10).await.unwrap();
        ensure_channel(&pool, 1, 11).await.unwrap();

        let channels = list_channels(&pool).await.unwrap();
        assert_eq!(channels.len(), 2);
        assert_eq!(channels[0].channel_id, 10);
    }

    #[tokio::test]
    async fn test_remove_channel() {
        let pool = setup_db().await;
        ensure_channel(&pool, 1, 10).await.unwrap();
        remove_channel(&pool, 1, 10).await.unwrap();
        assert!(list_channels(&pool).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_remove_missing_channel_is_not_found() {
        let pool = setup_db().await;
        let err = remove_channel(&pool, 1, 10).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_large_snowflakes_survive() {
        let pool = setup_db().await;
        let guild = 1_234_567_890_123_456_789;
        ensure_channel(&pool, guild, 987_654_321_098_765_432).await.unwrap();
        let channels = list_channels(&pool).await.unwrap();
        assert_eq!(from_db_id(channels[0].guild_id), guild);
    }
}

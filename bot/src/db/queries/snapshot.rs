//! Relational storage of the last announced snapshot.
//!
//! A status is stored as one `prev_messages` row plus one `prev_clients` row
//! per client; [`SqliteSnapshots`] hides that split behind
//! [`SnapshotRepository`].

use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::SqlitePool;
use tracing::debug;

use crate::db::models::{PrevClientRow, PrevMessageRow};
use crate::db::to_db_id;
use crate::engine::model::{ClientStatus, MapInfo, MessageTarget, ScoreKind, ServerStatus, Snapshot};
use crate::engine::repository::SnapshotRepository;
use crate::error::StoreError;

/// [`SnapshotRepository`] over the `prev_messages` / `prev_clients` tables.
#[derive(Clone)]
pub struct SqliteSnapshots {
    pool: SqlitePool,
}

impl SqliteSnapshots {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SnapshotRepository for SqliteSnapshots {
    async fn load(&self) -> Result<Snapshot, StoreError> {
        load_snapshot(&self.pool).await
    }

    async fn replace(
        &self,
        message_ids: &[MessageTarget],
        entries: &Snapshot,
    ) -> Result<(), StoreError> {
        replace_snapshot(&self.pool, message_ids, entries).await
    }
}

fn status_from_row(row: PrevMessageRow) -> Result<ServerStatus, StoreError> {
    let protocols: Vec<String> = serde_json::from_str(&row.protocols)
        .map_err(|e| StoreError::Corrupt(format!("protocols of {}: {e}", row.target())))?;
    Ok(ServerStatus {
        address: row.address,
        protocols,
        name: row.name,
        game_type: row.game_type,
        passworded: row.passworded,
        map: MapInfo {
            name: row.map_name,
            sha256: row.map_sha256,
            size: row.map_size.map(|s| s as u64),
        },
        version: row.version,
        max_clients: row.max_clients,
        max_players: row.max_players,
        score_kind: ScoreKind::parse(&row.score_kind),
        clients: Vec::new(),
    })
}

fn client_from_row(row: PrevClientRow) -> ClientStatus {
    ClientStatus {
        name: row.name,
        clan: row.clan,
        country: row.country_id,
        score: row.score,
        is_player: row.is_player,
        team: row.team,
    }
}

/// Read both tables inside one transaction so a concurrent replace is never
/// seen half-applied.
pub async fn load_snapshot(pool: &SqlitePool) -> Result<Snapshot, StoreError> {
    let mut tx = pool.begin().await?;
    let messages = sqlx::query_as::<_, PrevMessageRow>(
        "SELECT guild_id, channel_id, message_id, address, protocols, name, game_type, \
         passworded, map_name, map_sha256, map_size, version, max_clients, max_players, \
         score_kind FROM prev_messages",
    )
    .fetch_all(&mut *tx)
    .await?;
    let clients = sqlx::query_as::<_, PrevClientRow>(
        "SELECT guild_id, channel_id, message_id, position, name, clan, country_id, score, \
         is_player, team FROM prev_clients \
         ORDER BY guild_id, channel_id, message_id, position",
    )
    .fetch_all(&mut *tx)
    .await?;
    tx.commit().await?;

    let mut statuses: HashMap<MessageTarget, ServerStatus> = HashMap::with_capacity(messages.len());
    for row in messages {
        statuses.insert(row.target(), status_from_row(row)?);
    }
    for row in clients {
        let target = row.target();
        match statuses.get_mut(&target) {
            Some(status) => status.clients.push(client_from_row(row)),
            None => return Err(StoreError::Corrupt(format!("client without server at {target}"))),
        }
    }
    Ok(statuses.into_iter().collect())
}

/// Delete the rows of `message_ids`, then insert `entries`, in one
/// transaction. Entries whose tracking no longer exists are skipped.
pub async fn replace_snapshot(
    pool: &SqlitePool,
    message_ids: &[MessageTarget],
    entries: &Snapshot,
) -> Result<(), StoreError> {
    let mut tx = pool.begin_with("BEGIN IMMEDIATE").await?;

    for target in message_ids {
        sqlx::query(
            "DELETE FROM prev_clients WHERE guild_id = ? AND channel_id = ? AND message_id = ?",
        )
        .bind(to_db_id(target.guild_id))
        .bind(to_db_id(target.channel_id))
        .bind(to_db_id(target.message_id))
        .execute(&mut *tx)
        .await?;
        sqlx::query(
            "DELETE FROM prev_messages WHERE guild_id = ? AND channel_id = ? AND message_id = ?",
        )
        .bind(to_db_id(target.guild_id))
        .bind(to_db_id(target.channel_id))
        .bind(to_db_id(target.message_id))
        .execute(&mut *tx)
        .await?;
    }

    for (target, status) in entries {
        let protocols = serde_json::to_string(&status.protocols)
            .map_err(|e| StoreError::Corrupt(format!("protocols of {target}: {e}")))?;
        let inserted = sqlx::query(
            "INSERT INTO prev_messages (guild_id, channel_id, message_id, address, protocols, \
             name, game_type, passworded, map_name, map_sha256, map_size, version, \
             max_clients, max_players, score_kind) \
             SELECT ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ? \
             WHERE EXISTS (SELECT 1 FROM trackings \
                           WHERE guild_id = ? AND channel_id = ? AND message_id = ?)",
        )
        .bind(to_db_id(target.guild_id))
        .bind(to_db_id(target.channel_id))
        .bind(to_db_id(target.message_id))
        .bind(&status.address)
        .bind(protocols)
        .bind(&status.name)
        .bind(&status.game_type)
        .bind(status.passworded)
        .bind(&status.map.name)
        .bind(status.map.sha256.as_deref())
        .bind(status.map.size.map(|s| s as i64))
        .bind(&status.version)
        .bind(status.max_clients)
        .bind(status.max_players)
        .bind(status.score_kind.as_str())
        .bind(to_db_id(target.guild_id))
        .bind(to_db_id(target.channel_id))
        .bind(to_db_id(target.message_id))
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if inserted == 0 {
            debug!(tracking = %target, "tracking removed during cycle, skipping announced state");
            continue;
        }

        for (position, client) in status.clients.iter().enumerate() {
            sqlx::query(
                "INSERT INTO prev_clients (guild_id, channel_id, message_id, position, name, \
                 clan, country_id, score, is_player, team) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(to_db_id(target.guild_id))
            .bind(to_db_id(target.channel_id))
            .bind(to_db_id(target.message_id))
            .bind(position as i64)
            .bind(&client.name)
            .bind(&client.clan)
            .bind(client.country)
            .bind(client.score)
            .bind(client.is_player)
            .bind(client.team)
            .execute(&mut *tx)
            .await?;
        }
    }

    tx.commit().await?;
    Ok(())
}

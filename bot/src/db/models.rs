use crate::engine::model::{MessageTarget, Tracking};

use super::from_db_id;

/// A channel that holds status messages.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ChannelRow {
    pub guild_id: i64,
    pub channel_id: i64,
    pub created_at: String,
}

/// A status message and the address it mirrors.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TrackingRow {
    pub guild_id: i64,
    pub channel_id: i64,
    pub message_id: i64,
    pub address: String,
}

impl TrackingRow {
    pub fn target(&self) -> MessageTarget {
        MessageTarget::new(
            from_db_id(self.guild_id),
            from_db_id(self.channel_id),
            from_db_id(self.message_id),
        )
    }
}

impl From<TrackingRow> for Tracking {
    fn from(row: TrackingRow) -> Self {
        Tracking {
            target: row.target(),
            address: row.address,
        }
    }
}

/// Server half of the last announced state of one message.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PrevMessageRow {
    pub guild_id: i64,
    pub channel_id: i64,
    pub message_id: i64,
    pub address: String,
    /// JSON array of protocol names.
    pub protocols: String,
    pub name: String,
    pub game_type: String,
    pub passworded: bool,
    pub map_name: String,
    pub map_sha256: Option<String>,
    pub map_size: Option<i64>,
    pub version: String,
    pub max_clients: u32,
    pub max_players: u32,
    pub score_kind: String,
}

impl PrevMessageRow {
    pub fn target(&self) -> MessageTarget {
        MessageTarget::new(
            from_db_id(self.guild_id),
            from_db_id(self.channel_id),
            from_db_id(self.message_id),
        )
    }
}

/// One client of the last announced state, `position` being its display slot.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PrevClientRow {
    pub guild_id: i64,
    pub channel_id: i64,
    pub message_id: i64,
    pub position: i64,
    pub name: String,
    pub clan: String,
    pub country_id: i32,
    pub score: i32,
    pub is_player: bool,
    pub team: i32,
}

impl PrevClientRow {
    pub fn target(&self) -> MessageTarget {
        MessageTarget::new(
            from_db_id(self.guild_id),
            from_db_id(self.channel_id),
            from_db_id(self.message_id),
        )
    }
}

/// A player-count threshold chosen by a user on a status message.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SubscriptionRow {
    pub guild_id: i64,
    pub channel_id: i64,
    pub message_id: i64,
    pub user_id: i64,
    pub threshold: i64,
}

impl SubscriptionRow {
    pub fn target(&self) -> MessageTarget {
        MessageTarget::new(
            from_db_id(self.guild_id),
            from_db_id(self.channel_id),
            from_db_id(self.message_id),
        )
    }
}

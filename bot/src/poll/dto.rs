use serde::{Deserialize, Serialize};

/// Top-level document served by the master list.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerList {
    #[serde(default)]
    pub servers: Vec<ServerDto>,
}

/// One entry of the master list. The same server shows up once per
/// registered protocol, so addresses repeat across entries.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerDto {
    /// `"{protocol}://{ip}:{port}"`, e.g. `"tw-0.6+udp://1.2.3.4:8303"`.
    #[serde(default)]
    pub addresses: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    pub info: ServerInfoDto,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerInfoDto {
    #[serde(default)]
    pub max_clients: u32,
    #[serde(default)]
    pub max_players: u32,
    #[serde(default)]
    pub passworded: bool,
    #[serde(default)]
    pub game_type: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub map: MapDto,
    #[serde(default)]
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_score_kind: Option<String>,
    #[serde(default)]
    pub clients: Vec<ClientDto>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MapDto {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientDto {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub clan: String,
    #[serde(default = "default_country")]
    pub country: i32,
    #[serde(default)]
    pub score: i32,
    #[serde(default = "default_is_player")]
    pub is_player: bool,
    #[serde(default)]
    pub team: i32,
}

fn default_country() -> i32 {
    -1
}

fn default_is_player() -> bool {
    true
}

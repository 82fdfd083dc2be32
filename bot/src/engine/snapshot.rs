//! Builds the current [`Snapshot`] from the polled server list.
//!
//! The master list is flat and repeats a server once per protocol, so entries
//! are first folded into one [`ServerStatus`] per address and then joined
//! against the tracked messages.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::net::SocketAddr;

use tracing::debug;

use crate::poll::dto::{ClientDto, ServerDto, ServerInfoDto};

use super::model::{ClientStatus, MapInfo, ScoreKind, ServerStatus, Snapshot, Tracking};

/// Split `"tw-0.6+udp://1.2.3.4:8303"` into its protocol and normalized address.
/// An address without a scheme yields an empty protocol.
pub fn split_address(raw: &str) -> Option<(&str, String)> {
    let (protocol, address) = raw.split_once("://").unwrap_or(("", raw));
    let address = address.trim().trim_end_matches('/');
    if address.is_empty() {
        return None;
    }
    Some((protocol, normalize_address(address)))
}

/// Canonical textual form of `ip:port`; anything unparsable is kept verbatim.
pub fn normalize_address(address: &str) -> String {
    address
        .parse::<SocketAddr>()
        .map(|addr| addr.to_string())
        .unwrap_or_else(|_| address.to_string())
}

fn status_from_info(address: &str, info: &ServerInfoDto) -> ServerStatus {
    ServerStatus {
        address: address.to_string(),
        protocols: Vec::new(),
        name: info.name.clone(),
        game_type: info.game_type.clone(),
        passworded: info.passworded,
        map: MapInfo {
            name: info.map.name.clone(),
            sha256: info.map.sha256.clone(),
            size: info.map.size,
        },
        version: info.version.clone(),
        max_clients: info.max_clients,
        max_players: info.max_players,
        score_kind: info
            .client_score_kind
            .as_deref()
            .map(ScoreKind::parse)
            .unwrap_or_default(),
        clients: info.clients.iter().map(client_from_dto).collect(),
    }
}

fn client_from_dto(dto: &ClientDto) -> ClientStatus {
    ClientStatus {
        name: dto.name.clone(),
        clan: dto.clan.clone(),
        country: dto.country,
        score: dto.score,
        is_player: dto.is_player,
        team: dto.team,
    }
}

/// Fold the flat list into one status per address. The first entry seen for
/// an address provides the server info; later duplicates only add protocols.
pub fn index_by_address(servers: &[ServerDto]) -> HashMap<String, ServerStatus> {
    let mut index: HashMap<String, ServerStatus> = HashMap::new();
    for server in servers {
        for raw in &server.addresses {
            let Some((protocol, address)) = split_address(raw) else {
                debug!(%raw, "skipping unparsable server address");
                continue;
            };
            let status = match index.entry(address) {
                Entry::Occupied(entry) => entry.into_mut(),
                Entry::Vacant(entry) => {
                    let status = status_from_info(entry.key(), &server.info);
                    entry.insert(status)
                }
            };
            if !protocol.is_empty() {
                status.protocols.push(protocol.to_string());
            }
        }
    }
    for status in index.values_mut() {
        status.canonicalize();
    }
    index
}

/// The current snapshot: every tracked message whose server is online.
/// Servers nobody tracks are dropped.
pub fn current_snapshot(servers: &[ServerDto], trackings: &[Tracking]) -> Snapshot {
    let index = index_by_address(servers);
    trackings
        .iter()
        .filter_map(|tracking| {
            index
                .get(&normalize_address(&tracking.address))
                .map(|status| (tracking.target, status.clone()))
        })
        .collect()
}

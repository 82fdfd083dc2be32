use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::collections::btree_map;
use std::fmt;

/// Score the master list reports for race clients that have not finished yet.
pub const NO_TIME: i32 = -9999;

/// Identity of one chat message that mirrors one tracked server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MessageTarget {
    pub guild_id: u64,
    pub channel_id: u64,
    pub message_id: u64,
}

impl MessageTarget {
    pub fn new(guild_id: u64, channel_id: u64, message_id: u64) -> Self {
        Self {
            guild_id,
            channel_id,
            message_id,
        }
    }
}

impl fmt::Display for MessageTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.guild_id, self.channel_id, self.message_id)
    }
}

/// How client scores are sorted and displayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ScoreKind {
    #[default]
    Points,
    Time,
}

impl ScoreKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScoreKind::Points => "points",
            ScoreKind::Time => "time",
        }
    }

    /// Anything other than `"time"` is treated as points.
    pub fn parse(s: &str) -> Self {
        if s.eq_ignore_ascii_case("time") {
            ScoreKind::Time
        } else {
            ScoreKind::Points
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MapInfo {
    pub name: String,
    pub sha256: Option<String>,
    pub size: Option<u64>,
}

/// One connected client as reported by the master list.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ClientStatus {
    pub name: String,
    pub clan: String,
    /// ISO 3166-1 numeric country code, `-1` when unset.
    pub country: i32,
    pub score: i32,
    pub is_player: bool,
    pub team: i32,
}

impl ClientStatus {
    /// Whether the score carries a finish time (only meaningful for [`ScoreKind::Time`]).
    pub fn has_time(&self) -> bool {
        self.score != NO_TIME && self.score >= 0
    }
}

/// Everything the status message shows about one server.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ServerStatus {
    pub address: String,
    pub protocols: Vec<String>,
    pub name: String,
    pub game_type: String,
    pub passworded: bool,
    pub map: MapInfo,
    pub version: String,
    pub max_clients: u32,
    pub max_players: u32,
    pub score_kind: ScoreKind,
    pub clients: Vec<ClientStatus>,
}

impl ServerStatus {
    /// Sort protocols and clients into their canonical order so that two
    /// statuses built from differently ordered input compare equal.
    pub fn canonicalize(&mut self) {
        self.protocols.sort();
        self.protocols.dedup();
        let kind = self.score_kind;
        self.clients.sort_by(|a, b| compare_clients(kind, a, b));
    }

    pub fn canonical(mut self) -> Self {
        self.canonicalize();
        self
    }

    pub fn player_count(&self) -> usize {
        self.clients.len()
    }
}

/// Time: finished clients first, fastest first. Points: highest first.
/// Remaining fields break ties so the order is total.
fn compare_clients(kind: ScoreKind, a: &ClientStatus, b: &ClientStatus) -> Ordering {
    let by_score = match kind {
        ScoreKind::Points => b.score.cmp(&a.score),
        ScoreKind::Time => match (a.has_time(), b.has_time()) {
            (true, true) => a.score.cmp(&b.score),
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            (false, false) => Ordering::Equal,
        },
    };
    by_score
        .then_with(|| a.name.cmp(&b.name))
        .then_with(|| a.clan.cmp(&b.clan))
        .then_with(|| a.score.cmp(&b.score))
        .then_with(|| a.country.cmp(&b.country))
        .then_with(|| b.is_player.cmp(&a.is_player))
        .then_with(|| a.team.cmp(&b.team))
}

/// Server status per message target. Entries are canonicalized on insert.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    entries: BTreeMap<MessageTarget, ServerStatus>,
}

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, target: MessageTarget, status: ServerStatus) -> Option<ServerStatus> {
        self.entries.insert(target, status.canonical())
    }

    pub fn get(&self, target: &MessageTarget) -> Option<&ServerStatus> {
        self.entries.get(target)
    }

    pub fn contains(&self, target: &MessageTarget) -> bool {
        self.entries.contains_key(target)
    }

    pub fn remove(&mut self, target: &MessageTarget) -> Option<ServerStatus> {
        self.entries.remove(target)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, MessageTarget, ServerStatus> {
        self.entries.iter()
    }

    pub fn targets(&self) -> impl Iterator<Item = &MessageTarget> {
        self.entries.keys()
    }
}

impl FromIterator<(MessageTarget, ServerStatus)> for Snapshot {
    fn from_iter<I: IntoIterator<Item = (MessageTarget, ServerStatus)>>(iter: I) -> Self {
        let mut snapshot = Snapshot::new();
        for (target, status) in iter {
            snapshot.insert(target, status);
        }
        snapshot
    }
}

impl IntoIterator for Snapshot {
    type Item = (MessageTarget, ServerStatus);
    type IntoIter = btree_map::IntoIter<MessageTarget, ServerStatus>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<'a> IntoIterator for &'a Snapshot {
    type Item = (&'a MessageTarget, &'a ServerStatus);
    type IntoIter = btree_map::Iter<'a, MessageTarget, ServerStatus>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// A player-count threshold in `1..=10`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Threshold(u8);

impl Threshold {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 10;

    pub fn new(value: u8) -> Option<Self> {
        (Self::MIN..=Self::MAX).contains(&value).then_some(Self(value))
    }

    pub fn get(self) -> u8 {
        self.0
    }

    pub fn fires(self, player_count: usize) -> bool {
        player_count >= usize::from(self.0)
    }

    pub fn all() -> impl Iterator<Item = Threshold> {
        (Self::MIN..=Self::MAX).map(Threshold)
    }
}

/// A user's request to be mentioned once a server reaches a player count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Subscription {
    pub target: MessageTarget,
    pub user_id: u64,
    pub threshold: Threshold,
}

/// A status message and the server address it mirrors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tracking {
    pub target: MessageTarget,
    pub address: String,
}

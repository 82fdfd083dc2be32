use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::error::ConfigError;

/// Top-level bot configuration, loaded from serverwatch.toml.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct BotConfig {
    pub discord: DiscordSection,
    pub database: DatabaseSection,
    pub poll: PollSection,
    pub chat: ChatSection,
    /// Servers that must have a status message in a channel.
    pub watch: Vec<WatchEntry>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct DiscordSection {
    pub token: String,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DatabaseSection {
    pub url: String,
}

impl Default for DatabaseSection {
    fn default() -> Self {
        Self {
            url: "sqlite:serverwatch.db?mode=rwc".into(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct PollSection {
    /// Master list JSON endpoint.
    pub url: String,
    pub interval_secs: u64,
    pub timeout_secs: u64,
}

impl Default for PollSection {
    fn default() -> Self {
        Self {
            url: "https://master1.ddnet.org/ddnet/15/servers.json".into(),
            interval_secs: 10,
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ChatSection {
    /// Upper bound for a single chat platform call.
    pub timeout_secs: u64,
}

impl Default for ChatSection {
    fn default() -> Self {
        Self { timeout_secs: 10 }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct WatchEntry {
    pub guild_id: u64,
    pub channel_id: u64,
    pub address: String,
}

impl BotConfig {
    /// Load config from a TOML file. Falls back to defaults if the file doesn't exist.
    /// Environment variables override TOML values.
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let mut config = Self::from_file(path)?;
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self, ConfigError> {
        if !Path::new(path).exists() {
            info!("No config file found at {}, using defaults", path);
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_string(),
            source,
        })?;
        Self::parse(path, &contents)
    }

    fn parse(path: &str, contents: &str) -> Result<Self, ConfigError> {
        toml::from_str(contents).map_err(|source| ConfigError::Parse {
            path: path.to_string(),
            source,
        })
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(v) = var("DISCORD_TOKEN") {
            self.discord.token = v;
        }
        if let Some(v) = var("DATABASE_URL") {
            self.database.url = v;
        }
        if let Some(v) = var("POLL_URL") {
            self.poll.url = v;
        }
        if let Some(v) = var("POLL_INTERVAL_SECS")
            && let Ok(secs) = v.parse()
        {
            self.poll.interval_secs = secs;
        }
        if let Some(v) = var("POLL_TIMEOUT_SECS")
            && let Ok(secs) = v.parse()
        {
            self.poll.timeout_secs = secs;
        }
        if let Some(v) = var("CHAT_TIMEOUT_SECS")
            && let Ok(secs) = v.parse()
        {
            self.chat.timeout_secs = secs;
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll.interval_secs.max(1))
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_secs(self.poll.timeout_secs.max(1))
    }

    pub fn chat_timeout(&self) -> Duration {
        Duration::from_secs(self.chat.timeout_secs.max(1))
    }
}

use thiserror::Error;

/// Errors raised by the relational store.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The addressed row does not exist. Callers usually treat this as a no-op.
    #[error("{what} not found")]
    NotFound { what: String },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A stored value could not be turned back into its domain type.
    #[error("corrupt row: {0}")]
    Corrupt(String),
}

impl StoreError {
    pub fn not_found(what: impl Into<String>) -> Self {
        StoreError::NotFound { what: what.into() }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}

/// Errors returned by a chat platform call.
#[derive(Error, Debug)]
pub enum ChatError {
    /// The message or channel is gone on the platform side.
    #[error("chat resource not found")]
    NotFound,

    #[error("chat call timed out")]
    Timeout,

    #[error("chat platform error: {0}")]
    Platform(String),
}

/// Errors raised while fetching the server list.
#[derive(Error, Debug)]
pub enum PollError {
    #[error("server list request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("server list responded with status {0}")]
    Status(u16),
}

/// Reasons a poll cycle was aborted before its snapshot replace.
#[derive(Error, Debug)]
pub enum CycleError {
    #[error(transparent)]
    Poll(#[from] PollError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Errors raised while creating or removing a tracking.
#[derive(Error, Debug)]
pub enum TrackingError {
    #[error("invalid server address '{0}'")]
    InvalidAddress(String),

    #[error(transparent)]
    Chat(#[from] ChatError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file '{path}': {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}

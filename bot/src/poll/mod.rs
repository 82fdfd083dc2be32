pub mod dto;

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::error::PollError;

use self::dto::{ServerDto, ServerList};

/// Anything that can produce the current list of known servers.
#[async_trait]
pub trait ServerSource: Send + Sync {
    async fn fetch(&self) -> Result<Vec<ServerDto>, PollError>;
}

/// Fetches the master list JSON over HTTP.
pub struct HttpServerSource {
    client: reqwest::Client,
    url: String,
}

impl HttpServerSource {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, PollError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("serverwatch/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl ServerSource for HttpServerSource {
    async fn fetch(&self) -> Result<Vec<ServerDto>, PollError> {
        let response = self.client.get(&self.url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(PollError::Status(status.as_u16()));
        }
        let list: ServerList = response.json().await?;
        debug!(count = list.servers.len(), url = %self.url, "fetched server list");
        Ok(list.servers)
    }
}

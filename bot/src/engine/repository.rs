use async_trait::async_trait;

use crate::error::StoreError;

use super::model::{MessageTarget, Snapshot};

/// Storage for the last announced snapshot.
#[async_trait]
pub trait SnapshotRepository: Send + Sync {
    /// The full previously announced snapshot, clients included.
    async fn load(&self) -> Result<Snapshot, StoreError>;

    /// Delete every row of `message_ids`, then insert `entries`, atomically.
    /// On error nothing is changed.
    async fn replace(
        &self,
        message_ids: &[MessageTarget],
        entries: &Snapshot,
    ) -> Result<(), StoreError>;
}

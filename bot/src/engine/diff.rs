use std::collections::BTreeSet;

use tracing::debug;

use crate::error::StoreError;

use super::model::{MessageTarget, ServerStatus, Snapshot};
use super::repository::SnapshotRepository;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    /// Tracked server seen for the first time.
    New,
    /// Tracked server whose status differs from the announced one.
    Changed,
    /// Announced server that is no longer in the list.
    Offline,
}

/// One message that must be rewritten.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change {
    pub target: MessageTarget,
    pub prev: Option<ServerStatus>,
    pub curr: Option<ServerStatus>,
    /// Users to mention, ascending. Filled in by notification targeting.
    pub mentions: Vec<u64>,
}

impl Change {
    pub fn kind(&self) -> ChangeKind {
        match (&self.prev, &self.curr) {
            (_, None) => ChangeKind::Offline,
            (None, Some(_)) => ChangeKind::New,
            (Some(_), Some(_)) => ChangeKind::Changed,
        }
    }

    pub fn is_offline(&self) -> bool {
        self.curr.is_none()
    }
}

/// Result of comparing the announced snapshot with the polled one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diff {
    /// Ordered by target.
    pub changes: Vec<Change>,
    /// Distinct addresses of new and changed servers, sorted.
    pub changed_addresses: Vec<String>,
}

/// Classify every target of `previous` and `current`. Unchanged targets
/// produce nothing.
pub fn compute(previous: &Snapshot, current: &Snapshot) -> Diff {
    let mut changes = Vec::new();
    let mut addresses = BTreeSet::new();

    for (target, prev) in previous {
        if !current.contains(target) {
            changes.push(Change {
                target: *target,
                prev: Some(prev.clone()),
                curr: None,
                mentions: Vec::new(),
            });
        }
    }

    for (target, curr) in current {
        let prev = match previous.get(target) {
            Some(prev) if prev == curr => continue,
            prev => prev.cloned(),
        };
        addresses.insert(curr.address.clone());
        changes.push(Change {
            target: *target,
            prev,
            curr: Some(curr.clone()),
            mentions: Vec::new(),
        });
    }

    changes.sort_by_key(|change| change.target);
    Diff {
        changes,
        changed_addresses: addresses.into_iter().collect(),
    }
}

impl Diff {
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn count(&self, kind: ChangeKind) -> usize {
        self.changes.iter().filter(|c| c.kind() == kind).count()
    }

    pub fn targets(&self) -> Vec<MessageTarget> {
        self.changes.iter().map(|c| c.target).collect()
    }

    /// Rows to delete and entries to insert so that storage matches the
    /// polled state for every target of this diff.
    pub fn replacement(&self) -> (Vec<MessageTarget>, Snapshot) {
        let entries = self
            .changes
            .iter()
            .filter_map(|c| c.curr.clone().map(|curr| (c.target, curr)))
            .collect();
        (self.targets(), entries)
    }

    /// Persist this diff. An empty diff writes nothing and returns `false`.
    pub async fn commit(&self, repository: &dyn SnapshotRepository) -> Result<bool, StoreError> {
        if self.is_empty() {
            return Ok(false);
        }
        let (message_ids, entries) = self.replacement();
        repository.replace(&message_ids, &entries).await?;
        debug!(
            deleted = message_ids.len(),
            inserted = entries.len(),
            "replaced announced snapshot"
        );
        Ok(true)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::engine::model::ClientStatus;

    /// In-memory repository that counts write calls.
    #[derive(Default)]
    pub(crate) struct MemorySnapshots {
        pub(crate) snapshot: Mutex<Snapshot>,
        pub(crate) writes: AtomicUsize,
    }

    #[async_trait]
    impl SnapshotRepository for MemorySnapshots {
        async fn load(&self) -> Result<Snapshot, StoreError> {
            Ok(self.snapshot.lock().unwrap().clone())
        }

        async fn replace(
            &self,
            message_ids: &[MessageTarget],
            entries: &Snapshot,
        ) -> Result<(), StoreError> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            let mut snapshot = self.snapshot.lock().unwrap();
            for target in message_ids {
                snapshot.remove(target);
            }
            for (target, status) in entries {
                snapshot.insert(*target, status.clone());
            }
            Ok(())
        }
    }

    pub(crate) fn server(address: &str, players: usize) -> ServerStatus {
        ServerStatus {
            address: address.into(),
            name: format!("server {address}"),
            max_clients: 16,
            max_players: 16,
            clients: (0..players)
                .map(|i| ClientStatus {
                    name: format!("player{i}"),
                    score: i as i32,
                    country: -1,
                    is_player: true,
                    ..Default::default()
                })
                .collect(),
            ..Default::default()
        }
    }

    fn snapshot(entries: &[(MessageTarget, ServerStatus)]) -> Snapshot {
        entries.iter().cloned().collect()
    }

    const T1: MessageTarget = MessageTarget {
        guild_id: 1,
        channel_id: 10,
        message_id: 100,
    };
    const T2: MessageTarget = MessageTarget {
        guild_id: 1,
        channel_id: 10,
        message_id: 200,
    };
    const T3: MessageTarget = MessageTarget {
        guild_id: 2,
        channel_id: 20,
        message_id: 300,
    };

    #[test]
    fn test_changed_when_client_joins() {
        let prev = snapshot(&[(T1, server("1.1.1.1:8303", 2))]);
        let curr = snapshot(&[(T1, server("1.1.1.1:8303", 3))]);
        let diff = compute(&prev, &curr);
        assert_eq!(diff.changes.len(), 1);
        assert_eq!(diff.changes[0].kind(), ChangeKind::Changed);
        assert_eq!(diff.changes[0].prev.as_ref().unwrap().player_count(), 2);
        assert_eq!(diff.changes[0].curr.as_ref().unwrap().player_count(), 3);
        assert_eq!(diff.changed_addresses, ["1.1.1.1:8303"]);
    }

    #[test]
    fn test_offline_when_target_disappears() {
        let prev = snapshot(&[(T1, server("1.1.1.1:8303", 2))]);
        let diff = compute(&prev, &Snapshot::new());
        assert_eq!(diff.changes.len(), 1);
        assert!(diff.changes[0].is_offline());
        assert!(diff.changes[0].prev.is_some());
        assert!(diff.changed_addresses.is_empty());
    }

    #[test]
    fn test_new_offline_and_unchanged_are_classified_once() {
        let prev = snapshot(&[
            (T1, server("1.1.1.1:8303", 1)),
            (T2, server("2.2.2.2:8303", 1)),
        ]);
        let curr = snapshot(&[
            (T2, server("2.2.2.2:8303", 1)),
            (T3, server("3.3.3.3:8303", 4)),
        ]);
        let diff = compute(&prev, &curr);
        assert_eq!(diff.count(ChangeKind::Offline), 1);
        assert_eq!(diff.count(ChangeKind::New), 1);
        assert_eq!(diff.count(ChangeKind::Changed), 0);
        assert_eq!(diff.targets(), [T1, T3]);
        assert_eq!(diff.changed_addresses, ["3.3.3.3:8303"]);
    }

    #[test]
    fn test_changed_addresses_are_deduplicated_and_sorted() {
        let curr = snapshot(&[
            (T1, server("9.9.9.9:8303", 1)),
            (T2, server("1.1.1.1:8303", 1)),
            (T3, server("9.9.9.9:8303", 1)),
        ]);
        let diff = compute(&Snapshot::new(), &curr);
        assert_eq!(diff.changed_addresses, ["1.1.1.1:8303", "9.9.9.9:8303"]);
    }

    #[test]
    fn test_reordered_clients_are_unchanged() {
        let mut reordered = server("1.1.1.1:8303", 3);
        reordered.clients.reverse();
        let prev = snapshot(&[(T1, server("1.1.1.1:8303", 3))]);
        let curr = snapshot(&[(T1, reordered)]);
        assert!(compute(&prev, &curr).is_empty());
    }

    #[test]
    fn test_replacement_drops_offline_and_keeps_current() {
        let prev = snapshot(&[(T1, server("1.1.1.1:8303", 1))]);
        let curr = snapshot(&[(T2, server("2.2.2.2:8303", 1))]);
        let (deleted, inserted) = compute(&prev, &curr).replacement();
        assert_eq!(deleted, [T1, T2]);
        assert_eq!(inserted.len(), 1);
        assert!(inserted.contains(&T2));
    }

    #[tokio::test]
    async fn test_second_identical_run_writes_nothing() {
        let repository = MemorySnapshots::default();
        let curr = snapshot(&[(T1, server("1.1.1.1:8303", 2))]);

        let prev = repository.load().await.unwrap();
        let first = compute(&prev, &curr);
        assert_eq!(first.count(ChangeKind::New), 1);
        assert!(first.commit(&repository).await.unwrap());
        assert_eq!(repository.writes.load(Ordering::SeqCst), 1);

        let prev = repository.load().await.unwrap();
        assert_eq!(prev, curr);
        let second = compute(&prev, &curr);
        assert!(second.is_empty());
        assert!(!second.commit(&repository).await.unwrap());
        assert_eq!(repository.writes.load(Ordering::SeqCst), 1);
    }
}

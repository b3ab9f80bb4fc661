//! StatusStore — redb-backed history of node statuses.
//!
//! Each `update_node` upserts the node record and appends the tick's probe
//! rows in a single write transaction. Reads serve the most recent probe
//! rows newest first; a background sweeper evicts rows older than the
//! retention window. The store supports both on-disk and in-memory
//! backends (the latter for testing).

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use redb::{Database, ReadableDatabase, ReadableTable};
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::error::{StateError, StateResult};
use crate::tables::{probe_key, probe_key_captured_at, NODES, PROBES};
use crate::types::{NodeRecord, NodeStatus, Probe, ProbeRow, SystemStatus};

/// How many probe rows a recent-status read returns.
const RECENT_PROBE_LIMIT: usize = 5;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

/// Thread-safe status store backed by redb.
#[derive(Clone)]
pub struct StatusStore {
    db: Arc<Database>,
}

impl StatusStore {
    /// Open (or create) a persistent status store at the given path.
    ///
    /// The backing file is held for the lifetime of the last clone.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "status store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory status store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory status store opened");
        Ok(store)
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(NODES).map_err(map_err!(Table))?;
        txn.open_table(PROBES).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// Upsert the node record and append all of its probe rows atomically.
    pub fn update_node(&self, status: &NodeStatus) -> StateResult<()> {
        let record = NodeRecord {
            name: status.name.clone(),
            status: status.member.status.into(),
        };
        let record_value = serde_json::to_vec(&record).map_err(map_err!(Serialize))?;

        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut nodes = txn.open_table(NODES).map_err(map_err!(Table))?;
            nodes
                .insert(record.name.as_str(), record_value.as_slice())
                .map_err(map_err!(Write))?;

            let mut probes = txn.open_table(PROBES).map_err(map_err!(Table))?;
            for (seq, probe) in status.probes.iter().enumerate() {
                let key = probe_key(&status.name, probe.captured_at, seq);
                let row = ProbeRow::from(probe);
                let value = serde_json::to_vec(&row).map_err(map_err!(Serialize))?;
                probes
                    .insert(key.as_str(), value.as_slice())
                    .map_err(map_err!(Write))?;
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(node = %status.name, probes = status.probes.len(), "node status stored");
        Ok(())
    }

    /// Mirror a full system view by upserting every node it carries.
    pub fn update_system(&self, status: &SystemStatus) -> StateResult<()> {
        for node in &status.nodes {
            self.update_node(node)?;
        }
        Ok(())
    }

    /// The last few probe rows for a node, newest first.
    pub fn recent_probes(&self, node: &str) -> StateResult<Vec<Probe>> {
        let prefix = format!("{node}/");
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(PROBES).map_err(map_err!(Table))?;
        let mut rows = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (key, value) = entry.map_err(map_err!(Read))?;
            if key.value().starts_with(&prefix) {
                let row: ProbeRow =
                    serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
                rows.push(row);
            }
        }
        // Keys sort oldest first; serve the tail newest first.
        let mut probes: Vec<Probe> = rows.into_iter().map(Probe::from).collect();
        probes.reverse();
        probes.truncate(RECENT_PROBE_LIMIT);
        Ok(probes)
    }

    /// The persisted record for a node, if any.
    pub fn node_record(&self, name: &str) -> StateResult<Option<NodeRecord>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(NODES).map_err(map_err!(Table))?;
        match table.get(name).map_err(map_err!(Read))? {
            Some(guard) => {
                let record: NodeRecord =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    /// Delete probe rows captured before `limit` in a single transaction.
    ///
    /// Returns the number of rows deleted.
    pub fn delete_older_than(&self, limit: u64) -> StateResult<u64> {
        // Collect keys in a read transaction first.
        let keys: Vec<String> = {
            let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
            let table = txn.open_table(PROBES).map_err(map_err!(Table))?;
            table
                .iter()
                .map_err(map_err!(Read))?
                .filter_map(|entry| {
                    let (key, _) = entry.ok()?;
                    let key = key.value().to_string();
                    (probe_key_captured_at(&key)? < limit).then_some(key)
                })
                .collect()
        };
        // Delete in a write transaction.
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let count = keys.len() as u64;
        {
            let mut table = txn.open_table(PROBES).map_err(map_err!(Table))?;
            for key in &keys {
                table.remove(key.as_str()).map_err(map_err!(Write))?;
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(count)
    }

    /// Periodic retention sweep, running until `shutdown` flips.
    ///
    /// A failed sweep is logged and retried on the next tick.
    pub async fn run_eviction(self, retention: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(retention);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let limit = epoch_secs().saturating_sub(retention.as_secs());
                    match self.delete_older_than(limit) {
                        Ok(deleted) if deleted > 0 => {
                            debug!(deleted, "expired probe rows evicted");
                        }
                        Ok(_) => {}
                        Err(e) => warn!(error = %e, "probe eviction failed"),
                    }
                }
                _ = shutdown.changed() => break,
            }
        }
    }
}

/// Current Unix time in seconds.
pub fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{
        MemberState, MemberStatus, NodeRecordStatus, NodeState, ProbeStatus,
    };

    fn test_member(name: &str, state: MemberState) -> MemberStatus {
        MemberStatus {
            name: name.to_string(),
            addr: "10.0.0.1".to_string(),
            status: state,
            tags: Default::default(),
        }
    }

    fn test_probe(checker: &str, status: ProbeStatus, captured_at: u64) -> Probe {
        Probe {
            checker: checker.to_string(),
            status,
            error: match status {
                ProbeStatus::Failed => "probe failed".to_string(),
                _ => String::new(),
            },
            detail: String::new(),
            extra: String::new(),
            captured_at,
        }
    }

    fn test_status(name: &str, probes: Vec<Probe>) -> NodeStatus {
        let captured_at = probes.first().map(|p| p.captured_at).unwrap_or_default();
        NodeStatus {
            name: name.to_string(),
            status: NodeState::Running,
            member: test_member(name, MemberState::Alive),
            probes,
            captured_at,
        }
    }

    #[test]
    fn update_and_read_back_round_trip() {
        let store = StatusStore::open_in_memory().unwrap();
        let probe = Probe {
            checker: "etcd".to_string(),
            status: ProbeStatus::Failed,
            error: "connection refused".to_string(),
            detail: String::new(),
            extra: "endpoint=127.0.0.1:2379".to_string(),
            captured_at: 1000,
        };
        store.update_node(&test_status("node-1", vec![probe.clone()])).unwrap();

        let probes = store.recent_probes("node-1").unwrap();
        assert_eq!(probes.len(), 1);
        assert_eq!(probes[0].checker, probe.checker);
        assert_eq!(probes[0].status, probe.status);
        assert_eq!(probes[0].error, probe.error);
        assert_eq!(probes[0].extra, probe.extra);
        assert_eq!(probes[0].captured_at, probe.captured_at);
    }

    #[test]
    fn recent_probes_newest_first_limit_five() {
        let store = StatusStore::open_in_memory().unwrap();
        for tick in 0..8u64 {
            let probe = test_probe("svc", ProbeStatus::Running, 1000 + tick);
            store.update_node(&test_status("node-1", vec![probe])).unwrap();
        }

        let probes = store.recent_probes("node-1").unwrap();
        assert_eq!(probes.len(), 5);
        let stamps: Vec<u64> = probes.iter().map(|p| p.captured_at).collect();
        assert_eq!(stamps, vec![1007, 1006, 1005, 1004, 1003]);
    }

    #[test]
    fn recent_probes_does_not_cross_nodes() {
        let store = StatusStore::open_in_memory().unwrap();
        store
            .update_node(&test_status("node-1", vec![test_probe("a", ProbeStatus::Running, 1000)]))
            .unwrap();
        store
            .update_node(&test_status("node-2", vec![test_probe("b", ProbeStatus::Running, 1001)]))
            .unwrap();

        let probes = store.recent_probes("node-1").unwrap();
        assert_eq!(probes.len(), 1);
        assert_eq!(probes[0].checker, "a");
    }

    #[test]
    fn same_tick_rewrite_is_idempotent() {
        let store = StatusStore::open_in_memory().unwrap();
        let status = test_status("node-1", vec![test_probe("svc", ProbeStatus::Running, 1000)]);

        store.update_node(&status).unwrap();
        store.update_node(&status).unwrap();

        assert_eq!(store.recent_probes("node-1").unwrap().len(), 1);
    }

    #[test]
    fn eviction_clears_expired_rows() {
        let store = StatusStore::open_in_memory().unwrap();
        let probes: Vec<Probe> = (0..10)
            .map(|_| test_probe("svc", ProbeStatus::Running, 1000))
            .collect();
        store.update_node(&test_status("node-1", probes)).unwrap();
        assert_eq!(store.recent_probes("node-1").unwrap().len(), 5);

        // A limit past the rows' capture time sweeps them all.
        let deleted = store.delete_older_than(1001).unwrap();
        assert_eq!(deleted, 10);
        assert!(store.recent_probes("node-1").unwrap().is_empty());
    }

    #[test]
    fn eviction_keeps_rows_inside_the_window() {
        let store = StatusStore::open_in_memory().unwrap();
        store
            .update_node(&test_status("node-1", vec![test_probe("old", ProbeStatus::Running, 500)]))
            .unwrap();
        store
            .update_node(&test_status("node-1", vec![test_probe("new", ProbeStatus::Running, 2000)]))
            .unwrap();

        let deleted = store.delete_older_than(1000).unwrap();
        assert_eq!(deleted, 1);

        let probes = store.recent_probes("node-1").unwrap();
        assert_eq!(probes.len(), 1);
        assert_eq!(probes[0].checker, "new");
    }

    #[test]
    fn node_record_tracks_member_state() {
        let store = StatusStore::open_in_memory().unwrap();

        let mut status = test_status("node-1", vec![]);
        status.member.status = MemberState::Failed;
        store.update_node(&status).unwrap();
        let record = store.node_record("node-1").unwrap().unwrap();
        assert_eq!(record.status, NodeRecordStatus::Failed);

        // Recovery: failed nodes may come back as active.
        status.member.status = MemberState::Alive;
        store.update_node(&status).unwrap();
        let record = store.node_record("node-1").unwrap().unwrap();
        assert_eq!(record.status, NodeRecordStatus::Active);
    }

    #[test]
    fn update_system_mirrors_every_node() {
        let store = StatusStore::open_in_memory().unwrap();
        let system = SystemStatus {
            status: crate::types::SystemState::Running,
            nodes: vec![
                test_status("node-1", vec![test_probe("a", ProbeStatus::Running, 1000)]),
                test_status("node-2", vec![test_probe("b", ProbeStatus::Running, 1000)]),
            ],
            summary: String::new(),
            timestamp: 1000,
        };

        store.update_system(&system).unwrap();

        assert_eq!(store.recent_probes("node-1").unwrap().len(), 1);
        assert_eq!(store.recent_probes("node-2").unwrap().len(), 1);
    }

    #[test]
    fn empty_store_operations() {
        let store = StatusStore::open_in_memory().unwrap();
        assert!(store.recent_probes("nope").unwrap().is_empty());
        assert!(store.node_record("nope").unwrap().is_none());
        assert_eq!(store.delete_older_than(u64::MAX).unwrap(), 0);
    }

    #[test]
    fn persistence_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("status.redb");

        {
            let store = StatusStore::open(&db_path).unwrap();
            store
                .update_node(&test_status("node-1", vec![test_probe("svc", ProbeStatus::Running, 1000)]))
                .unwrap();
        }

        // Reopen the same database file.
        let store = StatusStore::open(&db_path).unwrap();
        let probes = store.recent_probes("node-1").unwrap();
        assert_eq!(probes.len(), 1);
        assert_eq!(probes[0].checker, "svc");
    }

    #[tokio::test(start_paused = true)]
    async fn eviction_task_sweeps_on_cadence() {
        let store = StatusStore::open_in_memory().unwrap();
        store
            .update_node(&test_status("node-1", vec![test_probe("svc", ProbeStatus::Running, 1)]))
            .unwrap();

        let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
        let task = tokio::spawn(
            store
                .clone()
                .run_eviction(Duration::from_secs(60), shutdown_rx),
        );

        // The first interval tick fires immediately; rows captured at t=1
        // are far outside a 60s window by now.
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
        assert!(store.recent_probes("node-1").unwrap().is_empty());

        shutdown_tx.send(true).unwrap();
        task.await.unwrap();
    }
}

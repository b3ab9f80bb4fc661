//! StatusCache — in-memory latest cluster view, replicated to the store.
//!
//! The cache is the read path for the RPC handlers: reads are deep copies
//! taken under a reader lock, so no caller ever observes a half-applied
//! update. Every write is mirrored into the `StatusStore` for history;
//! a failed mirror is reported to the caller while the in-memory view
//! stays updated, keeping the cache authoritative for the current tick.

use tokio::sync::RwLock;

use crate::error::StateResult;
use crate::store::StatusStore;
use crate::types::{NodeStatus, SystemStatus};

/// Latest known `SystemStatus`, updated transactionally per tick.
pub struct StatusCache {
    store: StatusStore,
    system: RwLock<SystemStatus>,
}

impl StatusCache {
    /// Create a cache seeded with an `Unknown` system view.
    pub fn new(store: StatusStore) -> Self {
        Self {
            store,
            system: RwLock::new(SystemStatus::default()),
        }
    }

    /// Replace the system view and mirror it to the store.
    pub async fn update(&self, status: SystemStatus) -> StateResult<()> {
        {
            let mut system = self.system.write().await;
            *system = status.clone();
        }
        self.store.update_system(&status)
    }

    /// Update or append the node's slot and mirror it to the store.
    ///
    /// The cache keeps exactly one slot per node name: the first sight of
    /// a node appends, later updates replace in place, preserving
    /// insertion order.
    pub async fn update_node(&self, status: NodeStatus) -> StateResult<()> {
        {
            let mut system = self.system.write().await;
            match system.nodes.iter_mut().find(|n| n.name == status.name) {
                Some(slot) => *slot = status.clone(),
                None => system.nodes.push(status.clone()),
            }
        }
        self.store.update_node(&status)
    }

    /// Deep copy of the latest system view.
    pub async fn recent_status(&self) -> SystemStatus {
        self.system.read().await.clone()
    }

    /// Deep copy of the last known status for one node.
    pub async fn recent_node_status(&self, name: &str) -> Option<NodeStatus> {
        self.system
            .read()
            .await
            .nodes
            .iter()
            .find(|n| n.name == name)
            .cloned()
    }
}

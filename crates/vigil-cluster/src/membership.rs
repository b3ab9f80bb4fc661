//! Cluster membership surface.
//!
//! The gossip transport is an external collaborator: any driver exposing
//! the `Membership` contract plugs in. Snapshots are the source of truth;
//! the event stream only keeps the member cache warm between them, so
//! dropped events are tolerated and the stream may be restarted at will.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, watch, Mutex, RwLock};
use tracing::{debug, info, warn};

use vigil_state::{MemberState, MemberStatus};

use crate::error::ClusterResult;

/// How long to wait before re-requesting a lost event stream.
const EVENT_RETRY_INTERVAL: Duration = Duration::from_secs(5);

/// Notification about one member's lifecycle.
#[derive(Debug, Clone, PartialEq)]
pub enum MembershipEvent {
    Joined(MemberStatus),
    Updated(MemberStatus),
    Left(MemberStatus),
    Failed(MemberStatus),
}

/// Contract a membership driver fulfills.
#[async_trait]
pub trait Membership: Send + Sync {
    /// Point-in-time snapshot of all known members.
    async fn members(&self) -> ClusterResult<Vec<MemberStatus>>;

    /// Subscribe to membership notifications.
    ///
    /// The returned stream may end on transport loss and can be
    /// re-requested; consumers must not rely on seeing every event.
    async fn events(&self) -> ClusterResult<mpsc::Receiver<MembershipEvent>>;

    /// Join the cluster through the given peers. Idempotent.
    async fn join(&self, peers: &[String], replay: bool) -> ClusterResult<()>;

    /// Announce a graceful departure. Best-effort and bounded.
    async fn leave(&self) -> ClusterResult<()>;

    /// Release driver resources.
    async fn close(&self) -> ClusterResult<()>;
}

/// Local view of the member list.
///
/// Owned by the membership task; the tick task reads snapshot copies.
#[derive(Default)]
pub struct MemberCache {
    members: RwLock<Vec<MemberStatus>>,
}

impl MemberCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the current member list.
    pub async fn snapshot(&self) -> Vec<MemberStatus> {
        self.members.read().await.clone()
    }

    /// Replace the whole list from a fresh driver snapshot.
    pub async fn replace(&self, members: Vec<MemberStatus>) {
        *self.members.write().await = members;
    }

    /// Fold one event into the list.
    pub async fn apply(&self, event: MembershipEvent) {
        let mut members = self.members.write().await;
        match event {
            MembershipEvent::Joined(member) | MembershipEvent::Updated(member) => {
                match members.iter_mut().find(|m| m.name == member.name) {
                    Some(slot) => *slot = member,
                    None => members.push(member),
                }
            }
            MembershipEvent::Left(member) => {
                set_status(&mut members, &member.name, MemberState::Left)
            }
            MembershipEvent::Failed(member) => {
                set_status(&mut members, &member.name, MemberState::Failed)
            }
        }
    }
}

fn set_status(members: &mut [MemberStatus], name: &str, status: MemberState) {
    if let Some(member) = members.iter_mut().find(|m| m.name == name) {
        member.status = status;
    }
}

/// Keep `cache` in sync with `membership` until `shutdown` flips.
///
/// Re-seeds from a full snapshot whenever the event stream is (re)opened;
/// driver errors leave the previous snapshot in place.
pub async fn run_membership(
    membership: Arc<dyn Membership>,
    cache: Arc<MemberCache>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        match membership.members().await {
            Ok(members) => cache.replace(members).await,
            Err(e) => warn!(error = %e, "membership snapshot failed, reusing previous members"),
        }

        let mut events = match membership.events().await {
            Ok(events) => events,
            Err(e) => {
                warn!(error = %e, "membership event stream unavailable");
                tokio::select! {
                    _ = tokio::time::sleep(EVENT_RETRY_INTERVAL) => continue,
                    _ = shutdown.changed() => return,
                }
            }
        };

        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(event) => {
                        debug!(?event, "membership event");
                        cache.apply(event).await;
                    }
                    None => {
                        info!("membership event stream ended, restarting");
                        break;
                    }
                },
                _ = shutdown.changed() => return,
            }
        }

        tokio::select! {
            _ = tokio::time::sleep(EVENT_RETRY_INTERVAL) => {}
            _ = shutdown.changed() => return,
        }
    }
}

/// Membership driver over a fixed member list.
///
/// Stands in where no gossip sidecar is wired up and backs the agent
/// tests: the member list is set programmatically and events are
/// published by the embedder.
pub struct StaticMembership {
    local: String,
    members: RwLock<Vec<MemberStatus>>,
    event_txs: Mutex<Vec<mpsc::Sender<MembershipEvent>>>,
}

impl StaticMembership {
    pub fn new(local: impl Into<String>, members: Vec<MemberStatus>) -> Self {
        Self {
            local: local.into(),
            members: RwLock::new(members),
            event_txs: Mutex::new(Vec::new()),
        }
    }

    /// Replace the member list, visible to the next snapshot.
    pub async fn set_members(&self, members: Vec<MemberStatus>) {
        *self.members.write().await = members;
    }

    /// Publish an event to every open stream.
    pub async fn emit(&self, event: MembershipEvent) {
        let mut txs = self.event_txs.lock().await;
        txs.retain(|tx| !tx.is_closed());
        for tx in txs.iter() {
            let _ = tx.send(event.clone()).await;
        }
    }
}

#[async_trait]
impl Membership for StaticMembership {
    async fn members(&self) -> ClusterResult<Vec<MemberStatus>> {
        Ok(self.members.read().await.clone())
    }

    async fn events(&self) -> ClusterResult<mpsc::Receiver<MembershipEvent>> {
        let (tx, rx) = mpsc::channel(16);
        self.event_txs.lock().await.push(tx);
        Ok(rx)
    }

    async fn join(&self, peers: &[String], _replay: bool) -> ClusterResult<()> {
        info!(local = %self.local, peers = peers.len(), "static membership joined");
        Ok(())
    }

    async fn leave(&self) -> ClusterResult<()> {
        let mut members = self.members.write().await;
        set_status(&mut members, &self.local, MemberState::Leaving);
        info!(local = %self.local, "static membership leaving");
        Ok(())
    }

    async fn close(&self) -> ClusterResult<()> {
        self.event_txs.lock().await.clear();
        Ok(())
    }
}

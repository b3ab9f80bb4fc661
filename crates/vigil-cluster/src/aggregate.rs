//! Cluster verdict aggregation.
//!
//! Folds per-node statuses into a single `SystemStatus`. The fold degrades
//! monotonically: once degraded, later healthy observations never restore
//! the verdict, so reordering node inputs cannot flip the outcome.

use vigil_state::{MemberState, MemberStatus, NodeState, NodeStatus, SystemState, SystemStatus};

use crate::config::ROLE_TAG;

/// Summary attached to a verdict degraded by a missing master.
pub const SUMMARY_NO_MASTER: &str = "master node unavailable";

/// Whether the member carries the master role tag.
pub fn is_master(member: &MemberStatus) -> bool {
    member.tags.get(ROLE_TAG).is_some_and(|role| role == "master")
}

/// Combine per-node statuses into the status of the cluster as a whole.
///
/// At least one master must be present for a `Running` verdict; a failed
/// member forces `Degraded` regardless of probe outcomes; `Unknown`
/// dominates `Running` but is dominated by `Degraded`.
pub fn aggregate(nodes: Vec<NodeStatus>, timestamp: u64) -> SystemStatus {
    let mut status = SystemState::Running;
    let mut found_master = false;

    for node in &nodes {
        if !found_master && is_master(&node.member) {
            found_master = true;
        }
        if status == SystemState::Running {
            status = node_to_system_state(node.status);
        }
        if node.member.status == MemberState::Failed {
            status = SystemState::Degraded;
        }
    }

    let mut summary = String::new();
    if !found_master {
        status = SystemState::Degraded;
        summary = SUMMARY_NO_MASTER.to_string();
    }

    SystemStatus {
        status,
        nodes,
        summary,
        timestamp,
    }
}

fn node_to_system_state(status: NodeState) -> SystemState {
    match status {
        NodeState::Running => SystemState::Running,
        NodeState::Degraded => SystemState::Degraded,
        NodeState::Unknown => SystemState::Unknown,
    }
}

//! Domain types for the vigil status model.
//!
//! These types flow through the whole agent: the probe registry emits
//! `Probe` records, each tick finalizes them into a `NodeStatus`, and the
//! aggregator folds node statuses into the cluster-wide `SystemStatus`.
//! All types are serializable to/from JSON for storage in redb tables;
//! the persisted row forms at the bottom use compact one-letter status
//! encodings to keep rows small.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Stable identity of a node, matching its membership name.
pub type NodeName = String;

// ── Probes ─────────────────────────────────────────────────────────

/// Outcome of a single checker invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeStatus {
    #[default]
    Unknown,
    Running,
    Failed,
    Terminated,
}

/// One observation emitted by a single health checker in a single tick.
///
/// Probes are immutable once emitted; one run of a checker emits exactly
/// one probe record per observation.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Probe {
    /// Name of the checker that produced this probe. Non-empty and stable
    /// across runs.
    pub checker: String,
    pub status: ProbeStatus,
    /// Failure description; set whenever `status` is `Failed`.
    pub error: String,
    /// Human-readable context for the observation.
    pub detail: String,
    /// Checker-specific payload, not interpreted by the agent.
    pub extra: String,
    /// Unix timestamp (seconds), shared by all probes of one tick.
    pub captured_at: u64,
}

// ── Members ────────────────────────────────────────────────────────

/// Lifecycle state of a peer as reported by the membership driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemberState {
    #[default]
    None,
    Alive,
    Leaving,
    Left,
    Failed,
}

/// A peer known to the membership driver.
///
/// The driver owns member lifecycle; the agent holds short-lived
/// snapshot copies and treats them as read-only.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MemberStatus {
    pub name: NodeName,
    /// Advertised address of the peer.
    pub addr: String,
    pub status: MemberState,
    /// Free-form member tags; `tags["role"]` carries `master`/`node`.
    pub tags: HashMap<String, String>,
}

// ── Node status ────────────────────────────────────────────────────

/// Health verdict for a single node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeState {
    #[default]
    Unknown,
    Running,
    Degraded,
}

/// Health of one node for one tick, finalized atomically.
///
/// `status` is `Running` iff every probe in `probes` is `Running`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NodeStatus {
    /// Matches `member.name`.
    pub name: NodeName,
    pub status: NodeState,
    pub member: MemberStatus,
    pub probes: Vec<Probe>,
    pub captured_at: u64,
}

// ── System status ──────────────────────────────────────────────────

/// Cluster-wide health verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SystemState {
    #[default]
    Unknown,
    Running,
    Degraded,
}

/// Cluster verdict assembled from per-node statuses.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SystemStatus {
    pub status: SystemState,
    pub nodes: Vec<NodeStatus>,
    /// Human-readable explanation of a degraded verdict.
    pub summary: String,
    pub timestamp: u64,
}

// ── Persisted forms ────────────────────────────────────────────────

/// Compact liveness encoding for persisted node records.
///
/// `Failed → Active` is a permitted transition (recovery).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeRecordStatus {
    #[serde(rename = "A")]
    Active,
    #[serde(rename = "L")]
    Left,
    #[serde(rename = "F")]
    Failed,
}

impl From<MemberState> for NodeRecordStatus {
    fn from(state: MemberState) -> Self {
        match state {
            MemberState::Alive | MemberState::None => NodeRecordStatus::Active,
            MemberState::Leaving | MemberState::Left => NodeRecordStatus::Left,
            MemberState::Failed => NodeRecordStatus::Failed,
        }
    }
}

/// Persisted node row, keyed by node name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub name: NodeName,
    pub status: NodeRecordStatus,
}

/// Compact status encoding for persisted probe rows.
///
/// `Unknown` collapses to `F` on write and reads back as `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProbeRowStatus {
    #[serde(rename = "H")]
    Running,
    #[serde(rename = "F")]
    Failed,
    #[serde(rename = "T")]
    Terminated,
}

impl From<ProbeStatus> for ProbeRowStatus {
    fn from(status: ProbeStatus) -> Self {
        match status {
            ProbeStatus::Running => ProbeRowStatus::Running,
            ProbeStatus::Terminated => ProbeRowStatus::Terminated,
            ProbeStatus::Failed | ProbeStatus::Unknown => ProbeRowStatus::Failed,
        }
    }
}

impl From<ProbeRowStatus> for ProbeStatus {
    fn from(status: ProbeRowStatus) -> Self {
        match status {
            ProbeRowStatus::Running => ProbeStatus::Running,
            ProbeRowStatus::Terminated => ProbeStatus::Terminated,
            ProbeRowStatus::Failed => ProbeStatus::Failed,
        }
    }
}

/// Persisted probe row. `detail` is wire-only and not part of the row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeRow {
    pub checker: String,
    pub extra: String,
    pub status: ProbeRowStatus,
    pub error: String,
    pub captured_at: u64,
}

impl From<&Probe> for ProbeRow {
    fn from(probe: &Probe) -> Self {
        Self {
            checker: probe.checker.clone(),
            extra: probe.extra.clone(),
            status: probe.status.into(),
            error: probe.error.clone(),
            captured_at: probe.captured_at,
        }
    }
}

impl From<ProbeRow> for Probe {
    fn from(row: ProbeRow) -> Self {
        Self {
            checker: row.checker,
            status: row.status.into(),
            error: row.error,
            detail: String::new(),
            extra: row.extra,
            captured_at: row.captured_at,
        }
    }
}

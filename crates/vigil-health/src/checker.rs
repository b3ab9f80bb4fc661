//! The `Checker` contract and the per-tick probe collector.

use async_trait::async_trait;

use vigil_state::{MemberStatus, NodeState, NodeStatus, Probe, ProbeStatus};

/// An obligation to run one named health check.
#[async_trait]
pub trait Checker: Send + Sync {
    /// Stable name identifying this checker across runs.
    fn name(&self) -> &str;

    /// Run the check, recording outcomes into `reporter`.
    ///
    /// A checker owns its own internal timeouts but must stay within the
    /// overall deadline the registry imposes on the run.
    async fn check(&self, reporter: &mut Reporter);
}

/// Collects the probe records of a single tick and finalizes them into a
/// `NodeStatus`.
///
/// Every recorded probe is stamped with the tick's shared `captured_at`
/// timestamp, so the whole tick reads as one point in time.
#[derive(Debug)]
pub struct Reporter {
    name: String,
    captured_at: u64,
    probes: Vec<Probe>,
}

impl Reporter {
    /// Fresh reporter for one tick of the named node.
    pub fn new(name: impl Into<String>, captured_at: u64) -> Self {
        Self {
            name: name.into(),
            captured_at,
            probes: Vec::new(),
        }
    }

    /// Record a probe.
    pub fn add(&mut self, probe: Probe) {
        self.probes.push(Probe {
            captured_at: self.captured_at,
            ..probe
        });
    }

    /// Record a failed probe for the named checker.
    pub fn add_failure(&mut self, checker: &str, error: impl ToString) {
        self.add(Probe {
            checker: checker.to_string(),
            status: ProbeStatus::Failed,
            error: error.to_string(),
            ..Default::default()
        });
    }

    /// Probes recorded so far.
    pub fn probes(&self) -> &[Probe] {
        &self.probes
    }

    /// Finalize the tick: the node runs iff every probe runs.
    pub fn into_status(self, member: MemberStatus) -> NodeStatus {
        let status = if self.probes.iter().all(|p| p.status == ProbeStatus::Running) {
            NodeState::Running
        } else {
            NodeState::Degraded
        };
        NodeStatus {
            name: self.name,
            status,
            member,
            probes: self.probes,
            captured_at: self.captured_at,
        }
    }
}

//! Agent configuration.

use std::net::SocketAddr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ClusterError, ClusterResult};

/// Default port agents serve their RPC endpoint on.
pub const DEFAULT_RPC_PORT: u16 = 7575;

/// Default cadence of the status update loop.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(5);

/// Default probe history retention window.
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(24 * 60 * 60);

/// Default per-call timeout for peer RPCs during fan-out.
pub const DEFAULT_RPC_CALL_TIMEOUT: Duration = Duration::from_secs(1);

/// Member tag carrying the node role.
pub const ROLE_TAG: &str = "role";

/// Role a node carries in the cluster, published as the `role` member tag.
///
/// Role is never inferred from other signals: a node is a master iff its
/// member tags say so.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Master,
    Node,
}

impl Role {
    /// The member tag value for this role.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Master => "master",
            Role::Node => "node",
        }
    }
}

/// Configuration for a vigil agent.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// This node's stable name, matching its membership name.
    pub name: String,
    /// Listener addresses for the agent RPC endpoint (several for dual
    /// stacks or extra sockets).
    pub bind_addrs: Vec<SocketAddr>,
    /// Port peers serve their agent RPC on, used when fanning out.
    pub rpc_port: u16,
    /// Address of the kubernetes API server, handed to checker factories.
    pub kube_addr: String,
    /// Initial peers to join the membership with.
    pub peers: Vec<String>,
    /// Role this node carries.
    pub role: Role,
    /// Cadence of the status update loop.
    pub tick_interval: Duration,
    /// How long probe history is kept in the store.
    pub retention: Duration,
    /// Per-call timeout for peer RPCs during fan-out.
    pub rpc_call_timeout: Duration,
}

impl AgentConfig {
    /// Configuration with defaults for the given node name and role.
    pub fn new(name: impl Into<String>, role: Role) -> Self {
        Self {
            name: name.into(),
            bind_addrs: Vec::new(),
            rpc_port: DEFAULT_RPC_PORT,
            kube_addr: String::new(),
            peers: Vec::new(),
            role,
            tick_interval: DEFAULT_TICK_INTERVAL,
            retention: DEFAULT_RETENTION,
            rpc_call_timeout: DEFAULT_RPC_CALL_TIMEOUT,
        }
    }

    /// Validate the configuration. Errors here are fatal at startup.
    pub fn validate(&self) -> ClusterResult<()> {
        if self.name.is_empty() {
            return Err(ClusterError::Config("node name must not be empty".into()));
        }
        if self.bind_addrs.is_empty() {
            return Err(ClusterError::Config(
                "at least one RPC listener address is required".into(),
            ));
        }
        Ok(())
    }
}

//! Agent RPC client.
//!
//! Wraps the generated gRPC client with the fan-out call discipline: every
//! connect and call is bounded by the configured timeout, and transport
//! failures surface as the `Unavailable` error kind so the agent can fold
//! them into `unknown` node placeholders.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tonic::transport::Channel;

use vigil_state::{MemberStatus, NodeStatus, SystemStatus};

use crate::convert;
use crate::error::{ClusterError, ClusterResult};
use crate::proto;
use crate::proto::agent_client::AgentClient as GrpcClient;

type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

/// Factory producing a connected client for a member.
///
/// The agent dials through this indirection so tests can redirect fan-out
/// targets.
pub type DialRpc = Arc<dyn Fn(MemberStatus) -> BoxFuture<ClusterResult<AgentClient>> + Send + Sync>;

/// Default dialer: connects to the member's advertised host on the agent
/// RPC port.
pub fn default_dial_rpc(rpc_port: u16, call_timeout: Duration) -> DialRpc {
    Arc::new(move |member: MemberStatus| {
        let host = member.addr.split(':').next().unwrap_or_default().to_string();
        let endpoint = format!("http://{host}:{rpc_port}");
        Box::pin(async move { AgentClient::connect(endpoint, call_timeout).await })
    })
}

/// Client for one peer's agent RPC endpoint.
pub struct AgentClient {
    inner: GrpcClient<Channel>,
    call_timeout: Duration,
}

impl AgentClient {
    /// Connect to an agent endpoint (`http://host:port`), bounded by
    /// `call_timeout`.
    pub async fn connect(endpoint: String, call_timeout: Duration) -> ClusterResult<Self> {
        let connect = GrpcClient::connect(endpoint.clone());
        let inner = tokio::time::timeout(call_timeout, connect)
            .await
            .map_err(|_| ClusterError::Unavailable(format!("{endpoint}: connect timed out")))?
            .map_err(|e| ClusterError::Unavailable(format!("{endpoint}: {e}")))?;
        Ok(Self {
            inner,
            call_timeout,
        })
    }

    /// Fetch the peer's last finalized local node status.
    pub async fn local_status(&mut self) -> ClusterResult<NodeStatus> {
        let call = self.inner.local_status(proto::LocalStatusRequest {});
        let response = tokio::time::timeout(self.call_timeout, call)
            .await
            .map_err(|_| ClusterError::Unavailable("local status call timed out".into()))?
            .map_err(|e| ClusterError::Unavailable(e.to_string()))?;
        let status = response
            .into_inner()
            .status
            .ok_or_else(|| ClusterError::Internal("peer response missing node status".into()))?;
        Ok(convert::node_from_proto(status))
    }

    /// Fetch the peer's last aggregated cluster view.
    pub async fn status(&mut self) -> ClusterResult<SystemStatus> {
        let call = self.inner.status(proto::StatusRequest {});
        let response = tokio::time::timeout(self.call_timeout, call)
            .await
            .map_err(|_| ClusterError::Unavailable("status call timed out".into()))?
            .map_err(|e| ClusterError::Unavailable(e.to_string()))?;
        let status = response
            .into_inner()
            .status
            .ok_or_else(|| ClusterError::Internal("peer response missing system status".into()))?;
        Ok(convert::system_from_proto(status))
    }
}

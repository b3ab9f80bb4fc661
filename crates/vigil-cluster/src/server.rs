//! Agent gRPC server.
//!
//! Serves the two read-only status operations from the cache; a request
//! never triggers a probe run. Any number of listeners can be mounted
//! (dual stacks, extra sockets); all of them drain in-flight requests and
//! stop once the shutdown signal flips, after which handlers answer
//! `unavailable`.

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::{Request, Response, Status};
use tracing::{error, info};

use vigil_state::StatusCache;

use crate::convert;
use crate::proto;

/// gRPC implementation of the agent status service.
#[derive(Clone)]
pub struct AgentServer {
    name: String,
    cache: Arc<StatusCache>,
    shutdown: watch::Receiver<bool>,
}

impl AgentServer {
    /// Create a server answering for the named node out of `cache`.
    pub fn new(name: String, cache: Arc<StatusCache>, shutdown: watch::Receiver<bool>) -> Self {
        Self {
            name,
            cache,
            shutdown,
        }
    }

    /// Serve the agent RPC surface on every listener.
    ///
    /// Each listener gets its own task; all of them drain in-flight
    /// requests once the shutdown signal flips.
    pub fn serve(&self, listeners: Vec<TcpListener>) -> Vec<JoinHandle<()>> {
        listeners
            .into_iter()
            .map(|listener| {
                let server = self.clone();
                let mut shutdown = self.shutdown.clone();
                tokio::spawn(async move {
                    let addr = listener.local_addr().ok();
                    info!(?addr, "agent RPC listener starting");
                    let result = tonic::transport::Server::builder()
                        .add_service(proto::agent_server::AgentServer::new(server))
                        .serve_with_incoming_shutdown(TcpListenerStream::new(listener), async move {
                            let _ = shutdown.changed().await;
                        })
                        .await;
                    if let Err(e) = result {
                        error!(error = %e, "agent RPC server error");
                    }
                })
            })
            .collect()
    }

    fn shutting_down(&self) -> bool {
        *self.shutdown.borrow()
    }
}

#[tonic::async_trait]
impl proto::agent_server::Agent for AgentServer {
    /// Report the last aggregated cluster view.
    async fn status(
        &self,
        _request: Request<proto::StatusRequest>,
    ) -> Result<Response<proto::StatusResponse>, Status> {
        if self.shutting_down() {
            return Err(Status::unavailable("agent is shutting down"));
        }

        let status = self.cache.recent_status().await;
        let summary = status.summary.clone();
        Ok(Response::new(proto::StatusResponse {
            status: Some(convert::system_to_proto(&status)),
            summary,
        }))
    }

    /// Report the last finalized status of this node.
    async fn local_status(
        &self,
        _request: Request<proto::LocalStatusRequest>,
    ) -> Result<Response<proto::LocalStatusResponse>, Status> {
        if self.shutting_down() {
            return Err(Status::unavailable("agent is shutting down"));
        }

        match self.cache.recent_node_status(&self.name).await {
            Some(status) => Ok(Response::new(proto::LocalStatusResponse {
                status: Some(convert::node_to_proto(&status)),
            })),
            None => Err(Status::unavailable("local status not collected yet")),
        }
    }
}

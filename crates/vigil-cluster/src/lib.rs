//! vigil-cluster — the peer-to-peer cluster health agent.
//!
//! One agent runs on every node and answers two questions: "how is this
//! node" and "how is the cluster".
//!
//! # Architecture
//!
//! ```text
//! Agent (every node)
//!   ├── Registry ─── local checkers → NodeStatus, once per tick
//!   ├── StatusCache / StatusStore ─── latest view + rolling history
//!   ├── AgentServer (gRPC, N listeners)
//!   │   ├── LocalStatus() → last finalized local NodeStatus
//!   │   └── Status() → last aggregated SystemStatus
//!   ├── Membership driver (gossip adapter, external)
//!   │   └── MemberCache ← event stream + periodic snapshots
//!   └── tick task
//!       ├── probe locally, commit NodeStatus
//!       ├── fan LocalStatus out to the alive peers (bounded per call)
//!       └── aggregate into SystemStatus, commit to cache + store
//! ```
//!
//! Queries always read from the cache, so a slow peer or a failing disk
//! never blocks a status response.

pub mod agent;
pub mod aggregate;
pub mod client;
pub mod config;
pub mod convert;
pub mod error;
pub mod membership;
pub mod server;

/// Generated protobuf types and gRPC service stubs.
pub mod proto {
    tonic::include_proto!("vigil.agent");
}

pub use agent::Agent;
pub use aggregate::aggregate;
pub use client::{default_dial_rpc, AgentClient, DialRpc};
pub use config::{AgentConfig, Role};
pub use error::{ClusterError, ClusterResult};
pub use membership::{run_membership, MemberCache, Membership, MembershipEvent, StaticMembership};
pub use server::AgentServer;

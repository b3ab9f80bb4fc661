//! vigil-state — embedded status persistence for the vigil health agent.
//!
//! Backed by [redb](https://docs.rs/redb): node records and probe history
//! are JSON-serialized into `&[u8]` value columns. Probe keys embed a
//! zero-padded timestamp (`{node}/{captured_at}/{seq}`) so recent-status
//! reads and retention sweeps are plain prefix scans in time order.
//!
//! The `StatusStore` is `Clone` + `Send` + `Sync` (backed by `Arc<Database>`)
//! and can be shared across async tasks. The `StatusCache` holds the latest
//! aggregated view in memory and replicates every write into the store.

pub mod cache;
pub mod error;
pub mod store;
pub mod tables;
pub mod types;

pub use cache::StatusCache;
pub use error::{StateError, StateResult};
pub use store::{epoch_secs, StatusStore};
pub use types::*;

//! vigil-health — health checking primitives for the vigil agent.
//!
//! A `Checker` is a named diagnostic that records zero or more `Probe`
//! observations into a `Reporter` per invocation; the `Registry` holds an
//! ordered, name-unique set of them and runs the whole set against a fresh
//! reporter once per agent tick. What a checker actually pokes (an HTTP
//! endpoint, a unix socket, a filesystem watermark) is the embedder's
//! business; the agent only consumes this interface.

pub mod checker;
pub mod registry;

pub use checker::{Checker, Reporter};
pub use registry::Registry;

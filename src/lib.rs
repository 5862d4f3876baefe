//! Asynchronous facade over a callback-driven key-value command dispatcher.
//!
//! Single-key commands resolve through [`Single`], a future of one value,
//! an empty completion or an error. Scans, queries and streaming batches
//! yield through [`Multi`], a cancellable stream. Batch calls fan out per
//! node and are correlated back either positionally or in arrival order,
//! with the partial-failure policy fixed by the calling method.
//!
//! The transport lives behind [`CommandDispatcher`]. [`MemoryCluster`] is an
//! in-process implementation for tests and demos.

mod adapter;
mod batch;
mod client;
mod config;
mod dispatcher;
mod errors;
mod memory;
mod metrics;
mod model;

pub use adapter::*;
pub use batch::*;
pub use client::*;
pub use config::*;
pub use dispatcher::*;
pub use errors::*;
pub use memory::*;
pub use metrics::*;
pub use model::*;

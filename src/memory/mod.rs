//! In-process dispatcher used by the demo binary and the integration tests.
//!
//! [`MemoryCluster`] simulates a small cluster: records live in a sharded
//! map, keys are owned by nodes through their hash, and every answer is
//! delivered from a spawned task so callers observe the same asynchronous
//! behaviour as with a networked transport. Node and key failures can be
//! injected to exercise the partial-failure paths.

mod cluster;
mod store;

pub use cluster::*;
pub use store::UdfFn;

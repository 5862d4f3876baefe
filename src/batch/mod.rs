//! Batch orchestration: node fan-out, result correlation and the
//! partial-failure policy of each batch entry point.
//!
//! A batch call is split by owning node, one sub-batch is dispatched per
//! node (bounded by [`BatchPolicy::max_concurrent_nodes`](crate::BatchPolicy)),
//! and the per-item answers are either reassembled in input order
//! ([`positional`]) or forwarded on arrival ([`streaming`]).

mod correlation;
mod policy;

pub use correlation::*;
pub use policy::*;

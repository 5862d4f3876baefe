//! The two asynchronous result shapes handed to callers.
//!
//! - [`Single`]: exactly one eventual value, an empty completion, or an error.
//! - [`Multi`]: zero or more items followed by one completion or error.
//!
//! Both are cold: nothing reaches the dispatcher until the handle is first
//! polled. The dispatcher side talks to them through [`ValueSink`] and
//! [`ItemSink`], which enforce the single terminal signal.

mod multi;
mod single;

pub use multi::*;
pub use single::*;

#[cfg(test)]
mod single_test;

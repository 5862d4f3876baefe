//! Asynchronous facade over a [`CommandDispatcher`].
//!
//! [`Client`] composes every call out of the adapters and the batch engine:
//! - single-key commands resolve through a [`Single`]
//! - positional batches resolve to one aligned value through a [`Single`]
//! - streaming batches, scans and queries yield through a [`Multi`]
//!
//! Every handle is cold. Building one only captures the policies in force;
//! the dispatcher sees the command on first poll.
//!
//! # Basic Usage
//! ```no_run
//! use kv_reactor::{Bin, Client, Key, MemoryCluster};
//! use std::sync::Arc;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() {
//!     let cluster = MemoryCluster::with_nodes(3).unwrap();
//!     let client = Client::builder(Arc::new(cluster)).build().unwrap();
//!
//!     let key = Key::new("test", "users", "user:1001");
//!     client.put(None, key.clone(), vec![Bin::new("name", "Alice")]).await.unwrap();
//!
//!     let found = client.get(None, key).await.unwrap();
//!     println!("User data: {:?}", found);
//! }
//! ```

mod batch_ops;
mod builder;
mod query_ops;
mod record_ops;

pub use builder::*;

#[cfg(test)]
mod batch_ops_test;

use std::sync::Arc;

use arc_swap::ArcSwap;
use tracing::debug;
use tracing::error;

use crate::dispatcher::Registration;
use crate::metrics::DISPATCHED_COMMANDS;
use crate::metrics::REGISTRATION_FAILURES;
use crate::BatchDeletePolicy;
use crate::BatchPolicy;
use crate::BatchWritePolicy;
use crate::ClientConfig;
use crate::CommandDispatcher;
use crate::DispatchRegistrationError;
use crate::Error;
use crate::InfoPolicy;
use crate::ItemSink;
use crate::Multi;
use crate::Node;
use crate::PolicyDefaults;
use crate::QueryPolicy;
use crate::ReadPolicy;
use crate::Result;
use crate::ScanPolicy;
use crate::Single;
use crate::ValueSink;
use crate::WritePolicy;

/// Main entry point of the facade
///
/// Cheap to clone: clones share the dispatcher and the policy defaults.
/// Created through the [`builder()`](Client::builder) method.
#[derive(Clone)]
pub struct Client {
    pub(super) inner: Arc<ArcSwap<ClientInner>>,
}

#[derive(Clone)]
pub struct ClientInner {
    pub(super) dispatcher: Arc<dyn CommandDispatcher>,
    pub(super) config: ClientConfig,
}

impl Client {
    /// Create a configured client builder on top of `dispatcher`
    pub fn builder(dispatcher: Arc<dyn CommandDispatcher>) -> ClientBuilder {
        ClientBuilder::new(dispatcher)
    }

    pub(crate) fn new(inner: ClientInner) -> Self {
        Self {
            inner: Arc::new(ArcSwap::from_pointee(inner)),
        }
    }

    /// Configuration currently in force
    pub fn config(&self) -> ClientConfig {
        self.inner.load().config
    }

    /// Swaps in new policy defaults for every clone of this client.
    ///
    /// Handles created earlier keep the policies they captured.
    pub fn set_config(
        &self,
        config: ClientConfig,
    ) -> Result<()> {
        let config = config.validate()?;
        let old_inner = self.inner.load();
        self.inner.store(Arc::new(ClientInner {
            dispatcher: old_inner.dispatcher.clone(),
            config,
        }));
        debug!("client policies replaced");
        Ok(())
    }

    pub fn policies(&self) -> PolicyDefaults {
        self.inner.load().config.policies
    }

    pub fn read_policy(&self) -> ReadPolicy {
        self.policies().read
    }

    pub fn write_policy(&self) -> WritePolicy {
        self.policies().write
    }

    pub fn batch_policy(&self) -> BatchPolicy {
        self.policies().batch
    }

    pub fn batch_write_policy(&self) -> BatchWritePolicy {
        self.policies().batch_write
    }

    pub fn batch_delete_policy(&self) -> BatchDeletePolicy {
        self.policies().batch_delete
    }

    pub fn scan_policy(&self) -> ScanPolicy {
        self.policies().scan
    }

    pub fn query_policy(&self) -> QueryPolicy {
        self.policies().query
    }

    pub fn info_policy(&self) -> InfoPolicy {
        self.policies().info
    }

    /// Nodes of the dispatcher's current cluster view
    pub fn nodes(&self) -> Vec<Node> {
        self.inner.load().dispatcher.nodes()
    }

    /// Closes the dispatcher. Commands registered afterwards fail with
    /// [`DispatchRegistrationError::Closed`].
    pub fn close(&self) {
        self.inner.load().dispatcher.close();
    }

    pub(crate) fn dispatcher(&self) -> Arc<dyn CommandDispatcher> {
        self.inner.load().dispatcher.clone()
    }

    /// Wraps one registration into a cold [`Single`]
    pub(crate) fn single<T, F>(
        &self,
        operation: &'static str,
        register: F,
    ) -> Single<T>
    where
        T: Send + 'static,
        F: FnOnce(&dyn CommandDispatcher, ValueSink<T>) -> Registration + Send + 'static,
    {
        let dispatcher = self.dispatcher();
        Single::from_registration(move |sink| {
            DISPATCHED_COMMANDS.with_label_values(&[operation]).inc();
            debug!(operation, "dispatching command");
            register(dispatcher.as_ref(), sink).map_err(|e| registration_failed(operation, e))
        })
    }

    /// Wraps one registration into a cold [`Multi`]
    pub(crate) fn multi<T, F>(
        &self,
        operation: &'static str,
        register: F,
    ) -> Multi<T>
    where
        T: Send + 'static,
        F: FnOnce(&dyn CommandDispatcher, ItemSink<T>) -> Registration + Send + 'static,
    {
        let dispatcher = self.dispatcher();
        Multi::from_registration(move |sink| {
            DISPATCHED_COMMANDS.with_label_values(&[operation]).inc();
            debug!(operation, "dispatching stream command");
            register(dispatcher.as_ref(), sink).map_err(|e| registration_failed(operation, e))
        })
    }
}

fn registration_failed(
    operation: &'static str,
    e: DispatchRegistrationError,
) -> Error {
    REGISTRATION_FAILURES.with_label_values(&[operation]).inc();
    error!(operation, "dispatcher refused the command: {}", e);
    e.into()
}

/// Handle that fails on first poll, for calls rejected before dispatch
pub(crate) fn rejected<T: Send + 'static>(error: Error) -> Single<T> {
    debug!("call rejected before dispatch: {}", error);
    Single::from_registration(move |_| Err(error))
}

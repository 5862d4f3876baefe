//! Contract of the command dispatcher the facade runs on.
//!
//! The dispatcher owns the transport: event loops, sockets, connection
//! pools, cluster view and record encoding. This crate only registers
//! commands with it and listens on the sinks it hands over. Every method
//! returns synchronously; a returned error means nothing was scheduled and
//! the sink will never be used.
//!
//! Sinks may be signalled from any thread, including synchronously from
//! inside the registration call.

mod sink;

pub use sink::*;


use std::collections::HashMap;

#[cfg(test)]
use mockall::automock;

use crate::Bin;
use crate::BatchEntry;
use crate::BatchPolicy;
use crate::DispatchRegistrationError;
use crate::IndexSpec;
use crate::InfoPolicy;
use crate::ItemSink;
use crate::Key;
use crate::KeyRecord;
use crate::Node;
use crate::NodeGroup;
use crate::Operation;
use crate::QueryPolicy;
use crate::ReadMode;
use crate::ReadPolicy;
use crate::ScanPolicy;
use crate::ScanRequest;
use crate::Statement;
use crate::UdfCall;
use crate::Value;
use crate::ValueSink;
use crate::WriteKind;
use crate::WritePolicy;

/// Synchronous answer of a registration call
pub type Registration = std::result::Result<(), DispatchRegistrationError>;

#[cfg_attr(test, automock)]
pub trait CommandDispatcher: Send + Sync + 'static {
    /// Reads one record. A missing key completes with a `KeyRecord` whose
    /// record is `None`.
    fn read(
        &self,
        policy: &ReadPolicy,
        key: &Key,
        mode: &ReadMode,
        sink: ValueSink<KeyRecord>,
    ) -> Registration;

    /// Writes bins with put, append, prepend or add semantics
    fn write(
        &self,
        policy: &WritePolicy,
        key: &Key,
        kind: WriteKind,
        bins: &[Bin],
        sink: ValueSink<Key>,
    ) -> Registration;

    /// Completes with whether the record existed
    fn delete(
        &self,
        policy: &WritePolicy,
        key: &Key,
        sink: ValueSink<bool>,
    ) -> Registration;

    /// Resets the record's expiration. Fails with `KeyNotFound` when the
    /// record is missing.
    fn touch(
        &self,
        policy: &WritePolicy,
        key: &Key,
        sink: ValueSink<Key>,
    ) -> Registration;

    fn exists(
        &self,
        policy: &ReadPolicy,
        key: &Key,
        sink: ValueSink<bool>,
    ) -> Registration;

    /// Applies the operations in order and returns what the read
    /// operations produced
    fn operate(
        &self,
        policy: &WritePolicy,
        key: &Key,
        ops: &[Operation],
        sink: ValueSink<KeyRecord>,
    ) -> Registration;

    /// Runs a registered function against one record. `None` means the
    /// function returned nothing.
    fn execute_udf(
        &self,
        policy: &WritePolicy,
        key: &Key,
        call: &UdfCall,
        sink: ValueSink<Option<Value>>,
    ) -> Registration;

    /// Splits batch keys by owning node. Offsets index into `keys`.
    fn partition(
        &self,
        policy: &BatchPolicy,
        keys: &[Key],
    ) -> std::result::Result<Vec<NodeGroup>, DispatchRegistrationError>;

    /// Sends one node's share of a batch. Each entry is answered through
    /// `sink.record`, then the node signals `complete` or `fail` once.
    fn batch_node(
        &self,
        policy: &BatchPolicy,
        node: &Node,
        entries: Vec<BatchEntry>,
        sink: BatchNodeSink,
    ) -> Registration;

    fn scan(
        &self,
        policy: &ScanPolicy,
        request: &ScanRequest,
        sink: ItemSink<KeyRecord>,
    ) -> Registration;

    fn query(
        &self,
        policy: &QueryPolicy,
        statement: &Statement,
        sink: ItemSink<KeyRecord>,
    ) -> Registration;

    /// Sends info commands to one node. Commands the node does not know
    /// are missing from the answer.
    fn info(
        &self,
        policy: &InfoPolicy,
        node: &Node,
        commands: &[String],
        sink: ValueSink<HashMap<String, String>>,
    ) -> Registration;

    fn create_index(
        &self,
        policy: &InfoPolicy,
        spec: &IndexSpec,
        sink: ValueSink<()>,
    ) -> Registration;

    fn drop_index(
        &self,
        policy: &InfoPolicy,
        namespace: &str,
        index_name: &str,
        sink: ValueSink<()>,
    ) -> Registration;

    /// Current cluster view
    fn nodes(&self) -> Vec<Node>;

    /// Stops accepting registrations. In-flight commands still complete.
    fn close(&self);
}

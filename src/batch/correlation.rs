use std::collections::VecDeque;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Weak;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::error;
use tracing::warn;

use super::isolated_failure;
use super::item_failure;
use super::BatchDescriptor;
use super::FailurePolicy;
use crate::dispatcher::BatchObserver;
use crate::metrics::BATCH_ABORTS;
use crate::metrics::BATCH_CALLS;
use crate::metrics::BATCH_SIZE;
use crate::metrics::DISPATCHED_COMMANDS;
use crate::metrics::PER_ITEM_FAILURES;
use crate::metrics::REGISTRATION_FAILURES;
use crate::BatchEntry;
use crate::BatchItem;
use crate::BatchKind;
use crate::BatchNodeSink;
use crate::BatchPolicy;
use crate::BatchRecord;
use crate::CommandDispatcher;
use crate::DispatchRegistrationError;
use crate::Error;
use crate::ItemSink;
use crate::Key;
use crate::Multi;
use crate::Node;
use crate::NodeGroup;
use crate::Result;
use crate::ResultCode;
use crate::Single;
use crate::ValueSink;

type Assemble<T> = Box<dyn FnOnce(Vec<BatchRecord>) -> T + Send>;

/// Runs a batch whose output is aligned with `items`.
///
/// `assemble` receives exactly one record per input item, in input order,
/// once every node answered. Under [`FailurePolicy::AbortOnNodeFailure`]
/// the first node failure resolves the handle with [`Error::BatchAbort`]
/// instead.
pub fn positional<T, F>(
    dispatcher: Arc<dyn CommandDispatcher>,
    policy: BatchPolicy,
    descriptor: BatchDescriptor,
    items: Vec<BatchItem>,
    assemble: F,
) -> Single<T>
where
    T: Send + 'static,
    F: FnOnce(Vec<BatchRecord>) -> T + Send + 'static,
{
    Single::from_registration(move |sink: ValueSink<T>| {
        record_call(descriptor, items.len());
        if items.is_empty() {
            debug!(family = descriptor.family.as_str(), "empty batch resolved without dispatch");
            sink.success(assemble(Vec::new()));
            return Ok(());
        }

        let groups = plan(dispatcher.as_ref(), &policy, descriptor, &items)?;
        let token = sink.cancellation().child_token();
        let aggregator = Positional::new(descriptor, describe(&items), sink, Box::new(assemble), token.clone());
        BatchRun::start(dispatcher, policy, descriptor, items, groups, aggregator, token);
        Ok(())
    })
}

/// Runs a batch whose results are forwarded as they arrive.
///
/// Entries a node completes without answering are emitted as not-found
/// records. Node failures are held back until every other node finished,
/// then end the stream with the first error observed.
pub fn streaming<T, F>(
    dispatcher: Arc<dyn CommandDispatcher>,
    policy: BatchPolicy,
    descriptor: BatchDescriptor,
    items: Vec<BatchItem>,
    map: F,
) -> Multi<T>
where
    T: Send + 'static,
    F: Fn(BatchRecord) -> T + Send + Sync + 'static,
{
    Multi::from_registration(move |sink: ItemSink<T>| {
        record_call(descriptor, items.len());
        if items.is_empty() {
            debug!(family = descriptor.family.as_str(), "empty batch completed without dispatch");
            sink.complete();
            return Ok(());
        }

        let groups = plan(dispatcher.as_ref(), &policy, descriptor, &items)?;
        let token = sink.cancellation().child_token();
        let records = sink.adapt(move |record| Some(map(record)));
        let aggregator = Streaming::new(descriptor, describe(&items), groups.len(), records, token.clone());
        BatchRun::start(dispatcher, policy, descriptor, items, groups, aggregator, token);
        Ok(())
    })
}

fn record_call(
    descriptor: BatchDescriptor,
    len: usize,
) {
    let family = descriptor.family.as_str();
    BATCH_CALLS.with_label_values(&[family]).inc();
    BATCH_SIZE.with_label_values(&[family]).observe(len as f64);
}

fn describe(items: &[BatchItem]) -> Vec<(Key, BatchKind)> {
    items.iter().map(|item| (item.key().clone(), item.kind())).collect()
}

/// Asks the dispatcher for the node split and checks that it covers every
/// input position exactly once.
fn plan(
    dispatcher: &dyn CommandDispatcher,
    policy: &BatchPolicy,
    descriptor: BatchDescriptor,
    items: &[BatchItem],
) -> Result<Vec<NodeGroup>> {
    let keys: Vec<Key> = items.iter().map(|item| item.key().clone()).collect();
    let groups = dispatcher.partition(policy, &keys).map_err(|e| {
        REGISTRATION_FAILURES.with_label_values(&["partition"]).inc();
        error!(family = descriptor.family.as_str(), error = %e, "batch partition rejected");
        e
    })?;
    let groups: Vec<NodeGroup> = groups.into_iter().filter(|g| !g.offsets.is_empty()).collect();
    validate_partition(&groups, items.len())?;
    Ok(groups)
}

pub(crate) fn validate_partition(
    groups: &[NodeGroup],
    len: usize,
) -> std::result::Result<(), DispatchRegistrationError> {
    let mut owned = vec![false; len];
    for group in groups {
        for &offset in &group.offsets {
            if offset >= len {
                return Err(DispatchRegistrationError::InvalidPartition(format!(
                    "node {} owns offset {} of a {} item batch",
                    group.node, offset, len
                )));
            }
            if owned[offset] {
                return Err(DispatchRegistrationError::InvalidPartition(format!(
                    "offset {offset} assigned twice"
                )));
            }
            owned[offset] = true;
        }
    }
    if let Some(missing) = owned.iter().position(|owned| !owned) {
        return Err(DispatchRegistrationError::InvalidPartition(format!(
            "offset {missing} has no owning node"
        )));
    }
    Ok(())
}

/// Collects the answers of one batch call
trait Aggregator: Send + Sync + 'static {
    fn on_record(
        &self,
        node: &Node,
        offset: usize,
        record: BatchRecord,
    );

    fn on_node_complete(
        &self,
        offsets: &[usize],
    );

    fn on_node_failure(
        &self,
        node: &Node,
        offsets: &[usize],
        error: Error,
    );

    fn is_terminated(&self) -> bool;
}

/// Fan-out of one batch call across its nodes
struct BatchRun<A: Aggregator> {
    this: Weak<Self>,
    dispatcher: Arc<dyn CommandDispatcher>,
    policy: BatchPolicy,
    descriptor: BatchDescriptor,
    groups: Vec<NodeGroup>,
    /// Per group entries, taken when the group is dispatched
    entries: Mutex<Vec<Option<Vec<BatchEntry>>>>,
    pending: Mutex<VecDeque<usize>>,
    aggregator: A,
    token: CancellationToken,
}

impl<A: Aggregator> BatchRun<A> {
    fn start(
        dispatcher: Arc<dyn CommandDispatcher>,
        policy: BatchPolicy,
        descriptor: BatchDescriptor,
        items: Vec<BatchItem>,
        groups: Vec<NodeGroup>,
        aggregator: A,
        token: CancellationToken,
    ) {
        let mut items: Vec<Option<BatchItem>> = items.into_iter().map(Some).collect();
        let entries: Vec<Option<Vec<BatchEntry>>> = groups
            .iter()
            .map(|group| {
                Some(
                    group
                        .offsets
                        .iter()
                        .filter_map(|&offset| items[offset].take().map(|item| BatchEntry { offset, item }))
                        .collect(),
                )
            })
            .collect();

        let width = match policy.max_concurrent_nodes {
            0 => groups.len(),
            max => max.min(groups.len()),
        };
        debug!(
            family = descriptor.family.as_str(),
            nodes = groups.len(),
            width,
            "dispatching batch"
        );

        let run = Arc::new_cyclic(|this| BatchRun {
            this: this.clone(),
            dispatcher,
            policy,
            descriptor,
            pending: Mutex::new((0..groups.len()).collect()),
            groups,
            entries: Mutex::new(entries),
            aggregator,
            token,
        });
        for _ in 0..width {
            run.dispatch_next();
        }
    }

    fn dispatch_next(&self) {
        if self.aggregator.is_terminated() || self.token.is_cancelled() {
            return;
        }
        let next = self.pending.lock().pop_front();
        if let Some(group) = next {
            self.dispatch(group);
        }
    }

    fn dispatch(
        &self,
        group: usize,
    ) {
        let Some(this) = self.this.upgrade() else {
            return;
        };
        let entries = self.entries.lock()[group].take().unwrap_or_default();
        let node_group = &self.groups[group];
        let observer: Arc<dyn BatchObserver> = this;
        let sink = BatchNodeSink::new(
            node_group.node.clone(),
            group,
            node_group.offsets.clone(),
            observer,
            self.token.child_token(),
        );

        DISPATCHED_COMMANDS.with_label_values(&["batch_node"]).inc();
        if let Err(e) = self
            .dispatcher
            .batch_node(&self.policy, &node_group.node, entries, sink.clone())
        {
            REGISTRATION_FAILURES.with_label_values(&["batch_node"]).inc();
            error!(node = %node_group.node, error = %e, "batch node registration failed");
            sink.fail(e.into());
        }
    }
}

impl<A: Aggregator> BatchObserver for BatchRun<A> {
    fn on_record(
        &self,
        group: usize,
        offset: usize,
        record: BatchRecord,
    ) {
        self.aggregator.on_record(&self.groups[group].node, offset, record);
    }

    fn on_node_complete(
        &self,
        group: usize,
    ) {
        self.aggregator.on_node_complete(&self.groups[group].offsets);
        self.dispatch_next();
    }

    fn on_node_failure(
        &self,
        group: usize,
        error: Error,
    ) {
        let node_group = &self.groups[group];
        warn!(
            family = self.descriptor.family.as_str(),
            node = %node_group.node,
            error = %error,
            "batch node failed"
        );
        self.aggregator
            .on_node_failure(&node_group.node, &node_group.offsets, error);
        self.dispatch_next();
    }
}

/// Write-once slot per input item plus a remaining count
struct Positional<T> {
    descriptor: BatchDescriptor,
    meta: Vec<(Key, BatchKind)>,
    slots: Vec<Mutex<Option<BatchRecord>>>,
    remaining: AtomicUsize,
    terminated: AtomicBool,
    finish: Mutex<Option<(ValueSink<T>, Assemble<T>)>>,
    token: CancellationToken,
}

impl<T: Send + 'static> Positional<T> {
    fn new(
        descriptor: BatchDescriptor,
        meta: Vec<(Key, BatchKind)>,
        sink: ValueSink<T>,
        assemble: Assemble<T>,
        token: CancellationToken,
    ) -> Self {
        Self {
            descriptor,
            slots: meta.iter().map(|_| Mutex::new(None)).collect(),
            remaining: AtomicUsize::new(meta.len()),
            meta,
            terminated: AtomicBool::new(false),
            finish: Mutex::new(Some((sink, assemble))),
            token,
        }
    }

    /// Returns false when the slot was already filled
    fn fill(
        &self,
        offset: usize,
        record: BatchRecord,
    ) -> bool {
        if self.terminated.load(Ordering::Acquire) {
            return true;
        }
        {
            let mut slot = self.slots[offset].lock();
            if slot.is_some() {
                return false;
            }
            *slot = Some(record);
        }
        if self.remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.resolve();
        }
        true
    }

    fn fill_unanswered(
        &self,
        offsets: &[usize],
        mut make: impl FnMut(&Key, BatchKind) -> BatchRecord,
    ) {
        for &offset in offsets {
            if self.terminated.load(Ordering::Acquire) {
                return;
            }
            if self.slots[offset].lock().is_some() {
                continue;
            }
            let (key, kind) = &self.meta[offset];
            self.fill(offset, make(key, *kind));
        }
    }

    fn take_finish(&self) -> Option<(ValueSink<T>, Assemble<T>)> {
        if self
            .terminated
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return None;
        }
        self.finish.lock().take()
    }

    fn resolve(&self) {
        let Some((sink, assemble)) = self.take_finish() else {
            return;
        };
        let records: Vec<BatchRecord> = self
            .slots
            .iter()
            .zip(&self.meta)
            .map(|(slot, (key, kind))| {
                slot.lock().take().unwrap_or_else(|| {
                    BatchRecord::failed(key.clone(), *kind, ResultCode::NoResponse, kind.is_write())
                })
            })
            .collect();

        let failures = records
            .iter()
            .filter(|r| !r.is_success() && r.result_code != ResultCode::KeyNotFound)
            .count();
        if failures > 0 {
            PER_ITEM_FAILURES
                .with_label_values(&[self.descriptor.family.as_str()])
                .inc_by(failures as u64);
        }
        debug!(
            family = self.descriptor.family.as_str(),
            items = records.len(),
            failures,
            "positional batch resolved"
        );
        sink.success(assemble(records));
    }

    fn abort(
        &self,
        node: &Node,
        error: Error,
    ) {
        let Some((sink, _)) = self.take_finish() else {
            return;
        };
        BATCH_ABORTS.with_label_values(&[self.descriptor.family.as_str()]).inc();
        self.token.cancel();
        sink.error(Error::BatchAbort {
            node: node.to_string(),
            source: Box::new(error),
        });
    }
}

impl<T: Send + 'static> Aggregator for Positional<T> {
    fn on_record(
        &self,
        node: &Node,
        offset: usize,
        record: BatchRecord,
    ) {
        if self.descriptor.failure_policy == FailurePolicy::AbortOnNodeFailure {
            if let Some(error) = item_failure(&record) {
                warn!(
                    family = self.descriptor.family.as_str(),
                    %node,
                    offset,
                    code = ?record.result_code,
                    "batch item failed"
                );
                self.abort(node, error);
                return;
            }
        }
        if !self.fill(offset, record) {
            warn!(offset, "batch slot answered twice, later answer dropped");
        }
    }

    fn on_node_complete(
        &self,
        offsets: &[usize],
    ) {
        self.fill_unanswered(offsets, |key, kind| BatchRecord::not_found(key.clone(), kind));
    }

    fn on_node_failure(
        &self,
        node: &Node,
        offsets: &[usize],
        error: Error,
    ) {
        match self.descriptor.failure_policy {
            FailurePolicy::AbortOnNodeFailure => self.abort(node, error),
            FailurePolicy::IsolateAndContinue => {
                self.fill_unanswered(offsets, |key, kind| isolated_failure(key.clone(), kind, &error))
            }
        }
    }

    fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::Acquire)
    }
}

/// Forwards answers on arrival and ends the stream after the last node
struct Streaming {
    descriptor: BatchDescriptor,
    meta: Vec<(Key, BatchKind)>,
    reported: Vec<AtomicBool>,
    remaining_nodes: AtomicUsize,
    first_error: Mutex<Option<Error>>,
    sink: ItemSink<BatchRecord>,
    token: CancellationToken,
}

impl Streaming {
    fn new(
        descriptor: BatchDescriptor,
        meta: Vec<(Key, BatchKind)>,
        nodes: usize,
        sink: ItemSink<BatchRecord>,
        token: CancellationToken,
    ) -> Self {
        Self {
            descriptor,
            reported: meta.iter().map(|_| AtomicBool::new(false)).collect(),
            meta,
            remaining_nodes: AtomicUsize::new(nodes),
            first_error: Mutex::new(None),
            sink,
            token,
        }
    }

    fn node_done(&self) {
        if self.remaining_nodes.fetch_sub(1, Ordering::AcqRel) != 1 {
            return;
        }
        let failure = self.first_error.lock().take();
        match failure {
            Some(e) => {
                debug!(family = self.descriptor.family.as_str(), error = %e, "streaming batch failed");
                self.sink.error(e);
            }
            None => {
                debug!(family = self.descriptor.family.as_str(), "streaming batch completed");
                self.sink.complete();
            }
        }
    }
}

impl Aggregator for Streaming {
    fn on_record(
        &self,
        _node: &Node,
        offset: usize,
        record: BatchRecord,
    ) {
        if self.reported[offset].swap(true, Ordering::AcqRel) {
            warn!(offset, "batch entry answered twice, later answer dropped");
            return;
        }
        if !record.is_success() && record.result_code != ResultCode::KeyNotFound {
            PER_ITEM_FAILURES
                .with_label_values(&[self.descriptor.family.as_str()])
                .inc();
        }
        self.sink.item(record);
    }

    fn on_node_complete(
        &self,
        offsets: &[usize],
    ) {
        for &offset in offsets {
            if !self.reported[offset].swap(true, Ordering::AcqRel) {
                let (key, kind) = &self.meta[offset];
                self.sink.item(BatchRecord::not_found(key.clone(), *kind));
            }
        }
        self.node_done();
    }

    fn on_node_failure(
        &self,
        node: &Node,
        _offsets: &[usize],
        error: Error,
    ) {
        match self.descriptor.failure_policy {
            FailurePolicy::AbortOnNodeFailure => {
                BATCH_ABORTS.with_label_values(&[self.descriptor.family.as_str()]).inc();
                self.token.cancel();
                self.sink.error(Error::BatchAbort {
                    node: node.to_string(),
                    source: Box::new(error),
                });
            }
            FailurePolicy::IsolateAndContinue => {
                self.first_error.lock().get_or_insert(error);
                self.node_done();
            }
        }
    }

    fn is_terminated(&self) -> bool {
        self.sink.is_closed()
    }
}

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::hash::Hasher;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use config::ConfigError;
use dashmap::DashMap;
use rand::Rng;
use serde::Deserialize;
use serde::Serialize;
use tokio::runtime::Handle;
use tokio::time::sleep;
use tracing::debug;
use tracing::trace;

use super::store::RecordStore;
use super::store::UdfFn;
use super::store::WriteSpec;
use crate::dispatcher::Registration;
use crate::errors::CommandError;
use crate::BatchEntry;
use crate::BatchItem;
use crate::BatchNodeSink;
use crate::BatchPolicy;
use crate::BatchRecord;
use crate::Bin;
use crate::CommandDispatcher;
use crate::DispatchRegistrationError;
use crate::Error;
use crate::IndexSpec;
use crate::InfoPolicy;
use crate::ItemSink;
use crate::Key;
use crate::KeyRecord;
use crate::Node;
use crate::NodeError;
use crate::NodeGroup;
use crate::Operation;
use crate::QueryPolicy;
use crate::ReadMode;
use crate::ReadPolicy;
use crate::Record;
use crate::Result;
use crate::ResultCode;
use crate::ScanPolicy;
use crate::ScanRequest;
use crate::Statement;
use crate::UdfCall;
use crate::Value;
use crate::ValueSink;
use crate::WriteKind;
use crate::WritePolicy;

/// Bin holding a UDF's return value in batch UDF results
pub const UDF_RESULT_BIN: &str = "SUCCESS";

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(default)]
pub struct MemoryClusterConfig {
    /// Simulated server nodes
    pub nodes: usize,
    /// Commands in flight before registrations are refused (0 = unlimited)
    pub max_in_flight: usize,
    /// Upper bound of the random delay added to every reply (unit: milliseconds)
    pub max_reply_delay_ms: u64,
}

impl Default for MemoryClusterConfig {
    fn default() -> Self {
        Self {
            nodes: 3,
            max_in_flight: 0,
            max_reply_delay_ms: 0,
        }
    }
}

impl MemoryClusterConfig {
    pub fn validate(&self) -> Result<()> {
        if self.nodes == 0 {
            return Err(Error::Config(ConfigError::Message(
                "memory cluster needs at least one node".into(),
            )));
        }
        Ok(())
    }
}

/// Failure injected on one simulated node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeFault {
    /// Every command to the node fails at once
    Unreachable,
    /// Every command to the node fails after the delay
    Timeout(Duration),
}

/// In-process [`CommandDispatcher`] backed by a sharded map.
///
/// Keys are owned by nodes through their hash. Every reply is sent from a
/// spawned tokio task, so the caller must run inside a tokio runtime.
#[derive(Clone)]
pub struct MemoryCluster {
    inner: Arc<ClusterInner>,
}

struct ClusterInner {
    config: MemoryClusterConfig,
    nodes: Vec<Node>,
    store: RecordStore,
    indexes: DashMap<(String, String), IndexSpec>,
    udfs: DashMap<(String, String), UdfFn>,
    node_faults: DashMap<String, NodeFault>,
    key_faults: DashMap<Key, ResultCode>,
    in_flight: Arc<AtomicUsize>,
    closed: AtomicBool,
}

/// Releases one in-flight slot when the reply task ends
struct InFlightGuard(Arc<AtomicUsize>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

impl MemoryCluster {
    pub fn new(config: MemoryClusterConfig) -> Result<Self> {
        config.validate()?;
        let nodes = (0..config.nodes)
            .map(|i| Node::new(format!("node-{i}"), format!("127.0.0.1:{}", 3000 + i)))
            .collect();
        Ok(Self {
            inner: Arc::new(ClusterInner {
                config,
                nodes,
                store: RecordStore::default(),
                indexes: DashMap::new(),
                udfs: DashMap::new(),
                node_faults: DashMap::new(),
                key_faults: DashMap::new(),
                in_flight: Arc::new(AtomicUsize::new(0)),
                closed: AtomicBool::new(false),
            }),
        })
    }

    /// Cluster with `nodes` nodes and immediate replies
    pub fn with_nodes(nodes: usize) -> Result<Self> {
        Self::new(MemoryClusterConfig {
            nodes,
            ..MemoryClusterConfig::default()
        })
    }

    pub fn config(&self) -> &MemoryClusterConfig {
        &self.inner.config
    }

    /// Node owning `key`
    pub fn node_of(
        &self,
        key: &Key,
    ) -> &Node {
        &self.inner.nodes[self.inner.owner(key)]
    }

    /// Stores a record directly, bypassing policies and faults
    pub fn seed(
        &self,
        key: Key,
        bins: Vec<Bin>,
    ) {
        let ops: Vec<Operation> = bins.into_iter().map(Operation::Put).collect();
        if let Err(e) = self.inner.store.operate(&WriteSpec::default(), &key, &ops) {
            debug!(error = %e, "seeding record failed");
        }
    }

    pub fn record_count(&self) -> usize {
        self.inner.store.len()
    }

    pub fn register_udf(
        &self,
        package: impl Into<String>,
        function: impl Into<String>,
        udf: UdfFn,
    ) {
        self.inner.udfs.insert((package.into(), function.into()), udf);
    }

    /// Sets or clears (`None`) the fault of the node called `node`
    pub fn set_node_fault(
        &self,
        node: &str,
        fault: Option<NodeFault>,
    ) {
        match fault {
            Some(fault) => {
                self.inner.node_faults.insert(node.to_string(), fault);
            }
            None => {
                self.inner.node_faults.remove(node);
            }
        }
    }

    /// Every command touching `key` fails with `code` until cleared
    pub fn fail_key(
        &self,
        key: Key,
        code: ResultCode,
    ) {
        self.inner.key_faults.insert(key, code);
    }

    pub fn clear_faults(&self) {
        self.inner.node_faults.clear();
        self.inner.key_faults.clear();
    }

    pub fn in_flight(&self) -> usize {
        self.inner.in_flight.load(Ordering::Acquire)
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Schedules `reply` on the current runtime, as an event loop would
    fn schedule<F>(
        &self,
        operation: &'static str,
        reply: F,
    ) -> Registration
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.is_closed() {
            return Err(DispatchRegistrationError::Closed);
        }
        let handle = Handle::try_current().map_err(|e| DispatchRegistrationError::NoEventLoop(e.to_string()))?;

        let in_flight = self.inner.in_flight.fetch_add(1, Ordering::AcqRel) + 1;
        let guard = InFlightGuard(self.inner.in_flight.clone());
        let limit = self.inner.config.max_in_flight;
        if limit > 0 && in_flight > limit {
            return Err(DispatchRegistrationError::EventLoopExhausted {
                in_flight: in_flight - 1,
                limit,
            });
        }

        let delay = self.reply_delay();
        trace!(operation, in_flight, ?delay, "scheduling reply");
        handle.spawn(async move {
            let _guard = guard;
            if !delay.is_zero() {
                sleep(delay).await;
            }
            reply.await;
        });
        Ok(())
    }

    fn reply_delay(&self) -> Duration {
        match self.inner.config.max_reply_delay_ms {
            0 => Duration::ZERO,
            max => Duration::from_millis(rand::thread_rng().gen_range(0..=max)),
        }
    }

    /// Runs a single-key command on the key's owner node
    fn single<T, F>(
        &self,
        operation: &'static str,
        key: &Key,
        sink: ValueSink<T>,
        run: F,
    ) -> Registration
    where
        T: Send + 'static,
        F: FnOnce(&ClusterInner, &Key) -> Result<Option<T>> + Send + 'static,
    {
        let inner = self.inner.clone();
        let key = key.clone();
        self.schedule(operation, async move {
            if sink.is_cancelled() {
                trace!(operation, "command cancelled before execution");
                return;
            }
            let outcome = match inner.gate(inner.owner(&key), Some(&key)).await {
                Ok(()) => run(&inner, &key),
                Err(e) => Err(e),
            };
            sink.send(outcome);
        })
    }

    fn node_index(
        &self,
        node: &Node,
    ) -> std::result::Result<usize, DispatchRegistrationError> {
        self.inner
            .nodes
            .iter()
            .position(|n| n == node)
            .ok_or_else(|| DispatchRegistrationError::UnknownNode(node.to_string()))
    }
}

impl ClusterInner {
    fn owner(
        &self,
        key: &Key,
    ) -> usize {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() % self.nodes.len() as u64) as usize
    }

    /// Applies the faults injected on a node and, optionally, a key
    async fn gate(
        &self,
        node: usize,
        key: Option<&Key>,
    ) -> Result<()> {
        let name = &self.nodes[node].name;
        let fault = self.node_faults.get(name).map(|f| *f);
        match fault {
            Some(NodeFault::Unreachable) => {
                return Err(NodeError::Unreachable { node: name.clone() }.into());
            }
            Some(NodeFault::Timeout(after)) => {
                sleep(after).await;
                return Err(NodeError::Timeout {
                    node: name.clone(),
                    after,
                }
                .into());
            }
            None => {}
        }
        if let Some(code) = key.and_then(|k| self.key_fault(k)) {
            return Err(CommandError::new(code, "injected failure").into());
        }
        Ok(())
    }

    fn key_fault(
        &self,
        key: &Key,
    ) -> Option<ResultCode> {
        self.key_faults.get(key).map(|code| *code)
    }

    fn udf(
        &self,
        call: &UdfCall,
    ) -> std::result::Result<UdfFn, CommandError> {
        self.udfs
            .get(&(call.package.clone(), call.function.clone()))
            .map(|f| f.clone())
            .ok_or_else(|| {
                CommandError::new(
                    ResultCode::UdfFailure,
                    format!("function {}.{} not registered", call.package, call.function),
                )
            })
    }

    /// Result of one batch entry, `None` when the key does not exist
    fn answer(
        &self,
        item: BatchItem,
    ) -> Option<BatchRecord> {
        let key = item.key().clone();
        let kind = item.kind();
        if let Some(code) = self.key_fault(&key) {
            return Some(BatchRecord::failed(key, kind, code, false));
        }

        let outcome = match &item {
            BatchItem::Read(read) => self
                .store
                .get(&key, &read.mode)
                .map(|record| record.map(|r| BatchRecord::ok(key.clone(), kind, Some(r)))),
            BatchItem::Write(write) => {
                let spec = WriteSpec::from(&write.policy.unwrap_or_default());
                self.store
                    .operate(&spec, &key, &write.ops)
                    .map(|record| Some(BatchRecord::ok(key.clone(), kind, record)))
            }
            BatchItem::Delete(delete) => {
                let spec = WriteSpec::from(&delete.policy.unwrap_or_default());
                self.store
                    .delete(&spec, &key)
                    .map(|existed| existed.then(|| BatchRecord::ok(key.clone(), kind, None)))
            }
            BatchItem::Udf(udf) => {
                let spec = WriteSpec::from(&udf.policy.unwrap_or_default());
                self.udf(&udf.call)
                    .and_then(|f| self.store.apply_udf(&spec, &key, &f, &udf.call.args))
                    .map(|value| {
                        let bins = value
                            .map(|v| HashMap::from([(UDF_RESULT_BIN.to_string(), v)]))
                            .unwrap_or_default();
                        Some(BatchRecord::ok(key.clone(), kind, Some(Record::new(bins, 0, 0))))
                    })
            }
        };

        match outcome {
            Ok(record) => record,
            Err(e) => Some(BatchRecord::failed(key, kind, e.code, kind.is_write() && e.in_doubt)),
        }
    }

    fn info_value(
        &self,
        node: usize,
        command: &str,
    ) -> Option<String> {
        let value = match command {
            "node" => self.nodes[node].name.clone(),
            "build" => env!("CARGO_PKG_VERSION").to_string(),
            "status" => "ok".to_string(),
            "namespaces" => self.store.namespaces().join(";"),
            "statistics" => {
                let objects = self.store.keys().iter().filter(|k| self.owner(k) == node).count();
                format!(
                    "objects={};client_connections={}",
                    objects,
                    self.in_flight.load(Ordering::Acquire)
                )
            }
            "sindex" => {
                let mut entries: Vec<String> = self
                    .indexes
                    .iter()
                    .map(|i| format!("ns={}:indexname={}:bin={}", i.namespace, i.index_name, i.bin_name))
                    .collect();
                entries.sort_unstable();
                entries.join(";")
            }
            _ => return None,
        };
        Some(value)
    }
}

impl CommandDispatcher for MemoryCluster {
    fn read(
        &self,
        _policy: &ReadPolicy,
        key: &Key,
        mode: &ReadMode,
        sink: ValueSink<KeyRecord>,
    ) -> Registration {
        let mode = mode.clone();
        self.single("read", key, sink, move |inner, key| {
            let record = inner.store.get(key, &mode)?;
            Ok(Some(KeyRecord::new(key.clone(), record)))
        })
    }

    fn write(
        &self,
        policy: &WritePolicy,
        key: &Key,
        kind: WriteKind,
        bins: &[Bin],
        sink: ValueSink<Key>,
    ) -> Registration {
        let spec = WriteSpec::from(policy);
        let bins = bins.to_vec();
        self.single(kind.as_str(), key, sink, move |inner, key| {
            inner.store.write(&spec, key, kind, &bins)?;
            Ok(Some(key.clone()))
        })
    }

    fn delete(
        &self,
        policy: &WritePolicy,
        key: &Key,
        sink: ValueSink<bool>,
    ) -> Registration {
        let spec = WriteSpec::from(policy);
        self.single("delete", key, sink, move |inner, key| {
            Ok(Some(inner.store.delete(&spec, key)?))
        })
    }

    fn touch(
        &self,
        policy: &WritePolicy,
        key: &Key,
        sink: ValueSink<Key>,
    ) -> Registration {
        let spec = WriteSpec::from(policy);
        self.single("touch", key, sink, move |inner, key| {
            inner.store.touch(&spec, key)?;
            Ok(Some(key.clone()))
        })
    }

    fn exists(
        &self,
        _policy: &ReadPolicy,
        key: &Key,
        sink: ValueSink<bool>,
    ) -> Registration {
        self.single("exists", key, sink, |inner, key| Ok(Some(inner.store.exists(key))))
    }

    fn operate(
        &self,
        policy: &WritePolicy,
        key: &Key,
        ops: &[Operation],
        sink: ValueSink<KeyRecord>,
    ) -> Registration {
        let spec = WriteSpec::from(policy);
        let ops = ops.to_vec();
        self.single("operate", key, sink, move |inner, key| {
            let record = inner.store.operate(&spec, key, &ops)?;
            Ok(Some(KeyRecord::new(key.clone(), record)))
        })
    }

    fn execute_udf(
        &self,
        policy: &WritePolicy,
        key: &Key,
        call: &UdfCall,
        sink: ValueSink<Option<Value>>,
    ) -> Registration {
        let spec = WriteSpec::from(policy);
        let call = call.clone();
        self.single("execute_udf", key, sink, move |inner, key| {
            let function = inner.udf(&call)?;
            Ok(Some(inner.store.apply_udf(&spec, key, &function, &call.args)?))
        })
    }

    fn partition(
        &self,
        _policy: &BatchPolicy,
        keys: &[Key],
    ) -> std::result::Result<Vec<NodeGroup>, DispatchRegistrationError> {
        if self.is_closed() {
            return Err(DispatchRegistrationError::Closed);
        }
        let mut offsets: Vec<Vec<usize>> = vec![Vec::new(); self.inner.nodes.len()];
        for (offset, key) in keys.iter().enumerate() {
            offsets[self.inner.owner(key)].push(offset);
        }
        Ok(self
            .inner
            .nodes
            .iter()
            .zip(offsets)
            .filter(|(_, offsets)| !offsets.is_empty())
            .map(|(node, offsets)| NodeGroup {
                node: node.clone(),
                offsets,
            })
            .collect())
    }

    fn batch_node(
        &self,
        _policy: &BatchPolicy,
        node: &Node,
        entries: Vec<BatchEntry>,
        sink: BatchNodeSink,
    ) -> Registration {
        let index = self.node_index(node)?;
        let inner = self.inner.clone();
        self.schedule("batch_node", async move {
            if let Err(e) = inner.gate(index, None).await {
                sink.fail(e);
                return;
            }
            for entry in entries {
                if sink.is_cancelled() {
                    debug!(node = %sink.node(), "batch cancelled, remaining entries skipped");
                    break;
                }
                if let Some(record) = inner.answer(entry.item) {
                    sink.record(entry.offset, record);
                }
            }
            sink.complete();
        })
    }

    fn scan(
        &self,
        policy: &ScanPolicy,
        request: &ScanRequest,
        sink: ItemSink<KeyRecord>,
    ) -> Registration {
        let inner = self.inner.clone();
        let request = request.clone();
        let max_records = policy.max_records;
        self.schedule("scan", async move {
            let records = inner
                .store
                .scan(&request.namespace, request.set_name.as_deref(), &request.bin_names, None);
            stream_by_node(&inner, records, max_records, &sink).await;
        })
    }

    fn query(
        &self,
        _policy: &QueryPolicy,
        statement: &Statement,
        sink: ItemSink<KeyRecord>,
    ) -> Registration {
        let inner = self.inner.clone();
        let statement = statement.clone();
        self.schedule("query", async move {
            if let Some(filter) = &statement.filter {
                let indexed = inner
                    .indexes
                    .iter()
                    .any(|i| i.namespace == statement.namespace && i.bin_name == filter.bin());
                if !indexed {
                    sink.error(
                        CommandError::new(
                            ResultCode::IndexNotFound,
                            format!("no index on bin {}", filter.bin()),
                        )
                        .into(),
                    );
                    return;
                }
            }
            let records = inner.store.scan(
                &statement.namespace,
                statement.set_name.as_deref(),
                &statement.bin_names,
                statement.filter.as_ref(),
            );
            stream_by_node(&inner, records, statement.max_records, &sink).await;
        })
    }

    fn info(
        &self,
        _policy: &InfoPolicy,
        node: &Node,
        commands: &[String],
        sink: ValueSink<HashMap<String, String>>,
    ) -> Registration {
        let index = self.node_index(node)?;
        let inner = self.inner.clone();
        let commands = commands.to_vec();
        self.schedule("info", async move {
            if let Err(e) = inner.gate(index, None).await {
                sink.error(e);
                return;
            }
            let answers = commands
                .iter()
                .filter_map(|c| inner.info_value(index, c).map(|v| (c.clone(), v)))
                .collect();
            sink.success(answers);
        })
    }

    fn create_index(
        &self,
        _policy: &InfoPolicy,
        spec: &IndexSpec,
        sink: ValueSink<()>,
    ) -> Registration {
        let inner = self.inner.clone();
        let spec = spec.clone();
        self.schedule("create_index", async move {
            let id = (spec.namespace.clone(), spec.index_name.clone());
            if inner.indexes.contains_key(&id) {
                sink.error(
                    CommandError::new(
                        ResultCode::IndexAlreadyExists,
                        format!("index {} already exists", spec.index_name),
                    )
                    .into(),
                );
                return;
            }
            inner.indexes.insert(id, spec);
            sink.empty();
        })
    }

    fn drop_index(
        &self,
        _policy: &InfoPolicy,
        namespace: &str,
        index_name: &str,
        sink: ValueSink<()>,
    ) -> Registration {
        let inner = self.inner.clone();
        let id = (namespace.to_string(), index_name.to_string());
        self.schedule("drop_index", async move {
            if inner.indexes.remove(&id).is_none() {
                sink.error(CommandError::new(ResultCode::IndexNotFound, format!("index {} not found", id.1)).into());
                return;
            }
            sink.empty();
        })
    }

    fn nodes(&self) -> Vec<Node> {
        self.inner.nodes.clone()
    }

    fn close(&self) {
        if !self.inner.closed.swap(true, Ordering::AcqRel) {
            debug!("memory cluster closed");
        }
    }
}

/// Streams `records` node by node. Records of a faulty node are skipped and
/// its error ends the stream once the healthy nodes are done.
async fn stream_by_node(
    inner: &ClusterInner,
    records: Vec<KeyRecord>,
    max_records: u64,
    sink: &ItemSink<KeyRecord>,
) {
    let mut by_node: Vec<Vec<KeyRecord>> = vec![Vec::new(); inner.nodes.len()];
    for record in records {
        by_node[inner.owner(&record.key)].push(record);
    }

    let mut failure = None;
    let mut sent = 0u64;
    for (index, records) in by_node.into_iter().enumerate() {
        if let Err(e) = inner.gate(index, None).await {
            failure.get_or_insert(e);
            continue;
        }
        for record in records {
            if max_records > 0 && sent >= max_records {
                break;
            }
            if !sink.item(record) {
                trace!("stream closed by consumer, producer stopped");
                return;
            }
            sent += 1;
            tokio::task::yield_now().await;
        }
    }

    match failure {
        Some(e) => sink.error(e),
        None => sink.complete(),
    };
}

use std::fmt;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::BatchRecord;
use crate::Error;
use crate::Node;

/// Receiver of one batch call's node signals
pub(crate) trait BatchObserver: Send + Sync {
    fn on_record(
        &self,
        group: usize,
        offset: usize,
        record: BatchRecord,
    );

    fn on_node_complete(
        &self,
        group: usize,
    );

    fn on_node_failure(
        &self,
        group: usize,
        error: Error,
    );
}

/// Listener of one node's share of a batch.
///
/// Clones share state, so a dispatcher may answer entries from several
/// threads. After the first `complete` or `fail`, further signals are
/// dropped. If every clone is dropped without a terminal, the node counts
/// as failed with [`Error::Abandoned`].
#[derive(Clone)]
pub struct BatchNodeSink {
    inner: Arc<NodeSinkInner>,
}

struct NodeSinkInner {
    node: Node,
    group: usize,
    /// Sorted input offsets this node answers for
    offsets: Vec<usize>,
    done: AtomicBool,
    observer: Arc<dyn BatchObserver>,
    token: CancellationToken,
}

impl BatchNodeSink {
    pub(crate) fn new(
        node: Node,
        group: usize,
        mut offsets: Vec<usize>,
        observer: Arc<dyn BatchObserver>,
        token: CancellationToken,
    ) -> Self {
        offsets.sort_unstable();
        Self {
            inner: Arc::new(NodeSinkInner {
                node,
                group,
                offsets,
                done: AtomicBool::new(false),
                observer,
                token,
            }),
        }
    }

    /// Answers the entry at input position `offset`. Returns false when the
    /// node already terminated or the offset is not one of its entries.
    pub fn record(
        &self,
        offset: usize,
        record: BatchRecord,
    ) -> bool {
        let inner = &self.inner;
        if inner.done.load(Ordering::Acquire) {
            warn!(node = %inner.node, offset, "record after node terminal, dropped");
            return false;
        }
        if inner.offsets.binary_search(&offset).is_err() {
            warn!(node = %inner.node, offset, "record for an offset the node does not own, dropped");
            return false;
        }
        inner.observer.on_record(inner.group, offset, record);
        true
    }

    /// Every entry not answered so far is reported as not found
    pub fn complete(&self) {
        if self.inner.finish() {
            self.inner.observer.on_node_complete(self.inner.group);
        }
    }

    pub fn fail(
        &self,
        error: Error,
    ) {
        if self.inner.finish() {
            self.inner.observer.on_node_failure(self.inner.group, error);
        }
    }

    pub fn node(&self) -> &Node {
        &self.inner.node
    }

    pub fn offsets(&self) -> &[usize] {
        &self.inner.offsets
    }

    pub fn is_done(&self) -> bool {
        self.inner.done.load(Ordering::Acquire)
    }

    /// True once the batch no longer needs this node's answers
    pub fn is_cancelled(&self) -> bool {
        self.inner.token.is_cancelled()
    }

    pub fn cancellation(&self) -> CancellationToken {
        self.inner.token.clone()
    }
}

impl NodeSinkInner {
    fn finish(&self) -> bool {
        let first = self
            .done
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if !first {
            warn!(node = %self.node, "duplicate node terminal ignored");
        }
        first
    }
}

impl Drop for NodeSinkInner {
    fn drop(&mut self) {
        if !self.done.swap(true, Ordering::AcqRel) {
            warn!(node = %self.node, "node sink dropped without a terminal signal");
            self.observer.on_node_failure(self.group, Error::Abandoned);
        }
    }
}

impl fmt::Debug for BatchNodeSink {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("BatchNodeSink")
            .field("node", &self.inner.node)
            .field("offsets", &self.inner.offsets)
            .field("done", &self.is_done())
            .finish()
    }
}

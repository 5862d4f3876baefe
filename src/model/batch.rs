use serde::Deserialize;
use serde::Serialize;

use super::Key;
use super::Operation;
use super::ReadMode;
use super::Record;
use super::ResultCode;
use super::UdfCall;
use crate::BatchDeletePolicy;
use crate::BatchWritePolicy;

/// Variant tag carried by every batch request and result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BatchKind {
    Read,
    Write,
    Delete,
    Udf,
}

impl BatchKind {
    pub fn is_write(self) -> bool {
        !matches!(self, BatchKind::Read)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchRead {
    pub key: Key,
    pub mode: ReadMode,
}

impl BatchRead {
    pub fn all_bins(key: Key) -> Self {
        Self {
            key,
            mode: ReadMode::AllBins,
        }
    }

    pub fn bins(
        key: Key,
        bins: Vec<String>,
    ) -> Self {
        Self {
            key,
            mode: ReadMode::Bins(bins),
        }
    }

    pub fn header(key: Key) -> Self {
        Self {
            key,
            mode: ReadMode::Header,
        }
    }

    pub fn operations(
        key: Key,
        ops: Vec<Operation>,
    ) -> Self {
        Self {
            key,
            mode: ReadMode::Operations(ops),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchWrite {
    pub key: Key,
    pub policy: Option<BatchWritePolicy>,
    pub ops: Vec<Operation>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchDelete {
    pub key: Key,
    pub policy: Option<BatchDeletePolicy>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchUdf {
    pub key: Key,
    pub policy: Option<BatchWritePolicy>,
    pub call: UdfCall,
}

/// One entry of a batch request. Input order is significant: positional
/// results are aligned to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BatchItem {
    Read(BatchRead),
    Write(BatchWrite),
    Delete(BatchDelete),
    Udf(BatchUdf),
}

impl BatchItem {
    pub fn key(&self) -> &Key {
        match self {
            BatchItem::Read(r) => &r.key,
            BatchItem::Write(w) => &w.key,
            BatchItem::Delete(d) => &d.key,
            BatchItem::Udf(u) => &u.key,
        }
    }

    pub fn kind(&self) -> BatchKind {
        match self {
            BatchItem::Read(_) => BatchKind::Read,
            BatchItem::Write(_) => BatchKind::Write,
            BatchItem::Delete(_) => BatchKind::Delete,
            BatchItem::Udf(_) => BatchKind::Udf,
        }
    }
}

/// Batch item addressed to one node, tagged with its input position
#[derive(Debug, Clone, PartialEq)]
pub struct BatchEntry {
    pub offset: usize,
    pub item: BatchItem,
}

/// Outcome of one batch item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchRecord {
    pub key: Key,
    pub record: Option<Record>,
    pub result_code: ResultCode,
    /// Set when a write failed in a way that may still have applied it
    pub in_doubt: bool,
    pub kind: BatchKind,
}

impl BatchRecord {
    pub fn ok(
        key: Key,
        kind: BatchKind,
        record: Option<Record>,
    ) -> Self {
        Self {
            key,
            record,
            result_code: ResultCode::Ok,
            in_doubt: false,
            kind,
        }
    }

    /// Present-but-empty slot for a key the server does not hold
    pub fn not_found(
        key: Key,
        kind: BatchKind,
    ) -> Self {
        Self {
            key,
            record: None,
            result_code: ResultCode::KeyNotFound,
            in_doubt: false,
            kind,
        }
    }

    pub fn failed(
        key: Key,
        kind: BatchKind,
        result_code: ResultCode,
        in_doubt: bool,
    ) -> Self {
        Self {
            key,
            record: None,
            result_code,
            in_doubt,
            kind,
        }
    }

    pub fn is_success(&self) -> bool {
        self.result_code.is_success()
    }
}

/// Aggregate of a whole-batch write, delete or operate call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchResults {
    /// Aligned 1:1 with the input order
    pub records: Vec<BatchRecord>,
    /// True only when every item succeeded
    pub status: bool,
}

impl BatchResults {
    pub fn new(records: Vec<BatchRecord>) -> Self {
        let status = records.iter().all(BatchRecord::is_success);
        Self { records, status }
    }
}

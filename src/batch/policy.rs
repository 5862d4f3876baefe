//! Static partial-failure policy of every batch entry point.
//!
//! Positional reads abort as a whole when a node fails; streaming calls and
//! write batches isolate the failure to the affected items. The asymmetry
//! between the two read shapes is part of the public contract.

use crate::errors::CommandError;
use crate::BatchKind;
use crate::BatchRecord;
use crate::Error;
use crate::Key;
use crate::ResultCode;

/// How results are correlated back to the input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Correlation {
    /// Output aligned 1:1 with the input, exposed once every slot is filled
    Positional,
    /// Each result forwarded on arrival
    Streaming,
}

/// What a node failure does to the rest of the batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Terminate the whole call with one error and cancel sibling nodes
    AbortOnNodeFailure,
    /// Record the failure per item and let the other nodes finish
    IsolateAndContinue,
}

/// Facade batch entry points
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BatchFamily {
    GetKeys,
    GetKeysOperations,
    GetRecords,
    GetHeaders,
    ExistsKeys,
    StreamGetKeys,
    StreamGetKeysOperations,
    StreamGetRecords,
    StreamExistsKeys,
    DeleteKeys,
    OperateKeys,
    OperateRecords,
}

/// Behaviour of one batch call, fixed by the family that issued it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchDescriptor {
    pub family: BatchFamily,
    pub correlation: Correlation,
    pub failure_policy: FailurePolicy,
}

impl BatchFamily {
    pub const ALL: [BatchFamily; 12] = [
        BatchFamily::GetKeys,
        BatchFamily::GetKeysOperations,
        BatchFamily::GetRecords,
        BatchFamily::GetHeaders,
        BatchFamily::ExistsKeys,
        BatchFamily::StreamGetKeys,
        BatchFamily::StreamGetKeysOperations,
        BatchFamily::StreamGetRecords,
        BatchFamily::StreamExistsKeys,
        BatchFamily::DeleteKeys,
        BatchFamily::OperateKeys,
        BatchFamily::OperateRecords,
    ];

    pub const fn correlation(self) -> Correlation {
        match self {
            BatchFamily::StreamGetKeys
            | BatchFamily::StreamGetKeysOperations
            | BatchFamily::StreamGetRecords
            | BatchFamily::StreamExistsKeys => Correlation::Streaming,
            _ => Correlation::Positional,
        }
    }

    pub const fn failure_policy(self) -> FailurePolicy {
        match self {
            BatchFamily::GetKeys
            | BatchFamily::GetKeysOperations
            | BatchFamily::GetRecords
            | BatchFamily::GetHeaders
            | BatchFamily::ExistsKeys => FailurePolicy::AbortOnNodeFailure,
            _ => FailurePolicy::IsolateAndContinue,
        }
    }

    pub const fn descriptor(self) -> BatchDescriptor {
        BatchDescriptor {
            family: self,
            correlation: self.correlation(),
            failure_policy: self.failure_policy(),
        }
    }

    /// Metric label
    pub const fn as_str(self) -> &'static str {
        match self {
            BatchFamily::GetKeys => "get_keys",
            BatchFamily::GetKeysOperations => "get_keys_operations",
            BatchFamily::GetRecords => "get_records",
            BatchFamily::GetHeaders => "get_headers",
            BatchFamily::ExistsKeys => "exists_keys",
            BatchFamily::StreamGetKeys => "stream_get_keys",
            BatchFamily::StreamGetKeysOperations => "stream_get_keys_operations",
            BatchFamily::StreamGetRecords => "stream_get_records",
            BatchFamily::StreamExistsKeys => "stream_exists_keys",
            BatchFamily::DeleteKeys => "delete_keys",
            BatchFamily::OperateKeys => "operate_keys",
            BatchFamily::OperateRecords => "operate_records",
        }
    }
}

/// Per-item record for an entry whose node failed under
/// [`FailurePolicy::IsolateAndContinue`]. Only writes can be in doubt.
pub fn isolated_failure(
    key: Key,
    kind: BatchKind,
    error: &Error,
) -> BatchRecord {
    let in_doubt = kind.is_write() && error.is_in_doubt();
    BatchRecord::failed(key, kind, error.result_code(), in_doubt)
}

/// Error carried by a per-item answer that fails the whole call under
/// [`FailurePolicy::AbortOnNodeFailure`]. A missing key is an answer, not a
/// failure.
pub fn item_failure(record: &BatchRecord) -> Option<Error> {
    match record.result_code {
        ResultCode::Ok | ResultCode::KeyNotFound => None,
        code => {
            let mut error = CommandError::new(code, format!("batch item {:?} failed", record.key));
            error.in_doubt = record.in_doubt;
            Some(error.into())
        }
    }
}

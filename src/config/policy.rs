//! Per-command policy bags.
//!
//! The adaptation layer treats these as opaque: they are forwarded to the
//! dispatcher untouched. The only field read locally is
//! [`BatchPolicy::max_concurrent_nodes`], which shapes the batch fan-out.

use std::time::Duration;

use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// How a write treats an existing record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordExistsAction {
    /// Create or merge bins into the existing record
    #[default]
    Update,
    /// Fail if the record does not exist
    UpdateOnly,
    /// Create or replace every bin
    Replace,
    /// Fail if the record does not exist, otherwise replace
    ReplaceOnly,
    /// Fail if the record exists
    CreateOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationPolicy {
    #[default]
    None,
    /// Apply only if the stored generation equals the expected one
    ExpectGenEqual,
    /// Apply only if the expected generation is greater than the stored one
    ExpectGenGreater,
}

/// Generic read policy
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadPolicy {
    /// Overall deadline including retries (unit: milliseconds, 0 = none)
    pub total_timeout_ms: u64,
    /// Per attempt socket idle timeout (unit: milliseconds, 0 = none)
    pub socket_timeout_ms: u64,
    pub max_retries: u32,
    pub sleep_between_retries_ms: u64,
}

impl Default for ReadPolicy {
    fn default() -> Self {
        Self {
            total_timeout_ms: 1000,
            socket_timeout_ms: 30000,
            max_retries: 2,
            sleep_between_retries_ms: 0,
        }
    }
}

impl ReadPolicy {
    pub fn total_timeout(&self) -> Option<Duration> {
        (self.total_timeout_ms > 0).then(|| Duration::from_millis(self.total_timeout_ms))
    }

    pub fn validate(&self) -> Result<()> {
        if self.sleep_between_retries_ms > 0 && self.max_retries == 0 {
            return Err(Error::Config(ConfigError::Message(
                "sleep_between_retries_ms is set but max_retries is 0".into(),
            )));
        }
        if self.max_retries > MAX_RETRIES {
            return Err(Error::Config(ConfigError::Message(format!(
                "max_retries ({}) exceeds limit {}",
                self.max_retries, MAX_RETRIES
            ))));
        }
        Ok(())
    }
}

const MAX_RETRIES: u32 = 100;

/// Single-record write policy
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WritePolicy {
    pub base: ReadPolicy,
    pub record_exists_action: RecordExistsAction,
    pub generation_policy: GenerationPolicy,
    pub generation: u32,
    /// Record time to live in seconds (0 = namespace default)
    pub expiration: u32,
    pub send_key: bool,
    pub durable_delete: bool,
}

impl Default for WritePolicy {
    fn default() -> Self {
        Self {
            base: ReadPolicy {
                max_retries: 0,
                ..ReadPolicy::default()
            },
            record_exists_action: RecordExistsAction::Update,
            generation_policy: GenerationPolicy::None,
            generation: 0,
            expiration: 0,
            send_key: false,
            durable_delete: false,
        }
    }
}

/// Batch-level policy
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchPolicy {
    pub base: ReadPolicy,
    /// Maximum nodes with a sub-batch in flight (0 = every node at once)
    pub max_concurrent_nodes: usize,
    /// Let the server process in-memory keys inline
    pub allow_inline: bool,
}

impl Default for BatchPolicy {
    fn default() -> Self {
        Self {
            base: ReadPolicy::default(),
            max_concurrent_nodes: 0,
            allow_inline: true,
        }
    }
}

/// Write attributes applied to each item of a write batch
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchWritePolicy {
    pub record_exists_action: RecordExistsAction,
    pub generation_policy: GenerationPolicy,
    pub generation: u32,
    pub expiration: u32,
    pub durable_delete: bool,
    pub send_key: bool,
}

/// Delete attributes applied to each item of a delete batch
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchDeletePolicy {
    pub generation_policy: GenerationPolicy,
    pub generation: u32,
    pub durable_delete: bool,
    pub send_key: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanPolicy {
    pub base: ReadPolicy,
    /// Read every node in parallel, otherwise one node after another
    pub concurrent_nodes: bool,
    /// 0 = unlimited
    pub max_records: u64,
    /// 0 = unthrottled
    pub records_per_second: u32,
}

impl Default for ScanPolicy {
    fn default() -> Self {
        Self {
            base: ReadPolicy {
                total_timeout_ms: 0,
                max_retries: 5,
                ..ReadPolicy::default()
            },
            concurrent_nodes: true,
            max_records: 0,
            records_per_second: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryPolicy {
    pub base: ReadPolicy,
    /// 0 = every node at once
    pub max_concurrent_nodes: usize,
    /// Buffered records before the transport pauses a node
    pub record_queue_size: usize,
}

impl Default for QueryPolicy {
    fn default() -> Self {
        Self {
            base: ReadPolicy {
                total_timeout_ms: 0,
                max_retries: 5,
                ..ReadPolicy::default()
            },
            max_concurrent_nodes: 0,
            record_queue_size: 5000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InfoPolicy {
    /// Unit: milliseconds
    pub timeout_ms: u64,
}

impl Default for InfoPolicy {
    fn default() -> Self {
        Self { timeout_ms: 1000 }
    }
}

/// Policies used when a call passes `None`
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyDefaults {
    pub read: ReadPolicy,
    pub write: WritePolicy,
    pub batch: BatchPolicy,
    pub batch_write: BatchWritePolicy,
    pub batch_delete: BatchDeletePolicy,
    pub scan: ScanPolicy,
    pub query: QueryPolicy,
    pub info: InfoPolicy,
}

impl PolicyDefaults {
    pub fn validate(&self) -> Result<()> {
        self.read.validate()?;
        self.write.base.validate()?;
        self.batch.base.validate()?;
        self.scan.base.validate()?;
        self.query.base.validate()?;

        if self.query.record_queue_size == 0 {
            return Err(Error::Config(ConfigError::Message(
                "query.record_queue_size must be greater than 0".into(),
            )));
        }
        if self.info.timeout_ms == 0 {
            return Err(Error::Config(ConfigError::Message(
                "info.timeout_ms must be greater than 0".into(),
            )));
        }
        Ok(())
    }
}

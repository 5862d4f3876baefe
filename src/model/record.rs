use std::collections::HashMap;

use serde::Deserialize;
use serde::Serialize;

use super::Key;
use super::Value;

/// Bins of one record plus its metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub bins: HashMap<String, Value>,
    /// Modification counter maintained by the server
    pub generation: u32,
    /// Expiration in seconds since the server epoch, 0 = never expires
    pub expiration: u32,
}

impl Record {
    pub fn new(
        bins: HashMap<String, Value>,
        generation: u32,
        expiration: u32,
    ) -> Self {
        Self {
            bins,
            generation,
            expiration,
        }
    }

    /// Header-only record: metadata without bins
    pub fn header(
        generation: u32,
        expiration: u32,
    ) -> Self {
        Self::new(HashMap::new(), generation, expiration)
    }

    pub fn get(
        &self,
        bin: &str,
    ) -> Option<&Value> {
        self.bins.get(bin)
    }
}

/// Result of a single-record read. `record` is `None` when the key does not
/// exist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyRecord {
    pub key: Key,
    pub record: Option<Record>,
}

impl KeyRecord {
    pub fn new(
        key: Key,
        record: Option<Record>,
    ) -> Self {
        Self { key, record }
    }
}

/// Positional result of a batch read: `records[i]` belongs to `keys[i]`
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct KeysRecords {
    pub keys: Vec<Key>,
    pub records: Vec<Option<Record>>,
}

impl KeysRecords {
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Existence of one key, as delivered by streaming exists calls
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyExists {
    pub key: Key,
    pub exists: bool,
}

/// Positional result of a batch exists call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeysExists {
    pub keys: Vec<Key>,
    pub exists: Vec<bool>,
}

/// Return value of a user defined function applied to one record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyObject {
    pub key: Key,
    pub object: Option<Value>,
}

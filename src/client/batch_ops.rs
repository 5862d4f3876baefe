//! Multi-key batch calls.
//!
//! Positional calls resolve once to an output aligned with the input.
//! Reads among them abort on the first node failure or on any per-key
//! error other than a missing key; write calls record failures per item
//! and always resolve to a [`BatchResults`].
//! Streaming calls yield each result as its node answers and end with the
//! first node error, if any.

use super::rejected;
use super::Client;
use crate::positional;
use crate::streaming;
use crate::BatchDelete;
use crate::BatchDeletePolicy;
use crate::BatchFamily;
use crate::BatchItem;
use crate::BatchPolicy;
use crate::BatchRead;
use crate::BatchRecord;
use crate::BatchResults;
use crate::BatchWrite;
use crate::BatchWritePolicy;
use crate::Error;
use crate::Key;
use crate::KeyExists;
use crate::KeyRecord;
use crate::KeysExists;
use crate::KeysRecords;
use crate::Multi;
use crate::Operation;
use crate::ReadMode;
use crate::Result;
use crate::Single;

impl Client {
    /// Reads every bin of `keys`. Missing keys leave a `None` slot.
    pub fn get_batch(
        &self,
        policy: Option<BatchPolicy>,
        keys: Vec<Key>,
    ) -> Single<KeysRecords> {
        self.keys_records(BatchFamily::GetKeys, policy, keys, BatchRead::all_bins)
    }

    /// Reads `keys` through read-only operations
    pub fn get_batch_operate(
        &self,
        policy: Option<BatchPolicy>,
        keys: Vec<Key>,
        ops: Vec<Operation>,
    ) -> Single<KeysRecords> {
        if let Err(e) = check_read_operations(&ops) {
            return rejected(e);
        }
        self.keys_records(BatchFamily::GetKeysOperations, policy, keys, move |key| {
            BatchRead::operations(key, ops.clone())
        })
    }

    /// Reads heterogeneous batch reads. The output keeps each item's result
    /// code.
    pub fn get_batch_reads(
        &self,
        policy: Option<BatchPolicy>,
        reads: Vec<BatchRead>,
    ) -> Single<Vec<BatchRecord>> {
        if let Err(e) = reads.iter().try_for_each(check_read) {
            return rejected(e);
        }
        let items = reads.into_iter().map(BatchItem::Read).collect();
        self.positional(BatchFamily::GetRecords, policy, items, |records| records)
    }

    /// Reads generation and expiration of `keys`
    pub fn get_headers(
        &self,
        policy: Option<BatchPolicy>,
        keys: Vec<Key>,
    ) -> Single<KeysRecords> {
        self.keys_records(BatchFamily::GetHeaders, policy, keys, BatchRead::header)
    }

    pub fn exists_batch(
        &self,
        policy: Option<BatchPolicy>,
        keys: Vec<Key>,
    ) -> Single<KeysExists> {
        let items = keys.into_iter().map(|key| BatchItem::Read(BatchRead::header(key))).collect();
        self.positional(BatchFamily::ExistsKeys, policy, items, |records: Vec<BatchRecord>| {
            let (keys, exists) = records.into_iter().map(|r| (r.key, r.result_code.is_success())).unzip();
            KeysExists { keys, exists }
        })
    }

    /// Deletes `keys`. Failures, including node failures, are reported per
    /// item.
    pub fn delete_batch(
        &self,
        policy: Option<BatchPolicy>,
        delete_policy: Option<BatchDeletePolicy>,
        keys: Vec<Key>,
    ) -> Single<BatchResults> {
        let delete_policy = delete_policy.unwrap_or_else(|| self.batch_delete_policy());
        let items = keys
            .into_iter()
            .map(|key| {
                BatchItem::Delete(BatchDelete {
                    key,
                    policy: Some(delete_policy),
                })
            })
            .collect();
        self.positional(BatchFamily::DeleteKeys, policy, items, BatchResults::new)
    }

    /// Applies the same operations to every key
    pub fn operate_batch(
        &self,
        policy: Option<BatchPolicy>,
        write_policy: Option<BatchWritePolicy>,
        keys: Vec<Key>,
        ops: Vec<Operation>,
    ) -> Single<BatchResults> {
        if ops.is_empty() {
            return rejected(Error::InvalidInput("operate batch without operations".into()));
        }
        let write_policy = write_policy.unwrap_or_else(|| self.batch_write_policy());
        let items = keys
            .into_iter()
            .map(|key| {
                BatchItem::Write(BatchWrite {
                    key,
                    policy: Some(write_policy),
                    ops: ops.clone(),
                })
            })
            .collect();
        self.positional(BatchFamily::OperateKeys, policy, items, BatchResults::new)
    }

    /// Runs a mix of reads, writes, deletes and function calls
    pub fn operate_records(
        &self,
        policy: Option<BatchPolicy>,
        items: Vec<BatchItem>,
    ) -> Single<BatchResults> {
        if let Err(e) = items.iter().try_for_each(check_item) {
            return rejected(e);
        }
        self.positional(BatchFamily::OperateRecords, policy, items, BatchResults::new)
    }

    /// Streams every bin of `keys` as nodes answer
    pub fn get_multi(
        &self,
        policy: Option<BatchPolicy>,
        keys: Vec<Key>,
    ) -> Multi<KeyRecord> {
        let items = keys.into_iter().map(|key| BatchItem::Read(BatchRead::all_bins(key))).collect();
        self.streaming(BatchFamily::StreamGetKeys, policy, items, key_record)
    }

    pub fn get_multi_operate(
        &self,
        policy: Option<BatchPolicy>,
        keys: Vec<Key>,
        ops: Vec<Operation>,
    ) -> Multi<KeyRecord> {
        if let Err(e) = check_read_operations(&ops) {
            return Multi::from_registration(move |_| Err(e));
        }
        let items = keys
            .into_iter()
            .map(|key| BatchItem::Read(BatchRead::operations(key, ops.clone())))
            .collect();
        self.streaming(BatchFamily::StreamGetKeysOperations, policy, items, key_record)
    }

    pub fn get_multi_reads(
        &self,
        policy: Option<BatchPolicy>,
        reads: Vec<BatchRead>,
    ) -> Multi<BatchRecord> {
        if let Err(e) = reads.iter().try_for_each(check_read) {
            return Multi::from_registration(move |_| Err(e));
        }
        let items = reads.into_iter().map(BatchItem::Read).collect();
        self.streaming(BatchFamily::StreamGetRecords, policy, items, |record| record)
    }

    pub fn exists_multi(
        &self,
        policy: Option<BatchPolicy>,
        keys: Vec<Key>,
    ) -> Multi<KeyExists> {
        let items = keys.into_iter().map(|key| BatchItem::Read(BatchRead::header(key))).collect();
        self.streaming(BatchFamily::StreamExistsKeys, policy, items, |record| KeyExists {
            exists: record.result_code.is_success(),
            key: record.key,
        })
    }

    fn keys_records<F>(
        &self,
        family: BatchFamily,
        policy: Option<BatchPolicy>,
        keys: Vec<Key>,
        read: F,
    ) -> Single<KeysRecords>
    where
        F: Fn(Key) -> BatchRead,
    {
        let items = keys.into_iter().map(|key| BatchItem::Read(read(key))).collect();
        self.positional(family, policy, items, |records: Vec<BatchRecord>| {
            let (keys, records) = records.into_iter().map(|r| (r.key, r.record)).unzip();
            KeysRecords { keys, records }
        })
    }

    fn positional<T, F>(
        &self,
        family: BatchFamily,
        policy: Option<BatchPolicy>,
        items: Vec<BatchItem>,
        assemble: F,
    ) -> Single<T>
    where
        T: Send + 'static,
        F: FnOnce(Vec<BatchRecord>) -> T + Send + 'static,
    {
        let policy = policy.unwrap_or_else(|| self.batch_policy());
        positional(self.dispatcher(), policy, family.descriptor(), items, assemble)
    }

    fn streaming<T, F>(
        &self,
        family: BatchFamily,
        policy: Option<BatchPolicy>,
        items: Vec<BatchItem>,
        map: F,
    ) -> Multi<T>
    where
        T: Send + 'static,
        F: Fn(BatchRecord) -> T + Send + Sync + 'static,
    {
        let policy = policy.unwrap_or_else(|| self.batch_policy());
        streaming(self.dispatcher(), policy, family.descriptor(), items, map)
    }
}

fn key_record(record: BatchRecord) -> KeyRecord {
    KeyRecord::new(record.key, record.record)
}

fn check_read_operations(ops: &[Operation]) -> Result<()> {
    match ops.iter().find(|op| op.is_write()) {
        Some(op) => Err(Error::InvalidInput(format!("write operation {op:?} in a batch read"))),
        None => Ok(()),
    }
}

fn check_read(read: &BatchRead) -> Result<()> {
    match &read.mode {
        ReadMode::Operations(ops) => check_read_operations(ops),
        _ => Ok(()),
    }
}

fn check_item(item: &BatchItem) -> Result<()> {
    match item {
        BatchItem::Read(read) => check_read(read),
        BatchItem::Write(write) if write.ops.is_empty() => Err(Error::InvalidInput(format!(
            "batch write for {:?} without operations",
            write.key
        ))),
        _ => Ok(()),
    }
}

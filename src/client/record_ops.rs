//! Single-record commands.
//!
//! Each method returns a cold [`Single`]. A missing record is not an error:
//! reads complete with a [`KeyRecord`] whose record is `None`, and
//! [`Client::exists`] completes empty.

use super::Client;
use crate::Bin;
use crate::Key;
use crate::KeyObject;
use crate::KeyRecord;
use crate::Operation;
use crate::ReadMode;
use crate::ReadPolicy;
use crate::Single;
use crate::UdfCall;
use crate::Value;
use crate::WriteKind;
use crate::WritePolicy;

impl Client {
    /// Reads every bin of one record
    pub fn get(
        &self,
        policy: Option<ReadPolicy>,
        key: Key,
    ) -> Single<KeyRecord> {
        self.read("get", policy, key, ReadMode::AllBins)
    }

    /// Reads the named bins of one record
    pub fn get_bins(
        &self,
        policy: Option<ReadPolicy>,
        key: Key,
        bin_names: Vec<String>,
    ) -> Single<KeyRecord> {
        self.read("get_bins", policy, key, ReadMode::Bins(bin_names))
    }

    /// Reads generation and expiration only
    pub fn get_header(
        &self,
        policy: Option<ReadPolicy>,
        key: Key,
    ) -> Single<KeyRecord> {
        self.read("get_header", policy, key, ReadMode::Header)
    }

    fn read(
        &self,
        operation: &'static str,
        policy: Option<ReadPolicy>,
        key: Key,
        mode: ReadMode,
    ) -> Single<KeyRecord> {
        let policy = policy.unwrap_or_else(|| self.read_policy());
        self.single(operation, move |dispatcher, sink| dispatcher.read(&policy, &key, &mode, sink))
    }

    /// Creates or updates bins. Resolves to the written key.
    pub fn put(
        &self,
        policy: Option<WritePolicy>,
        key: Key,
        bins: Vec<Bin>,
    ) -> Single<Key> {
        self.write(policy, key, WriteKind::Put, bins)
    }

    /// Appends string or blob values to existing bins
    pub fn append(
        &self,
        policy: Option<WritePolicy>,
        key: Key,
        bins: Vec<Bin>,
    ) -> Single<Key> {
        self.write(policy, key, WriteKind::Append, bins)
    }

    pub fn prepend(
        &self,
        policy: Option<WritePolicy>,
        key: Key,
        bins: Vec<Bin>,
    ) -> Single<Key> {
        self.write(policy, key, WriteKind::Prepend, bins)
    }

    /// Adds integer values to existing bins
    pub fn add(
        &self,
        policy: Option<WritePolicy>,
        key: Key,
        bins: Vec<Bin>,
    ) -> Single<Key> {
        self.write(policy, key, WriteKind::Add, bins)
    }

    fn write(
        &self,
        policy: Option<WritePolicy>,
        key: Key,
        kind: WriteKind,
        bins: Vec<Bin>,
    ) -> Single<Key> {
        let policy = policy.unwrap_or_else(|| self.write_policy());
        self.single(kind.as_str(), move |dispatcher, sink| {
            dispatcher.write(&policy, &key, kind, &bins, sink)
        })
    }

    /// Deletes one record. Resolves to the key whether or not the record
    /// existed.
    pub fn delete(
        &self,
        policy: Option<WritePolicy>,
        key: Key,
    ) -> Single<Key> {
        let policy = policy.unwrap_or_else(|| self.write_policy());
        self.single("delete", move |dispatcher, sink| {
            let deleted = key.clone();
            dispatcher.delete(&policy, &key, sink.adapt(move |_existed: bool| Some(deleted)))
        })
    }

    /// Resets the record's time to live. Fails with
    /// [`ResultCode::KeyNotFound`](crate::ResultCode::KeyNotFound) when the
    /// record is missing.
    pub fn touch(
        &self,
        policy: Option<WritePolicy>,
        key: Key,
    ) -> Single<Key> {
        let policy = policy.unwrap_or_else(|| self.write_policy());
        self.single("touch", move |dispatcher, sink| dispatcher.touch(&policy, &key, sink))
    }

    /// Resolves to the key when the record exists, completes empty otherwise
    pub fn exists(
        &self,
        policy: Option<ReadPolicy>,
        key: Key,
    ) -> Single<Key> {
        let policy = policy.unwrap_or_else(|| self.read_policy());
        self.single("exists", move |dispatcher, sink| {
            let found = key.clone();
            dispatcher.exists(&policy, &key, sink.adapt(move |exists: bool| exists.then_some(found)))
        })
    }

    /// Applies `ops` to one record in order and returns what the read
    /// operations produced
    pub fn operate(
        &self,
        policy: Option<WritePolicy>,
        key: Key,
        ops: Vec<Operation>,
    ) -> Single<KeyRecord> {
        let policy = policy.unwrap_or_else(|| self.write_policy());
        self.single("operate", move |dispatcher, sink| dispatcher.operate(&policy, &key, &ops, sink))
    }

    /// Runs a registered user defined function against one record
    pub fn execute(
        &self,
        policy: Option<WritePolicy>,
        key: Key,
        call: UdfCall,
    ) -> Single<KeyObject> {
        let policy = policy.unwrap_or_else(|| self.write_policy());
        self.single("execute_udf", move |dispatcher, sink| {
            let target = key.clone();
            let sink = sink.adapt(move |object: Option<Value>| Some(KeyObject { key: target, object }));
            dispatcher.execute_udf(&policy, &key, &call, sink)
        })
    }
}

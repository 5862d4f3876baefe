use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::errors::CommandError;
use crate::BatchDeletePolicy;
use crate::BatchWritePolicy;
use crate::Bin;
use crate::Filter;
use crate::GenerationPolicy;
use crate::Key;
use crate::KeyRecord;
use crate::Operation;
use crate::ReadMode;
use crate::Record;
use crate::RecordExistsAction;
use crate::ResultCode;
use crate::Value;
use crate::WriteKind;
use crate::WritePolicy;

pub(crate) type CmdResult<T> = std::result::Result<T, CommandError>;

/// Server side function: may rewrite the record's bins and return a value.
/// An error message fails the call with [`ResultCode::UdfFailure`].
pub type UdfFn =
    Arc<dyn Fn(&mut HashMap<String, Value>, &[Value]) -> std::result::Result<Option<Value>, String> + Send + Sync>;

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct StoredRecord {
    pub(crate) bins: HashMap<String, Value>,
    pub(crate) generation: u32,
    pub(crate) expires_at: Option<Instant>,
}

impl StoredRecord {
    fn empty() -> Self {
        Self {
            bins: HashMap::new(),
            generation: 0,
            expires_at: None,
        }
    }

    fn is_expired(
        &self,
        now: Instant,
    ) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }

    /// Remaining time to live in seconds, 0 when the record never expires
    fn ttl(
        &self,
        now: Instant,
    ) -> u32 {
        self.expires_at
            .map(|at| at.saturating_duration_since(now).as_secs().max(1) as u32)
            .unwrap_or(0)
    }

    fn project(
        &self,
        bins: &[String],
        now: Instant,
    ) -> Record {
        let selected = if bins.is_empty() {
            self.bins.clone()
        } else {
            bins.iter()
                .filter_map(|name| self.bins.get(name).map(|v| (name.clone(), v.clone())))
                .collect()
        };
        Record::new(selected, self.generation, self.ttl(now))
    }
}

/// Write attributes shared by single-record and batch writes
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub(crate) struct WriteSpec {
    pub(crate) record_exists_action: RecordExistsAction,
    pub(crate) generation_policy: GenerationPolicy,
    pub(crate) generation: u32,
    pub(crate) expiration: u32,
}

impl From<&WritePolicy> for WriteSpec {
    fn from(p: &WritePolicy) -> Self {
        Self {
            record_exists_action: p.record_exists_action,
            generation_policy: p.generation_policy,
            generation: p.generation,
            expiration: p.expiration,
        }
    }
}

impl From<&BatchWritePolicy> for WriteSpec {
    fn from(p: &BatchWritePolicy) -> Self {
        Self {
            record_exists_action: p.record_exists_action,
            generation_policy: p.generation_policy,
            generation: p.generation,
            expiration: p.expiration,
        }
    }
}

impl From<&BatchDeletePolicy> for WriteSpec {
    fn from(p: &BatchDeletePolicy) -> Self {
        Self {
            generation_policy: p.generation_policy,
            generation: p.generation,
            ..Self::default()
        }
    }
}

impl WriteSpec {
    fn check(
        &self,
        current: Option<&StoredRecord>,
    ) -> CmdResult<()> {
        match (self.record_exists_action, current) {
            (RecordExistsAction::UpdateOnly | RecordExistsAction::ReplaceOnly, None) => {
                return Err(CommandError::new(ResultCode::KeyNotFound, "record does not exist"));
            }
            (RecordExistsAction::CreateOnly, Some(_)) => {
                return Err(CommandError::new(ResultCode::KeyExists, "record already exists"));
            }
            _ => {}
        }
        self.check_generation(current)
    }

    fn check_generation(
        &self,
        current: Option<&StoredRecord>,
    ) -> CmdResult<()> {
        let Some(record) = current else {
            return Ok(());
        };
        let accepted = match self.generation_policy {
            GenerationPolicy::None => true,
            GenerationPolicy::ExpectGenEqual => record.generation == self.generation,
            GenerationPolicy::ExpectGenGreater => self.generation > record.generation,
        };
        if accepted {
            Ok(())
        } else {
            Err(CommandError::new(
                ResultCode::GenerationError,
                format!("stored generation {} rejected by policy", record.generation),
            ))
        }
    }

    fn expires_at(
        &self,
        now: Instant,
    ) -> Option<Instant> {
        (self.expiration > 0).then(|| now + Duration::from_secs(u64::from(self.expiration)))
    }
}

enum Change {
    Keep,
    Put(StoredRecord),
    Remove,
}

/// Records of every simulated node
#[derive(Default)]
pub(crate) struct RecordStore {
    records: DashMap<Key, StoredRecord>,
}

impl RecordStore {
    /// Runs `f` against the live record while holding the key's shard
    fn mutate<T>(
        &self,
        key: &Key,
        f: impl FnOnce(Option<&StoredRecord>, Instant) -> CmdResult<(Change, T)>,
    ) -> CmdResult<T> {
        let now = Instant::now();
        match self.records.entry(key.clone()) {
            Entry::Occupied(mut entry) => {
                let expired = entry.get().is_expired(now);
                let current = if expired { None } else { Some(entry.get()) };
                let (change, out) = f(current, now)?;
                match change {
                    Change::Put(record) => {
                        entry.insert(record);
                    }
                    Change::Remove => {
                        entry.remove();
                    }
                    Change::Keep if expired => {
                        entry.remove();
                    }
                    Change::Keep => {}
                }
                Ok(out)
            }
            Entry::Vacant(entry) => {
                let (change, out) = f(None, now)?;
                if let Change::Put(record) = change {
                    entry.insert(record);
                }
                Ok(out)
            }
        }
    }

    pub(crate) fn get(
        &self,
        key: &Key,
        mode: &ReadMode,
    ) -> CmdResult<Option<Record>> {
        if let ReadMode::Operations(ops) = mode {
            if ops.iter().any(Operation::is_write) {
                return Err(CommandError::new(
                    ResultCode::ParameterError,
                    "write operation in a read",
                ));
            }
            return self.operate(&WriteSpec::default(), key, ops);
        }

        let now = Instant::now();
        let Some(stored) = self.records.get(key).filter(|r| !r.is_expired(now)).map(|r| r.clone()) else {
            return Ok(None);
        };
        let record = match mode {
            ReadMode::AllBins => stored.project(&[], now),
            ReadMode::Bins(names) => stored.project(names, now),
            ReadMode::Header | ReadMode::Operations(_) => Record::header(stored.generation, stored.ttl(now)),
        };
        Ok(Some(record))
    }

    pub(crate) fn exists(
        &self,
        key: &Key,
    ) -> bool {
        let now = Instant::now();
        self.records.get(key).is_some_and(|r| !r.is_expired(now))
    }

    pub(crate) fn write(
        &self,
        spec: &WriteSpec,
        key: &Key,
        kind: WriteKind,
        bins: &[Bin],
    ) -> CmdResult<()> {
        let ops: Vec<Operation> = bins.iter().map(|bin| kind.into_operation(bin.clone())).collect();
        self.operate(spec, key, &ops).map(|_| ())
    }

    /// Returns whether the record existed
    pub(crate) fn delete(
        &self,
        spec: &WriteSpec,
        key: &Key,
    ) -> CmdResult<bool> {
        self.mutate(key, |current, _| {
            spec.check_generation(current)?;
            Ok(match current {
                Some(_) => (Change::Remove, true),
                None => (Change::Keep, false),
            })
        })
    }

    pub(crate) fn touch(
        &self,
        spec: &WriteSpec,
        key: &Key,
    ) -> CmdResult<()> {
        self.operate(spec, key, &[Operation::Touch]).map(|_| ())
    }

    /// Applies `ops` in order. Read-only operations against a missing
    /// record return `None`; anything else returns the bins read plus the
    /// record header after the writes.
    pub(crate) fn operate(
        &self,
        spec: &WriteSpec,
        key: &Key,
        ops: &[Operation],
    ) -> CmdResult<Option<Record>> {
        self.mutate(key, |current, now| apply_operations(current, spec, ops, now))
    }

    pub(crate) fn apply_udf(
        &self,
        spec: &WriteSpec,
        key: &Key,
        function: &UdfFn,
        args: &[Value],
    ) -> CmdResult<Option<Value>> {
        self.mutate(key, |current, now| {
            let mut bins = current.map(|r| r.bins.clone()).unwrap_or_default();
            let returned = function(&mut bins, args)
                .map_err(|message| CommandError::new(ResultCode::UdfFailure, message))?;

            let unchanged = current.map_or(bins.is_empty(), |r| r.bins == bins);
            if unchanged {
                return Ok((Change::Keep, returned));
            }
            spec.check(current)?;
            if bins.is_empty() {
                return Ok((Change::Remove, returned));
            }
            let record = StoredRecord {
                bins,
                generation: current.map_or(0, |r| r.generation).wrapping_add(1),
                expires_at: spec.expires_at(now),
            };
            Ok((Change::Put(record), returned))
        })
    }

    /// Live records of a namespace and optional set, with bins projected
    pub(crate) fn scan(
        &self,
        namespace: &str,
        set_name: Option<&str>,
        bins: &[String],
        filter: Option<&Filter>,
    ) -> Vec<KeyRecord> {
        let now = Instant::now();
        self.records
            .iter()
            .filter(|entry| {
                let key = entry.key();
                key.namespace == namespace
                    && set_name.map_or(true, |set| key.set_name() == Some(set))
                    && !entry.value().is_expired(now)
                    && filter.map_or(true, |f| matches_filter(&entry.value().bins, f))
            })
            .map(|entry| KeyRecord::new(entry.key().clone(), Some(entry.value().project(bins, now))))
            .collect()
    }

    pub(crate) fn namespaces(&self) -> Vec<String> {
        let mut namespaces: Vec<String> = self.records.iter().map(|e| e.key().namespace.clone()).collect();
        namespaces.sort_unstable();
        namespaces.dedup();
        namespaces
    }

    pub(crate) fn keys(&self) -> Vec<Key> {
        self.records.iter().map(|e| e.key().clone()).collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.records.len()
    }
}

fn matches_filter(
    bins: &HashMap<String, Value>,
    filter: &Filter,
) -> bool {
    match filter {
        Filter::Equal { bin, value } => bins.get(bin) == Some(value),
        Filter::Range { bin, begin, end } => bins
            .get(bin)
            .and_then(Value::as_int)
            .is_some_and(|v| (*begin..=*end).contains(&v)),
    }
}

fn apply_operations(
    current: Option<&StoredRecord>,
    spec: &WriteSpec,
    ops: &[Operation],
    now: Instant,
) -> CmdResult<(Change, Option<Record>)> {
    if !ops.iter().any(Operation::is_write) {
        let record = current.map(|stored| {
            let mut read = HashMap::new();
            for op in ops {
                collect_read(&stored.bins, op, &mut read);
            }
            Record::new(read, stored.generation, stored.ttl(now))
        });
        return Ok((Change::Keep, record));
    }

    spec.check(current)?;
    let mut working = match (current, spec.record_exists_action) {
        (Some(_), RecordExistsAction::Replace | RecordExistsAction::ReplaceOnly) => StoredRecord::empty(),
        (Some(stored), _) => stored.clone(),
        (None, _) => StoredRecord::empty(),
    };

    let mut read = HashMap::new();
    for op in ops {
        match op {
            Operation::Get(_) | Operation::GetHeader => collect_read(&working.bins, op, &mut read),
            Operation::Put(bin) => {
                if bin.value.is_nil() {
                    working.bins.remove(&bin.name);
                } else {
                    working.bins.insert(bin.name.clone(), bin.value.clone());
                }
            }
            Operation::Append(bin) => concat(&mut working.bins, bin, false)?,
            Operation::Prepend(bin) => concat(&mut working.bins, bin, true)?,
            Operation::Add(bin) => add(&mut working.bins, bin)?,
            Operation::Touch => {
                if current.is_none() {
                    return Err(CommandError::new(ResultCode::KeyNotFound, "cannot touch a missing record"));
                }
            }
            Operation::Delete => working.bins.clear(),
        }
    }

    working.generation = current.map_or(0, |r| r.generation).wrapping_add(1);
    working.expires_at = spec.expires_at(now);
    let record = Record::new(read, working.generation, working.ttl(now));
    if working.bins.is_empty() {
        return Ok((Change::Remove, Some(record)));
    }
    Ok((Change::Put(working), Some(record)))
}

fn collect_read(
    bins: &HashMap<String, Value>,
    op: &Operation,
    read: &mut HashMap<String, Value>,
) {
    match op {
        Operation::Get(None) => read.extend(bins.iter().map(|(k, v)| (k.clone(), v.clone()))),
        Operation::Get(Some(name)) => {
            if let Some(value) = bins.get(name) {
                read.insert(name.clone(), value.clone());
            }
        }
        _ => {}
    }
}

fn concat(
    bins: &mut HashMap<String, Value>,
    bin: &Bin,
    front: bool,
) -> CmdResult<()> {
    let merged = match (bins.get(&bin.name), &bin.value) {
        (None, value) => value.clone(),
        (Some(Value::String(old)), Value::String(new)) => {
            Value::String(if front { format!("{new}{old}") } else { format!("{old}{new}") })
        }
        (Some(Value::Blob(old)), Value::Blob(new)) => {
            let (head, tail) = if front { (new, old) } else { (old, new) };
            Value::Blob(head.iter().chain(tail).copied().collect())
        }
        _ => {
            return Err(CommandError::new(
                ResultCode::BinTypeError,
                format!("bin {} does not hold a string or blob", bin.name),
            ))
        }
    };
    bins.insert(bin.name.clone(), merged);
    Ok(())
}

fn add(
    bins: &mut HashMap<String, Value>,
    bin: &Bin,
) -> CmdResult<()> {
    let sum = match (bins.get(&bin.name), &bin.value) {
        (None, Value::Int(_) | Value::Float(_)) => bin.value.clone(),
        (Some(Value::Int(old)), Value::Int(delta)) => Value::Int(old.wrapping_add(*delta)),
        (Some(Value::Float(old)), Value::Float(delta)) => Value::Float(old + delta),
        _ => {
            return Err(CommandError::new(
                ResultCode::BinTypeError,
                format!("bin {} is not numeric", bin.name),
            ))
        }
    };
    bins.insert(bin.name.clone(), sum);
    Ok(())
}

//! In-memory ordered store with OCC transactions
//!
//! The reference implementation of the adapter contract. Data lives in a
//! `BTreeMap` of byte keys to versioned values behind a `RwLock`; each
//! transaction clones the committed view at begin (snapshot isolation by
//! deep copy), buffers its writes, and validates its read set at commit
//! under the store lock (first-committer-wins).
//!
//! # What the snapshot ALWAYS provides
//!
//! - Committed data as of the transaction's read version
//! - Repeatable reads: the same key returns the same value
//!
//! # What the snapshot NEVER shows
//!
//! - Writes committed after the read version
//! - Other transactions' uncommitted writes
//!
//! Atomic mutations are the exception to snapshot semantics on the write
//! side: they are replayed against the *committed* value at commit time,
//! so concurrent increments merge instead of conflicting. Reads of a key
//! with pending atomic ops see the op applied to the snapshot value,
//! which is the read-your-writes approximation of the final outcome.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::Ordering as AtomicOrdering;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

use facet_core::{Error, Result};

use crate::adapter::{
    AtomicOp, CommitMeta, KeyRange, KvPair, KvTransaction, RangeOptions, TransactionOptions,
};

/// Retry budget for [`MemoryDatabase::run`]
const MAX_RETRIES: u32 = 10;

#[derive(Debug, Clone)]
struct Versioned {
    /// `None` is a tombstone: the key was cleared at `version`
    value: Option<Vec<u8>>,
    version: u64,
}

#[derive(Debug, Default)]
struct StoreInner {
    data: BTreeMap<Vec<u8>, Versioned>,
    version: u64,
    /// (version, wall clock) samples taken at each commit, ascending
    time_samples: Vec<(u64, DateTime<Utc>)>,
}

/// An ordered in-memory store with optimistic transactions
#[derive(Debug, Default, Clone)]
pub struct MemoryDatabase {
    inner: Arc<RwLock<StoreInner>>,
}

impl MemoryDatabase {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin a transaction with default options
    pub fn begin(&self) -> MemoryTransaction {
        self.begin_with_options(TransactionOptions::default())
    }

    /// Begin a transaction with explicit options
    pub fn begin_with_options(&self, options: TransactionOptions) -> MemoryTransaction {
        let inner = self.inner.read();
        let snapshot = inner
            .data
            .iter()
            .filter_map(|(k, v)| v.value.clone().map(|value| (k.clone(), value)))
            .collect();
        MemoryTransaction {
            store: Arc::clone(&self.inner),
            read_version: inner.version,
            snapshot,
            overlay: BTreeMap::new(),
            cleared: Vec::new(),
            versionstamped: Vec::new(),
            read_keys: BTreeSet::new(),
            read_ranges: Vec::new(),
            options,
            started: Instant::now(),
        }
    }

    /// Run `f` in a transaction, retrying on retryable failures
    ///
    /// The closure is replayed from the top on every retry, so it must be
    /// deterministic given the snapshot it reads; this matches the
    /// maintainer contract of the kernel.
    ///
    /// # Errors
    ///
    /// Returns the closure's error unchanged when it is not retryable, or
    /// the last retryable error once the retry budget is exhausted.
    pub fn run<T>(&self, mut f: impl FnMut(&mut MemoryTransaction) -> Result<T>) -> Result<T> {
        let mut attempt = 0u32;
        loop {
            let mut tx = self.begin();
            let outcome = f(&mut tx).and_then(|value| tx.commit().map(|_| value));
            match outcome {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < MAX_RETRIES => {
                    warn!(target: "facet::kv", attempt, error = %e, "retrying transaction");
                    thread::sleep(backoff_delay(attempt));
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// The highest committed version
    pub fn current_version(&self) -> u64 {
        self.inner.read().version
    }

    /// Approximate wall-clock time at which `version` committed
    ///
    /// Returns the sample of the greatest commit at or before `version`,
    /// or `None` when `version` predates every sample.
    pub fn approximate_time_of_version(&self, version: u64) -> Option<DateTime<Utc>> {
        let inner = self.inner.read();
        let idx = inner
            .time_samples
            .partition_point(|(v, _)| *v <= version);
        idx.checked_sub(1).map(|i| inner.time_samples[i].1)
    }

    /// Rewrite the wall-clock sample of `version`; test support only
    pub fn backdate_version_for_testing(&self, version: u64, at: DateTime<Utc>) {
        let mut inner = self.inner.write();
        for sample in inner.time_samples.iter_mut() {
            if sample.0 == version {
                sample.1 = at;
            }
        }
    }
}

fn backoff_delay(attempt: u32) -> Duration {
    let millis = (1u64 << attempt.min(7)).min(100);
    Duration::from_millis(millis)
}

/// Buffered effect on a single key
#[derive(Debug, Clone)]
enum Overlay {
    Set(Vec<u8>),
    Clear,
    Atomic(Vec<(AtomicOp, Vec<u8>)>),
}

/// A live transaction against a [`MemoryDatabase`]
#[derive(Debug)]
pub struct MemoryTransaction {
    store: Arc<RwLock<StoreInner>>,
    read_version: u64,
    snapshot: BTreeMap<Vec<u8>, Vec<u8>>,
    overlay: BTreeMap<Vec<u8>, Overlay>,
    cleared: Vec<KeyRange>,
    /// Versionstamped ops in submission order: (op, key operand, value operand)
    versionstamped: Vec<(AtomicOp, Vec<u8>, Vec<u8>)>,
    read_keys: BTreeSet<Vec<u8>>,
    read_ranges: Vec<KeyRange>,
    options: TransactionOptions,
    started: Instant,
}

impl MemoryTransaction {
    fn check_liveness(&self) -> Result<()> {
        if let Some(cancel) = &self.options.cancel {
            if cancel.load(AtomicOrdering::Relaxed) {
                return Err(Error::Cancelled);
            }
        }
        if let Some(timeout) = self.options.timeout {
            if self.started.elapsed() > timeout {
                return Err(Error::Timeout);
            }
        }
        Ok(())
    }

    /// Committed value as of the snapshot, honoring cleared ranges
    fn base_value(&self, key: &[u8]) -> Option<&Vec<u8>> {
        if self.cleared.iter().any(|r| r.contains(key)) {
            None
        } else {
            self.snapshot.get(key)
        }
    }

    /// Read-your-writes view of `key`
    fn resolve(&self, key: &[u8]) -> Option<Vec<u8>> {
        match self.overlay.get(key) {
            Some(Overlay::Set(v)) => Some(v.clone()),
            Some(Overlay::Clear) => None,
            Some(Overlay::Atomic(ops)) => {
                let mut value = self.base_value(key).cloned();
                for (op, param) in ops {
                    value = Some(apply_atomic(value.as_deref(), *op, param));
                }
                value
            }
            None => self.base_value(key).cloned(),
        }
    }

    /// Commit the transaction, validating the read set
    ///
    /// # Errors
    ///
    /// Returns `Retryable` when a key or range this transaction read was
    /// modified by a commit after its read version.
    pub fn commit(self) -> Result<CommitMeta> {
        self.check_liveness()?;
        let mut inner = self.store.write();

        for key in &self.read_keys {
            if let Some(existing) = inner.data.get(key) {
                if existing.version > self.read_version {
                    trace!(target: "facet::kv", "read conflict on point read");
                    return Err(Error::Retryable("read conflict".into()));
                }
            }
        }
        for range in &self.read_ranges {
            let conflict = inner
                .data
                .range(range.begin.clone()..range.end.clone())
                .any(|(_, v)| v.version > self.read_version);
            if conflict {
                trace!(target: "facet::kv", "read conflict on range read");
                return Err(Error::Retryable("read conflict".into()));
            }
        }

        let version = inner.version + 1;

        for range in &self.cleared {
            let doomed: Vec<Vec<u8>> = inner
                .data
                .range(range.begin.clone()..range.end.clone())
                .filter(|(_, v)| v.value.is_some())
                .map(|(k, _)| k.clone())
                .collect();
            for key in doomed {
                inner.data.insert(
                    key,
                    Versioned {
                        value: None,
                        version,
                    },
                );
            }
        }

        let mut writes = 0usize;
        for (key, overlay) in self.overlay {
            let entry = match overlay {
                Overlay::Set(v) => Versioned {
                    value: Some(v),
                    version,
                },
                Overlay::Clear => Versioned {
                    value: None,
                    version,
                },
                Overlay::Atomic(ops) => {
                    let mut value = inner.data.get(&key).and_then(|v| v.value.clone());
                    for (op, param) in &ops {
                        value = Some(apply_atomic(value.as_deref(), *op, param));
                    }
                    Versioned {
                        value,
                        version,
                    }
                }
            };
            writes += 1;
            inner.data.insert(key, entry);
        }

        for (op, key_operand, value_operand) in self.versionstamped {
            match op {
                AtomicOp::SetVersionstampedKey => {
                    let (mut key, offset) = split_stamp_operand(&key_operand)?;
                    splice_version(&mut key, offset, version)?;
                    writes += 1;
                    inner.data.insert(
                        key,
                        Versioned {
                            value: Some(value_operand),
                            version,
                        },
                    );
                }
                AtomicOp::SetVersionstampedValue => {
                    let (mut value, offset) = split_stamp_operand(&value_operand)?;
                    splice_version(&mut value, offset, version)?;
                    writes += 1;
                    inner.data.insert(
                        key_operand,
                        Versioned {
                            value: Some(value),
                            version,
                        },
                    );
                }
                _ => unreachable!("only versionstamped ops are deferred"),
            }
        }

        inner.version = version;
        let now = Utc::now();
        inner.time_samples.push((version, now));
        debug!(target: "facet::kv", version, writes, "transaction committed");
        Ok(CommitMeta { version })
    }

    /// Abandon the transaction without committing
    pub fn cancel(self) {
        drop(self);
    }
}

impl KvTransaction for MemoryTransaction {
    fn get(&mut self, key: &[u8], snapshot: bool) -> Result<Option<Vec<u8>>> {
        self.check_liveness()?;
        if !snapshot {
            self.read_keys.insert(key.to_vec());
        }
        Ok(self.resolve(key))
    }

    fn get_range(&mut self, range: &KeyRange, options: &RangeOptions) -> Result<Vec<KvPair>> {
        self.check_liveness()?;
        if range.is_empty() {
            return Ok(Vec::new());
        }
        if !options.snapshot {
            self.read_ranges.push(range.clone());
        }

        // Merge the snapshot with buffered effects into one ordered view.
        let mut merged: BTreeMap<Vec<u8>, Vec<u8>> = self
            .snapshot
            .range(range.begin.clone()..range.end.clone())
            .filter(|(k, _)| !self.cleared.iter().any(|r| r.contains(k)))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        for (key, overlay) in self.overlay.range(range.begin.clone()..range.end.clone()) {
            match overlay {
                Overlay::Set(v) => {
                    merged.insert(key.clone(), v.clone());
                }
                Overlay::Clear => {
                    merged.remove(key);
                }
                Overlay::Atomic(ops) => {
                    let mut value = self.base_value(key).cloned();
                    for (op, param) in ops {
                        value = Some(apply_atomic(value.as_deref(), *op, param));
                    }
                    if let Some(v) = value {
                        merged.insert(key.clone(), v);
                    }
                }
            }
        }

        let limit = options.limit.unwrap_or(usize::MAX);
        let pairs: Vec<KvPair> = if options.reverse {
            merged.into_iter().rev().take(limit).collect()
        } else {
            merged.into_iter().take(limit).collect()
        };
        Ok(pairs)
    }

    fn set(&mut self, key: &[u8], value: &[u8]) {
        self.overlay
            .insert(key.to_vec(), Overlay::Set(value.to_vec()));
    }

    fn clear(&mut self, key: &[u8]) {
        self.overlay.insert(key.to_vec(), Overlay::Clear);
    }

    fn clear_range(&mut self, range: &KeyRange) {
        if range.is_empty() {
            return;
        }
        let doomed: Vec<Vec<u8>> = self
            .overlay
            .range(range.begin.clone()..range.end.clone())
            .map(|(k, _)| k.clone())
            .collect();
        for key in doomed {
            self.overlay.remove(&key);
        }
        self.cleared.push(range.clone());
    }

    fn atomic_op(&mut self, key: &[u8], param: &[u8], op: AtomicOp) {
        match op {
            AtomicOp::SetVersionstampedKey => {
                self.versionstamped
                    .push((op, key.to_vec(), param.to_vec()));
            }
            AtomicOp::SetVersionstampedValue => {
                self.versionstamped
                    .push((op, key.to_vec(), param.to_vec()));
            }
            _ => match self.overlay.get_mut(key) {
                Some(Overlay::Set(v)) => {
                    let updated = apply_atomic(Some(v.as_slice()), op, param);
                    *v = updated;
                }
                Some(Overlay::Clear) => {
                    let value = apply_atomic(None, op, param);
                    self.overlay.insert(key.to_vec(), Overlay::Set(value));
                }
                Some(Overlay::Atomic(ops)) => {
                    ops.push((op, param.to_vec()));
                }
                None => {
                    self.overlay
                        .insert(key.to_vec(), Overlay::Atomic(vec![(op, param.to_vec())]));
                }
            },
        }
    }

    fn read_version(&mut self) -> Result<u64> {
        Ok(self.read_version)
    }

    fn approximate_time_for_version(
        &mut self,
        version: u64,
    ) -> Result<Option<DateTime<Utc>>> {
        let inner = self.store.read();
        let idx = inner.time_samples.partition_point(|(v, _)| *v <= version);
        Ok(idx.checked_sub(1).map(|i| inner.time_samples[i].1))
    }
}

/// Split a versionstamped operand into its template and 4-byte LE offset
fn split_stamp_operand(operand: &[u8]) -> Result<(Vec<u8>, usize)> {
    if operand.len() < 4 {
        return Err(Error::InvalidStructure(
            "versionstamped operand shorter than its offset suffix".into(),
        ));
    }
    let (template, suffix) = operand.split_at(operand.len() - 4);
    let offset = u32::from_le_bytes(suffix.try_into().unwrap()) as usize;
    Ok((template.to_vec(), offset))
}

/// Overwrite the 8-byte version prefix of the placeholder at `offset`
fn splice_version(template: &mut [u8], offset: usize, version: u64) -> Result<()> {
    let end = offset
        .checked_add(8)
        .filter(|end| *end <= template.len())
        .ok_or_else(|| {
            Error::InvalidStructure("versionstamp offset outside its template".into())
        })?;
    template[offset..end].copy_from_slice(&version.to_be_bytes());
    Ok(())
}

/// Apply one atomic mutation to an optional existing value
///
/// A missing existing value stores the operand unchanged; this matches
/// treating the absent value as all-zero for `Add` and as "no competitor"
/// for `Min`/`Max`.
fn apply_atomic(existing: Option<&[u8]>, op: AtomicOp, param: &[u8]) -> Vec<u8> {
    let existing = match existing {
        Some(v) => v,
        None => return param.to_vec(),
    };
    match op {
        AtomicOp::Add => {
            let mut out = vec![0u8; param.len()];
            let mut carry = 0u16;
            for i in 0..param.len() {
                let sum =
                    param[i] as u16 + existing.get(i).copied().unwrap_or(0) as u16 + carry;
                out[i] = sum as u8;
                carry = sum >> 8;
            }
            out
        }
        AtomicOp::Min | AtomicOp::Max => {
            let ext = normalize_width(existing, param.len());
            let param_wins = match unsigned_le_cmp(param, &ext) {
                std::cmp::Ordering::Less => op == AtomicOp::Min,
                std::cmp::Ordering::Greater => op == AtomicOp::Max,
                std::cmp::Ordering::Equal => false,
            };
            if param_wins {
                param.to_vec()
            } else {
                ext
            }
        }
        AtomicOp::BitOr => {
            let mut out = normalize_width(existing, param.len());
            for (o, p) in out.iter_mut().zip(param) {
                *o |= p;
            }
            out
        }
        AtomicOp::BitAnd => {
            let mut out = normalize_width(existing, param.len());
            for (o, p) in out.iter_mut().zip(param) {
                *o &= p;
            }
            out
        }
        AtomicOp::SetVersionstampedKey | AtomicOp::SetVersionstampedValue => {
            unreachable!("versionstamped ops are applied at commit")
        }
    }
}

/// Truncate or zero-extend to `width` bytes
fn normalize_width(value: &[u8], width: usize) -> Vec<u8> {
    let mut out = value.to_vec();
    out.resize(width, 0);
    out
}

/// Compare two equal-width little-endian unsigned integers
fn unsigned_le_cmp(a: &[u8], b: &[u8]) -> std::cmp::Ordering {
    debug_assert_eq!(a.len(), b.len());
    for (x, y) in a.iter().rev().zip(b.iter().rev()) {
        match x.cmp(y) {
            std::cmp::Ordering::Equal => continue,
            ord => return ord,
        }
    }
    std::cmp::Ordering::Equal
}

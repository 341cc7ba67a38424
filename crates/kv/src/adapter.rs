//! The KV adapter contract
//!
//! Maintainers and readers consume this trait and nothing else from the
//! backing store. The surface is deliberately close to the common core of
//! ordered transactional stores: point and range reads against a fixed
//! snapshot, buffered blind writes, and commutative atomic mutations that
//! are applied to the committed value at commit time and therefore never
//! produce read conflicts.
//!
//! # Atomic operand encoding
//!
//! `Add`, `Min` and `Max` operate on 8-byte little-endian operands; `Add`
//! is two's-complement wrapping addition, `Min`/`Max` compare as unsigned
//! integers. `BitOr`/`BitAnd` are bytewise with zero-extension of the
//! shorter operand. A missing existing value behaves as absent: the
//! operand is stored as-is.
//!
//! # Versionstamped operations
//!
//! `SetVersionstampedKey` and `SetVersionstampedValue` carry a 4-byte
//! little-endian offset appended to the key (respectively value) operand;
//! at commit the store overwrites the 8 bytes at that offset with the
//! big-endian commit version, completing the 10-byte versionstamp whose
//! 2-byte user-order suffix the caller supplied in the template.

use chrono::{DateTime, Utc};
use facet_core::Result;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

/// A decoded key/value pair
pub type KvPair = (Vec<u8>, Vec<u8>);

/// Half-open byte interval `[begin, end)`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyRange {
    /// Inclusive lower bound
    pub begin: Vec<u8>,
    /// Exclusive upper bound
    pub end: Vec<u8>,
}

impl KeyRange {
    /// Create a range from explicit bounds
    pub fn new(begin: impl Into<Vec<u8>>, end: impl Into<Vec<u8>>) -> Self {
        Self {
            begin: begin.into(),
            end: end.into(),
        }
    }

    /// Whether `key` lies inside the range
    pub fn contains(&self, key: &[u8]) -> bool {
        self.begin.as_slice() <= key && key < self.end.as_slice()
    }

    /// Whether the range is empty
    pub fn is_empty(&self) -> bool {
        self.begin >= self.end
    }
}

/// Options for a range read
#[derive(Debug, Clone, Default)]
pub struct RangeOptions {
    /// Maximum number of pairs to return; unbounded when `None`
    pub limit: Option<usize>,
    /// Iterate from the end of the range toward the beginning
    pub reverse: bool,
    /// Read without adding the range to the conflict set
    pub snapshot: bool,
}

impl RangeOptions {
    /// Forward scan returning at most `limit` pairs
    pub fn limited(limit: usize) -> Self {
        Self {
            limit: Some(limit),
            ..Self::default()
        }
    }

    /// Reverse scan returning at most `limit` pairs
    pub fn reverse_limited(limit: usize) -> Self {
        Self {
            limit: Some(limit),
            reverse: true,
            ..Self::default()
        }
    }

    /// Mark this read as a snapshot read (no conflict range)
    pub fn snapshot(mut self) -> Self {
        self.snapshot = true;
        self
    }
}

/// Commutative mutations applied to the committed value at commit time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AtomicOp {
    /// Little-endian two's-complement wrapping addition
    Add,
    /// Unsigned little-endian minimum
    Min,
    /// Unsigned little-endian maximum
    Max,
    /// Bytewise OR, zero-extended
    BitOr,
    /// Bytewise AND, zero-extended
    BitAnd,
    /// Complete the versionstamp placeholder inside the key
    SetVersionstampedKey,
    /// Complete the versionstamp placeholder inside the value
    SetVersionstampedValue,
}

/// Per-transaction options
#[derive(Debug, Clone, Default)]
pub struct TransactionOptions {
    /// Abort with `Timeout` once this much wall-clock time has elapsed
    pub timeout: Option<Duration>,
    /// Cooperative cancellation flag observed at every operation
    pub cancel: Option<Arc<AtomicBool>>,
}

/// Outcome of a successful commit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommitMeta {
    /// The monotonic version assigned to every write in the transaction
    pub version: u64,
}

/// A live transaction against the backing store
///
/// All kernel writes flow through one of these; nothing escapes the
/// transaction until the caller commits it. Implementations provide
/// serializable snapshot isolation with optimistic validation: reads are
/// repeatable against the transaction's snapshot, and a conflicting
/// commit surfaces as a retryable error from the commit call.
pub trait KvTransaction {
    /// Read the value at `key`, if any
    ///
    /// `snapshot` reads do not add the key to the conflict set.
    ///
    /// # Errors
    ///
    /// Propagates store failures, `Timeout` and `Cancelled`.
    fn get(&mut self, key: &[u8], snapshot: bool) -> Result<Option<Vec<u8>>>;

    /// Read key/value pairs inside `range`, in key order
    ///
    /// # Errors
    ///
    /// Propagates store failures, `Timeout` and `Cancelled`.
    fn get_range(&mut self, range: &KeyRange, options: &RangeOptions) -> Result<Vec<KvPair>>;

    /// Buffer a blind write of `value` at `key`
    fn set(&mut self, key: &[u8], value: &[u8]);

    /// Buffer removal of `key`
    fn clear(&mut self, key: &[u8]);

    /// Buffer removal of every key inside `range`
    fn clear_range(&mut self, range: &KeyRange);

    /// Buffer an atomic mutation (see module docs for operand encodings)
    fn atomic_op(&mut self, key: &[u8], param: &[u8], op: AtomicOp);

    /// The snapshot version this transaction reads at
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    fn read_version(&mut self) -> Result<u64>;

    /// Approximate wall-clock time at which `version` committed
    ///
    /// Backed by the store's version-to-time mapping; `None` when the
    /// version predates every sample the store retains.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    fn approximate_time_for_version(&mut self, version: u64)
        -> Result<Option<DateTime<Utc>>>;
}

/// Build the key operand for [`AtomicOp::SetVersionstampedKey`]
///
/// `template` must contain a 10-byte incomplete versionstamp starting at
/// `offset`; the returned operand appends the offset in the trailing
/// 4-byte little-endian form the contract requires.
pub fn versionstamped_key_param(template: &[u8], offset: u32) -> Vec<u8> {
    let mut param = template.to_vec();
    param.extend_from_slice(&offset.to_le_bytes());
    param
}

/// Build the value operand for [`AtomicOp::SetVersionstampedValue`]
pub fn versionstamped_value_param(template: &[u8], offset: u32) -> Vec<u8> {
    versionstamped_key_param(template, offset)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_range_membership() {
        let r = KeyRange::new(vec![1u8], vec![3u8]);
        assert!(r.contains(&[1]));
        assert!(r.contains(&[2, 200]));
        assert!(!r.contains(&[3]));
        assert!(!r.contains(&[0]));
        assert!(!r.is_empty());
        assert!(KeyRange::new(vec![3u8], vec![3u8]).is_empty());
    }

    #[test]
    fn versionstamped_param_appends_offset() {
        let param = versionstamped_key_param(&[0xAA, 0xBB], 1);
        assert_eq!(param, vec![0xAA, 0xBB, 1, 0, 0, 0]);
    }
}

//! Tracked uniqueness violations
//!
//! In `track` mode a duplicate indexed value does not fail the write;
//! the maintainer records the violation under
//! `/I/<name>/_violations/<value>/<pk>` and succeeds. Operators drain the
//! subspace out of band.

use serde::{Deserialize, Serialize};

use facet_core::{Error, Result, Subspace, Tuple};
use facet_kv::{KeyRange, KvTransaction, RangeOptions};

/// One persisted uniqueness violation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViolationRecord {
    /// Index that detected the duplicate
    pub index_name: String,
    /// Entity of the record that collided
    pub entity_name: String,
    /// Read version at which the duplicate was observed
    pub detected_at: u64,
}

/// Persist a violation for `value`/`pk` under the violations subspace
///
/// # Errors
///
/// `Serialization` when the record cannot be encoded; KV errors propagate.
pub fn record_violation(
    tx: &mut dyn KvTransaction,
    violations: &Subspace,
    value: &Tuple,
    pk: &Tuple,
    record: &ViolationRecord,
) -> Result<()> {
    let key = violations.subspace(value).pack(pk);
    let doc = serde_json::to_vec(record).map_err(|e| Error::Serialization(e.to_string()))?;
    tx.set(&key, &doc);
    Ok(())
}

/// List every tracked violation under `violations`
///
/// Returns `(value-and-pk tuple, record)` pairs in value order.
///
/// # Errors
///
/// KV and decode errors propagate.
pub fn list_violations(
    tx: &mut dyn KvTransaction,
    violations: &Subspace,
) -> Result<Vec<(Tuple, ViolationRecord)>> {
    let (begin, end) = violations.range();
    let pairs = tx.get_range(&KeyRange::new(begin, end), &RangeOptions::default())?;
    let mut out = Vec::with_capacity(pairs.len());
    for (key, value) in pairs {
        let tuple = violations.unpack(&key)?;
        let record: ViolationRecord =
            serde_json::from_slice(&value).map_err(|e| Error::Serialization(e.to_string()))?;
        out.push((tuple, record));
    }
    Ok(out)
}

/// Drop the tracked violation for `value`/`pk`, if any
pub fn clear_violation(
    tx: &mut dyn KvTransaction,
    violations: &Subspace,
    value: &Tuple,
    pk: &Tuple,
) {
    let key = violations.subspace(value).pack(pk);
    tx.clear(&key);
}

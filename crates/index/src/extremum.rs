//! Grouped min / max indexes with the deletion tie-break protocol
//!
//! The extremum itself lives in an atomic slot:
//!
//! ```text
//! <group> + "m"  ->  order-preserving u64, little-endian
//! ```
//!
//! maintained with atomic `Min`/`Max`, which commute and never conflict.
//! Deletion cannot be expressed atomically, so the maintainer shadows
//! every member value:
//!
//! ```text
//! <group> + "v" + <encodedValue> + <PK>  ->  ""
//! ```
//!
//! On delete it clears the marker; when the departing value equals the
//! current extremum it recomputes the slot from a single bounded scan of
//! the value set (ascending for min, descending for max, limit 1) and
//! clears the slot when the set empties.

use tracing::trace;

use facet_catalog::{IndexDescriptor, KeyExpression, RecordView, ValueTypeTag};
use facet_core::{Error, Result, Subspace, Tuple, TupleValue};
use facet_kv::{AtomicOp, KeyRange, KvTransaction, RangeOptions};

use crate::codec::{decode_extremum, extremum_operand_component};
use crate::maintainer::IndexMaintainer;

/// Whether the index tracks the minimum or the maximum
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtremumKind {
    /// Track the smallest value per group
    Min,
    /// Track the largest value per group
    Max,
}

/// Maintainer and read path for grouped min / max
#[derive(Debug, Clone)]
pub struct ExtremumIndex {
    name: String,
    subspace: Subspace,
    expression: KeyExpression,
    kind: ExtremumKind,
    tag: ValueTypeTag,
}

impl ExtremumIndex {
    /// Build from a min/max descriptor
    pub fn for_descriptor(
        descriptor: &IndexDescriptor,
        kind: ExtremumKind,
        tag: ValueTypeTag,
    ) -> Self {
        Self {
            name: descriptor.name.clone(),
            subspace: descriptor.subspace(),
            expression: descriptor.key_expression.clone(),
            kind,
            tag,
        }
    }

    fn slot_key(&self, group: &Tuple) -> Vec<u8> {
        self.subspace.subspace(group).pack(&Tuple::new().with("m"))
    }

    fn value_set(&self, group: &Tuple) -> Subspace {
        self.subspace.subspace(group).child("v")
    }

    fn marker_key(&self, group: &Tuple, ordered: u64, pk: &Tuple) -> Vec<u8> {
        self.value_set(group).pack(
            &Tuple::new()
                .with(ordered.to_be_bytes().to_vec())
                .concat(pk.clone()),
        )
    }

    /// Split produced tuples into `(group, ordered value)` pairs
    fn split(&self, record: &RecordView) -> Result<Vec<(Tuple, u64)>> {
        let tuples = self.expression.evaluate(record)?;
        let mut out = Vec::with_capacity(tuples.len());
        for tuple in tuples {
            let mut values = tuple.into_values();
            let component = values.pop().ok_or_else(|| {
                Error::InvalidStructure(
                    "extremum key expression produced no value component".into(),
                )
            })?;
            let ordered = extremum_operand_component(self.tag, &component)?;
            out.push((Tuple::from_values(values), ordered));
        }
        Ok(out)
    }

    fn insert(&self, tx: &mut dyn KvTransaction, record: &RecordView) -> Result<()> {
        for (group, ordered) in self.split(record)? {
            tx.set(&self.marker_key(&group, ordered, record.primary_key()), b"");
            let op = match self.kind {
                ExtremumKind::Min => AtomicOp::Min,
                ExtremumKind::Max => AtomicOp::Max,
            };
            tx.atomic_op(&self.slot_key(&group), &ordered.to_le_bytes(), op);
        }
        Ok(())
    }

    fn remove(&self, tx: &mut dyn KvTransaction, record: &RecordView) -> Result<()> {
        for (group, ordered) in self.split(record)? {
            tx.clear(&self.marker_key(&group, ordered, record.primary_key()));

            let slot_key = self.slot_key(&group);
            let current = match tx.get(&slot_key, false)? {
                Some(raw) => crate::codec::read_i64_le(&raw) as u64,
                None => continue,
            };
            if current != ordered {
                continue;
            }

            // The departing value was the extremum; recompute from the
            // surviving value set with one bounded scan.
            let (begin, end) = self.value_set(&group).range();
            let options = match self.kind {
                ExtremumKind::Min => RangeOptions::limited(1),
                ExtremumKind::Max => RangeOptions::reverse_limited(1),
            };
            let survivors = tx.get_range(&KeyRange::new(begin, end), &options)?;
            match survivors.first() {
                Some((key, _)) => {
                    let entry = self.value_set(&group).unpack(key)?;
                    let replacement = match entry.get(0) {
                        Some(TupleValue::Bytes(raw)) if raw.len() == 8 => {
                            u64::from_be_bytes(raw.as_slice().try_into().unwrap())
                        }
                        _ => {
                            return Err(Error::InvalidStructure(format!(
                                "index '{}': malformed value-set entry",
                                self.name
                            )))
                        }
                    };
                    trace!(
                        target: "facet::index",
                        index = %self.name,
                        "extremum recomputed after delete"
                    );
                    tx.set(&slot_key, &replacement.to_le_bytes());
                }
                None => {
                    tx.clear(&slot_key);
                }
            }
        }
        Ok(())
    }

    /// The maintained extremum for `group` in the declared type's domain
    ///
    /// # Errors
    ///
    /// KV errors propagate.
    pub fn extremum(&self, tx: &mut dyn KvTransaction, group: &Tuple) -> Result<Option<f64>> {
        let raw = tx.get(&self.slot_key(group), false)?;
        Ok(raw.map(|r| decode_extremum(self.tag, crate::codec::read_i64_le(&r) as u64)))
    }
}

impl IndexMaintainer for ExtremumIndex {
    fn update(
        &self,
        tx: &mut dyn KvTransaction,
        old: Option<&RecordView>,
        new: Option<&RecordView>,
    ) -> Result<()> {
        if let (Some(old), Some(new)) = (old, new) {
            let touched: Vec<&str> = self.expression.touched_fields().into_iter().collect();
            if old.fields_equal(new, &touched) {
                return Ok(());
            }
        }
        if let Some(record) = old {
            self.remove(tx, record)?;
        }
        if let Some(record) = new {
            self.insert(tx, record)?;
        }
        Ok(())
    }
}

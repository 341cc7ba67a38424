//! Grouped count / sum / average indexes
//!
//! Keys are `<indexSubspace> + pack(groupFields) + pack(aggSlot)`:
//!
//! - count: slot `"c"`, atomic `Add` ±1
//! - sum: slot `"s"`, atomic `Add` ±value in the declared type's additive
//!   encoding (integers exact, floats scaled fixed-point)
//! - average: both slots; the reader computes `s / c` as a 64-bit float,
//!   so integer sums stay exact and only the quotient is floating-point
//!
//! The key expression's convention: for `Count` every produced component
//! is a group field; for `Sum`/`Average` the last component is the
//! aggregated value and the preceding components are the group. All
//! deltas from one `update` land in the caller's single transaction.

use facet_catalog::{IndexDescriptor, KeyExpression, RecordView, ValueTypeTag};
use facet_core::{Error, Result, Subspace, Tuple};
use facet_kv::{AtomicOp, KvTransaction};

use crate::codec::{additive_operand_component, decode_additive_slot, read_i64_le};
use crate::maintainer::IndexMaintainer;

/// Which aggregation an [`AggregateIndex`] maintains
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AggregateKind {
    /// Record count per group
    Count,
    /// Sum of the value component per group
    Sum {
        /// Declared value type
        tag: ValueTypeTag,
    },
    /// Sum and count pair; quotient on read
    Average {
        /// Declared value type
        tag: ValueTypeTag,
    },
}

/// Maintainer and read path for count / sum / average
#[derive(Debug, Clone)]
pub struct AggregateIndex {
    subspace: Subspace,
    expression: KeyExpression,
    kind: AggregateKind,
}

impl AggregateIndex {
    /// Build from a count/sum/average descriptor
    pub fn for_descriptor(descriptor: &IndexDescriptor, kind: AggregateKind) -> Self {
        Self {
            subspace: descriptor.subspace(),
            expression: descriptor.key_expression.clone(),
            kind,
        }
    }

    fn slot_key(&self, group: &Tuple, slot: &str) -> Vec<u8> {
        self.subspace.subspace(group).pack(&Tuple::new().with(slot))
    }

    /// Split produced tuples into `(group, value component)` pairs
    fn split(&self, record: &RecordView) -> Result<Vec<(Tuple, Option<Tuple>)>> {
        let tuples = self.expression.evaluate(record)?;
        let mut out = Vec::with_capacity(tuples.len());
        for tuple in tuples {
            match self.kind {
                AggregateKind::Count => out.push((tuple, None)),
                AggregateKind::Sum { .. } | AggregateKind::Average { .. } => {
                    let mut values = tuple.into_values();
                    let value = values.pop().ok_or_else(|| {
                        Error::InvalidStructure(
                            "aggregate key expression produced no value component".into(),
                        )
                    })?;
                    out.push((
                        Tuple::from_values(values),
                        Some(Tuple::new().with(value)),
                    ));
                }
            }
        }
        Ok(out)
    }

    fn apply(&self, tx: &mut dyn KvTransaction, record: &RecordView, sign: i64) -> Result<()> {
        for (group, value) in self.split(record)? {
            match self.kind {
                AggregateKind::Count => {
                    tx.atomic_op(
                        &self.slot_key(&group, "c"),
                        &sign.to_le_bytes(),
                        AtomicOp::Add,
                    );
                }
                AggregateKind::Sum { tag } => {
                    let component = value.as_ref().and_then(|t| t.get(0)).ok_or_else(|| {
                        Error::InvalidStructure("sum delta lost its value component".into())
                    })?;
                    let operand = additive_operand_component(tag, component)?;
                    tx.atomic_op(
                        &self.slot_key(&group, "s"),
                        &operand.wrapping_mul(sign).to_le_bytes(),
                        AtomicOp::Add,
                    );
                }
                AggregateKind::Average { tag } => {
                    let component = value.as_ref().and_then(|t| t.get(0)).ok_or_else(|| {
                        Error::InvalidStructure("average delta lost its value component".into())
                    })?;
                    let operand = additive_operand_component(tag, component)?;
                    tx.atomic_op(
                        &self.slot_key(&group, "s"),
                        &operand.wrapping_mul(sign).to_le_bytes(),
                        AtomicOp::Add,
                    );
                    tx.atomic_op(
                        &self.slot_key(&group, "c"),
                        &sign.to_le_bytes(),
                        AtomicOp::Add,
                    );
                }
            }
        }
        Ok(())
    }

    /// The maintained count for `group`; zero when the group is absent
    ///
    /// # Errors
    ///
    /// KV errors propagate.
    pub fn count(&self, tx: &mut dyn KvTransaction, group: &Tuple) -> Result<i64> {
        let raw = tx.get(&self.slot_key(group, "c"), false)?;
        Ok(raw.as_deref().map(read_i64_le).unwrap_or(0))
    }

    /// The maintained sum for `group` in the declared type's domain
    ///
    /// # Errors
    ///
    /// `UnsupportedType` when called on a count index.
    pub fn sum(&self, tx: &mut dyn KvTransaction, group: &Tuple) -> Result<f64> {
        let tag = match self.kind {
            AggregateKind::Sum { tag } | AggregateKind::Average { tag } => tag,
            AggregateKind::Count => {
                return Err(Error::UnsupportedType(
                    "count index has no sum slot".into(),
                ))
            }
        };
        let raw = tx.get(&self.slot_key(group, "s"), false)?;
        Ok(raw
            .as_deref()
            .map(|r| decode_additive_slot(tag, r))
            .unwrap_or(0.0))
    }

    /// The exact integer sum slot for `group`, before any float descaling
    ///
    /// # Errors
    ///
    /// KV errors propagate.
    pub fn sum_exact(&self, tx: &mut dyn KvTransaction, group: &Tuple) -> Result<i64> {
        let raw = tx.get(&self.slot_key(group, "s"), false)?;
        Ok(raw.as_deref().map(read_i64_le).unwrap_or(0))
    }

    /// The maintained average for `group`; `None` when the group is empty
    ///
    /// # Errors
    ///
    /// `UnsupportedType` when called on a non-average index.
    pub fn average(&self, tx: &mut dyn KvTransaction, group: &Tuple) -> Result<Option<f64>> {
        match self.kind {
            AggregateKind::Average { .. } => {}
            _ => {
                return Err(Error::UnsupportedType(
                    "only average indexes maintain a sum/count pair".into(),
                ))
            }
        }
        let count = self.count(tx, group)?;
        if count == 0 {
            return Ok(None);
        }
        let sum = self.sum(tx, group)?;
        Ok(Some(sum / count as f64))
    }
}

impl IndexMaintainer for AggregateIndex {
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
            self.apply(tx, record, -1)?;
        }
        if let Some(record) = new {
            self.apply(tx, record, 1)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use facet_catalog::IndexKind;
    use facet_kv::MemoryDatabase;

    fn order(id: &str, region: &str, amount: i64) -> RecordView {
        RecordView::new("order", Tuple::new().with(id))
            .with_field("region", region)
            .with_field("amount", amount)
    }

    fn sum_index() -> AggregateIndex {
        let descriptor = IndexDescriptor::new(
            "sum_by_region",
            IndexKind::Sum {
                value_type: ValueTypeTag::I64,
            },
            KeyExpression::fields(&["region", "amount"]),
        );
        AggregateIndex::for_descriptor(
            &descriptor,
            AggregateKind::Sum {
                tag: ValueTypeTag::I64,
            },
        )
    }

    fn avg_index() -> AggregateIndex {
        let descriptor = IndexDescriptor::new(
            "avg_by_region",
            IndexKind::Average {
                value_type: ValueTypeTag::I64,
            },
            KeyExpression::fields(&["region", "amount"]),
        );
        AggregateIndex::for_descriptor(
            &descriptor,
            AggregateKind::Average {
                tag: ValueTypeTag::I64,
            },
        )
    }

    #[test]
    fn sum_and_average_track_inserts_and_deletes() {
        let db = MemoryDatabase::new();
        let sum = sum_index();
        let avg = avg_index();
        let group = |r: &str| Tuple::new().with(r);

        db.run(|tx| {
            for r in [
                order("o1", "T", 100),
                order("o2", "T", 200),
                order("o3", "O", 150),
            ] {
                sum.update(tx, None, Some(&r))?;
                avg.update(tx, None, Some(&r))?;
            }
            Ok(())
        })
        .unwrap();

        db.run(|tx| {
            assert_eq!(sum.sum(tx, &group("T"))?, 300.0);
            assert_eq!(sum.sum(tx, &group("O"))?, 150.0);
            assert_eq!(avg.average(tx, &group("T"))?, Some(150.0));
            assert_eq!(avg.average(tx, &group("O"))?, Some(150.0));
            Ok(())
        })
        .unwrap();

        db.run(|tx| {
            let gone = order("o1", "T", 100);
            sum.update(tx, Some(&gone), None)?;
            avg.update(tx, Some(&gone), None)
        })
        .unwrap();

        db.run(|tx| {
            assert_eq!(sum.sum(tx, &group("T"))?, 200.0);
            assert_eq!(avg.count(tx, &group("T"))?, 1);
            assert_eq!(avg.average(tx, &group("T"))?, Some(200.0));
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn group_move_shifts_both_groups() {
        let db = MemoryDatabase::new();
        let sum = sum_index();
        db.run(|tx| sum.update(tx, None, Some(&order("o1", "T", 100))))
            .unwrap();
        db.run(|tx| {
            sum.update(
                tx,
                Some(&order("o1", "T", 100)),
                Some(&order("o1", "O", 100)),
            )
        })
        .unwrap();
        db.run(|tx| {
            assert_eq!(sum.sum(tx, &Tuple::new().with("T"))?, 0.0);
            assert_eq!(sum.sum(tx, &Tuple::new().with("O"))?, 100.0);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn float_sums_are_fixed_point() {
        let descriptor = IndexDescriptor::new(
            "sum_latency",
            IndexKind::Sum {
                value_type: ValueTypeTag::F64,
            },
            KeyExpression::fields(&["route", "latency"]),
        );
        let index = AggregateIndex::for_descriptor(
            &descriptor,
            AggregateKind::Sum {
                tag: ValueTypeTag::F64,
            },
        );
        let db = MemoryDatabase::new();
        let rec = |id: &str, latency: f64| {
            RecordView::new("sample", Tuple::new().with(id))
                .with_field("route", "/api")
                .with_field("latency", latency)
        };
        db.run(|tx| {
            index.update(tx, None, Some(&rec("s1", 0.25)))?;
            index.update(tx, None, Some(&rec("s2", 0.5)))
        })
        .unwrap();
        db.run(|tx| {
            assert_eq!(index.sum(tx, &Tuple::new().with("/api"))?, 0.75);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn empty_group_reads_zero_and_none() {
        let db = MemoryDatabase::new();
        let avg = avg_index();
        db.run(|tx| {
            assert_eq!(avg.count(tx, &Tuple::new().with("nowhere"))?, 0);
            assert_eq!(avg.average(tx, &Tuple::new().with("nowhere"))?, None);
            Ok(())
        })
        .unwrap();
    }
}

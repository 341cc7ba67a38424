//! Bitmap indexes: record-id sets per distinct value
//!
//! The key expression's full output tuple is the distinct value. Each
//! value owns one roaring bitmap of integer record ids, stored one
//! segment per KV entry so an update rewrites only the touched segment:
//!
//! ```text
//! <subspace> + "bm" + <value tuple> + <segment hi>  ->  container bytes
//! <subspace> + "ids"  + <PK>                        ->  id (u32 LE)
//! <subspace> + "rids" + <id>                        ->  packed PK
//! <subspace> + "meta" + "next_id"                   ->  u32 LE counter
//! ```
//!
//! Ids are allocated once per primary key from the monotonic counter and
//! kept for the life of the index, so a record's bitmap membership moves
//! between values without re-numbering.

pub mod roaring;

pub use roaring::{Container, RoaringBitmap};

use byteorder::{ByteOrder, LittleEndian};
use std::collections::BTreeMap;
use tracing::trace;

use facet_catalog::{IndexDescriptor, KeyExpression, RecordView};
use facet_core::{Error, Result, Subspace, Tuple, TupleValue};
use facet_kv::{KeyRange, KvTransaction, RangeOptions};

use crate::maintainer::IndexMaintainer;

/// Maintainer and read path for bitmap indexes
#[derive(Debug, Clone)]
pub struct BitmapIndex {
    name: String,
    subspace: Subspace,
    expression: KeyExpression,
}

impl BitmapIndex {
    /// Build from a bitmap descriptor
    pub fn for_descriptor(descriptor: &IndexDescriptor) -> Self {
        Self {
            name: descriptor.name.clone(),
            subspace: descriptor.subspace(),
            expression: descriptor.key_expression.clone(),
        }
    }

    fn pk_to_id_key(&self, pk: &Tuple) -> Vec<u8> {
        self.subspace.child("ids").pack(pk)
    }

    fn id_to_pk_key(&self, id: u32) -> Vec<u8> {
        self.subspace
            .child("rids")
            .pack(&Tuple::new().with(id as i64))
    }

    fn counter_key(&self) -> Vec<u8> {
        self.subspace
            .child("meta")
            .pack(&Tuple::new().with("next_id"))
    }

    fn segment_key(&self, value: &Tuple, hi: u16) -> Vec<u8> {
        self.subspace
            .child("bm")
            .subspace(value)
            .pack(&Tuple::new().with(hi as i64))
    }

    /// The id already assigned to `pk`, if any
    fn lookup_id(&self, tx: &mut dyn KvTransaction, pk: &Tuple) -> Result<Option<u32>> {
        let raw = tx.get(&self.pk_to_id_key(pk), false)?;
        raw.map(|r| {
            if r.len() != 4 {
                Err(Error::InvalidStructure(format!(
                    "index '{}': id dictionary entry has {} bytes",
                    self.name,
                    r.len()
                )))
            } else {
                Ok(LittleEndian::read_u32(&r))
            }
        })
        .transpose()
    }

    /// The id for `pk`, allocating from the counter when new
    fn id_for(&self, tx: &mut dyn KvTransaction, pk: &Tuple) -> Result<u32> {
        if let Some(id) = self.lookup_id(tx, pk)? {
            return Ok(id);
        }
        let counter = tx.get(&self.counter_key(), false)?;
        let id = match counter.as_deref() {
            Some(raw) if raw.len() >= 4 => LittleEndian::read_u32(raw),
            _ => 0,
        };
        let mut next = [0u8; 4];
        LittleEndian::write_u32(&mut next, id + 1);
        tx.set(&self.counter_key(), &next);
        let mut raw = [0u8; 4];
        LittleEndian::write_u32(&mut raw, id);
        tx.set(&self.pk_to_id_key(pk), &raw);
        tx.set(&self.id_to_pk_key(id), &pk.pack());
        trace!(target: "facet::index", index = %self.name, id, "allocated bitmap id");
        Ok(id)
    }

    /// Mutate one segment container in place
    fn mutate_segment(
        &self,
        tx: &mut dyn KvTransaction,
        value: &Tuple,
        id: u32,
        insert: bool,
    ) -> Result<()> {
        let key = self.segment_key(value, (id >> 16) as u16);
        let mut container = match tx.get(&key, false)? {
            Some(raw) => Container::deserialize(&raw)?,
            None => Container::new(),
        };
        let changed = if insert {
            container.insert(id as u16)
        } else {
            container.remove(id as u16)
        };
        if !changed {
            return Ok(());
        }
        if container.cardinality() == 0 {
            tx.clear(&key);
        } else {
            tx.set(&key, &container.optimize().serialize()?);
        }
        Ok(())
    }

    /// The distinct-value tuples a record produces
    fn values_of(&self, record: &RecordView) -> Result<Vec<Tuple>> {
        Ok(self.expression.evaluate(record)?.into_iter().collect())
    }

    /// Load the full bitmap for one distinct value
    ///
    /// # Errors
    ///
    /// KV and decode errors propagate.
    pub fn get_bitmap(&self, tx: &mut dyn KvTransaction, value: &Tuple) -> Result<RoaringBitmap> {
        let scope = self.subspace.child("bm").subspace(value);
        let (begin, end) = scope.range();
        let pairs = tx.get_range(&KeyRange::new(begin, end), &RangeOptions::default())?;
        let mut segments = BTreeMap::new();
        for (key, raw) in pairs {
            let hi = match scope.unpack(&key)?.values().first() {
                Some(TupleValue::Int(hi)) => *hi as u16,
                _ => {
                    return Err(Error::InvalidStructure(format!(
                        "index '{}': malformed segment key",
                        self.name
                    )))
                }
            };
            segments.insert(hi, Container::deserialize(&raw)?);
        }
        Ok(RoaringBitmap::from_segments(segments))
    }

    /// Count ids for one value from segment headers only
    ///
    /// # Errors
    ///
    /// KV and decode errors propagate.
    pub fn cardinality(&self, tx: &mut dyn KvTransaction, value: &Tuple) -> Result<u64> {
        let scope = self.subspace.child("bm").subspace(value);
        let (begin, end) = scope.range();
        let pairs = tx.get_range(&KeyRange::new(begin, end), &RangeOptions::default())?;
        let mut total = 0u64;
        for (_, raw) in pairs {
            total += Container::read_cardinality(&raw)? as u64;
        }
        Ok(total)
    }

    /// Intersection of the bitmaps of `values`
    ///
    /// # Errors
    ///
    /// KV and decode errors propagate.
    pub fn and_query(
        &self,
        tx: &mut dyn KvTransaction,
        values: &[Tuple],
    ) -> Result<RoaringBitmap> {
        let mut iter = values.iter();
        let mut acc = match iter.next() {
            Some(value) => self.get_bitmap(tx, value)?,
            None => return Ok(RoaringBitmap::new()),
        };
        for value in iter {
            if acc.is_empty() {
                break;
            }
            acc = acc.and(&self.get_bitmap(tx, value)?);
        }
        Ok(acc)
    }

    /// Union of the bitmaps of `values`
    ///
    /// # Errors
    ///
    /// KV and decode errors propagate.
    pub fn or_query(
        &self,
        tx: &mut dyn KvTransaction,
        values: &[Tuple],
    ) -> Result<RoaringBitmap> {
        let mut acc = RoaringBitmap::new();
        for value in values {
            acc = acc.or(&self.get_bitmap(tx, value)?);
        }
        Ok(acc)
    }

    /// Ids in `a`'s bitmap but not `b`'s
    ///
    /// # Errors
    ///
    /// KV and decode errors propagate.
    pub fn and_not_query(
        &self,
        tx: &mut dyn KvTransaction,
        a: &Tuple,
        b: &Tuple,
    ) -> Result<RoaringBitmap> {
        Ok(self.get_bitmap(tx, a)?.and_not(&self.get_bitmap(tx, b)?))
    }

    /// Resolve a bitmap's ids back to primary keys, in id order
    ///
    /// # Errors
    ///
    /// `InvalidStructure` when an id has no dictionary entry.
    pub fn get_primary_keys(
        &self,
        tx: &mut dyn KvTransaction,
        bitmap: &RoaringBitmap,
    ) -> Result<Vec<Tuple>> {
        let mut out = Vec::new();
        for id in bitmap.iter_ids() {
            let raw = tx.get(&self.id_to_pk_key(id), false)?.ok_or_else(|| {
                Error::InvalidStructure(format!(
                    "index '{}': id {} has no reverse dictionary entry",
                    self.name, id
                ))
            })?;
            out.push(Tuple::unpack(&raw)?);
        }
        Ok(out)
    }

    /// Every distinct value with at least one live segment
    ///
    /// # Errors
    ///
    /// KV and decode errors propagate.
    pub fn get_all_distinct_values(&self, tx: &mut dyn KvTransaction) -> Result<Vec<Tuple>> {
        let scope = self.subspace.child("bm");
        let (begin, end) = scope.range();
        let pairs = tx.get_range(&KeyRange::new(begin, end), &RangeOptions::default())?;
        let mut out: Vec<Tuple> = Vec::new();
        for (key, _) in pairs {
            let mut tuple = scope.unpack(&key)?.into_values();
            tuple.pop(); // strip the segment-hi component
            let value = Tuple::from_values(tuple);
            if out.last().map(|t| t.pack()) != Some(value.pack()) {
                out.push(value);
            }
        }
        Ok(out)
    }
}

impl IndexMaintainer for BitmapIndex {
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
            if let Some(id) = self.lookup_id(tx, record.primary_key())? {
                for value in self.values_of(record)? {
                    self.mutate_segment(tx, &value, id, false)?;
                }
            }
        }
        if let Some(record) = new {
            let id = self.id_for(tx, record.primary_key())?;
            for value in self.values_of(record)? {
                self.mutate_segment(tx, &value, id, true)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use facet_catalog::IndexKind;
    use facet_kv::MemoryDatabase;

    fn index() -> BitmapIndex {
        let descriptor = IndexDescriptor::new(
            "by_category",
            IndexKind::Bitmap,
            KeyExpression::field("category"),
        );
        BitmapIndex::for_descriptor(&descriptor)
    }

    fn product(id: u32, category: &str) -> RecordView {
        RecordView::new("product", Tuple::new().with(format!("p{:04}", id)))
            .with_field("category", category)
    }

    fn cat(name: &str) -> Tuple {
        Tuple::new().with(name)
    }

    #[test]
    fn or_query_unions_groups() {
        let db = MemoryDatabase::new();
        let index = index();
        db.run(|tx| {
            for i in 0..100 {
                index.update(tx, None, Some(&product(i, "a")))?;
            }
            for i in 100..200 {
                index.update(tx, None, Some(&product(i, "b")))?;
            }
            for i in 200..300 {
                index.update(tx, None, Some(&product(i, "c")))?;
            }
            Ok(())
        })
        .unwrap();

        db.run(|tx| {
            let union = index.or_query(tx, &[cat("a"), cat("b")])?;
            assert_eq!(union.cardinality(), 200);

            let pks = index.get_primary_keys(tx, &union)?;
            assert_eq!(pks.len(), 200);
            let a_ids = index.get_bitmap(tx, &cat("a"))?;
            let b_ids = index.get_bitmap(tx, &cat("b"))?;
            assert_eq!(a_ids.or(&b_ids).iter_ids(), union.iter_ids());
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn and_query_and_and_not() {
        let db = MemoryDatabase::new();
        let index = index();
        db.run(|tx| {
            for i in 0..50 {
                index.update(tx, None, Some(&product(i, "x")))?;
            }
            Ok(())
        })
        .unwrap();
        db.run(|tx| {
            // Disjoint categories intersect to nothing.
            assert!(index.and_query(tx, &[cat("x"), cat("y")])?.is_empty());
            assert_eq!(index.and_query(tx, &[cat("x"), cat("x")])?.cardinality(), 50);
            assert_eq!(index.and_not_query(tx, &cat("x"), &cat("y"))?.cardinality(), 50);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn category_change_moves_the_id() {
        let db = MemoryDatabase::new();
        let index = index();
        db.run(|tx| index.update(tx, None, Some(&product(1, "a"))))
            .unwrap();
        db.run(|tx| index.update(tx, Some(&product(1, "a")), Some(&product(1, "b"))))
            .unwrap();
        db.run(|tx| {
            assert_eq!(index.cardinality(tx, &cat("a"))?, 0);
            assert_eq!(index.cardinality(tx, &cat("b"))?, 1);
            // The id is stable across the move.
            let before = index.get_bitmap(tx, &cat("b"))?.iter_ids();
            assert_eq!(before.len(), 1);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn distinct_values_enumerate_live_groups() {
        let db = MemoryDatabase::new();
        let index = index();
        db.run(|tx| {
            index.update(tx, None, Some(&product(1, "a")))?;
            index.update(tx, None, Some(&product(2, "b")))?;
            index.update(tx, None, Some(&product(3, "b")))
        })
        .unwrap();
        db.run(|tx| {
            let values = index.get_all_distinct_values(tx)?;
            assert_eq!(values, vec![cat("a"), cat("b")]);
            Ok(())
        })
        .unwrap();
        // Deleting the only "a" product retires the value.
        db.run(|tx| index.update(tx, Some(&product(1, "a")), None))
            .unwrap();
        db.run(|tx| {
            assert_eq!(index.get_all_distinct_values(tx)?, vec![cat("b")]);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn cardinality_reads_headers_only() {
        let db = MemoryDatabase::new();
        let index = index();
        db.run(|tx| {
            for i in 0..250 {
                index.update(tx, None, Some(&product(i, "bulk")))?;
            }
            Ok(())
        })
        .unwrap();
        db.run(|tx| {
            assert_eq!(index.cardinality(tx, &cat("bulk"))?, 250);
            Ok(())
        })
        .unwrap();
    }
}

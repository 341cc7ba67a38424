//! Percentile indexes backed by a per-group t-digest
//!
//! One serialized sketch per group at `<group> + "td"`. Updates are
//! read-modify-write: deserialize, add the new value with weight 1,
//! re-serialize. The digest is add-only (deletions and the removal half
//! of a change are documented no-ops), so concurrent updaters rely on the
//! store's serializable transactions to linearize, retrying on conflict.
//!
//! Hot groups can declare a shard count: writes then land in one of N
//! sub-sketches at `<group> + "td" + <shard>` selected by primary-key
//! hash, and readers merge all shards. Contention drops by roughly N at
//! the cost of N reads per query.
//!
//! The stored value carries a one-byte format tag ahead of the bincode
//! body so the layout can evolve.

mod tdigest;

pub use tdigest::{Centroid, TDigest};

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use facet_catalog::{IndexDescriptor, IndexKind, KeyExpression, RecordView};
use facet_core::{Error, Result, Subspace, Tuple};
use facet_kv::KvTransaction;

use crate::codec::Score;
use crate::maintainer::IndexMaintainer;

/// Format tag of the serialized sketch
const DIGEST_FORMAT_V1: u8 = 0x01;

/// Summary statistics of one group's sketch
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DigestStatistics {
    /// Number of values added
    pub count: u64,
    /// Exact minimum
    pub min: f64,
    /// Exact maximum
    pub max: f64,
    /// Interpolated median
    pub median: f64,
}

/// Maintainer and read path for percentile indexes
#[derive(Debug, Clone)]
pub struct PercentileIndex {
    subspace: Subspace,
    expression: KeyExpression,
    compression: f64,
    shard_count: u32,
}

impl PercentileIndex {
    /// Build from a percentile descriptor
    pub fn for_descriptor(descriptor: &IndexDescriptor) -> Self {
        let (compression, shard_count) = match descriptor.kind {
            IndexKind::Percentile {
                compression,
                shard_count,
            } => (compression, shard_count.max(1)),
            _ => (100.0, 1),
        };
        Self {
            subspace: descriptor.subspace(),
            expression: descriptor.key_expression.clone(),
            compression,
            shard_count,
        }
    }

    fn digest_key(&self, group: &Tuple, shard: u32) -> Vec<u8> {
        let scope = self.subspace.subspace(group);
        if self.shard_count == 1 {
            scope.pack(&Tuple::new().with("td"))
        } else {
            scope.pack(&Tuple::new().with("td").with(shard as i64))
        }
    }

    /// The shard a record's writes land in
    fn shard_for(&self, pk: &Tuple) -> u32 {
        if self.shard_count == 1 {
            return 0;
        }
        let mut hasher = DefaultHasher::new();
        pk.pack().hash(&mut hasher);
        (hasher.finish() % self.shard_count as u64) as u32
    }

    /// Split produced tuples into `(group, value)` pairs
    fn split(&self, record: &RecordView) -> Result<Vec<(Tuple, f64)>> {
        let tuples = self.expression.evaluate(record)?;
        let mut out = Vec::with_capacity(tuples.len());
        for tuple in tuples {
            let mut values = tuple.into_values();
            let component = values.pop().ok_or_else(|| {
                Error::InvalidStructure(
                    "percentile key expression produced no value component".into(),
                )
            })?;
            let score = Score::from_tuple_value(&component)?;
            out.push((Tuple::from_values(values), score.as_f64()));
        }
        Ok(out)
    }

    /// Load one shard's sketch, or an empty one
    fn load_shard(
        &self,
        tx: &mut dyn KvTransaction,
        group: &Tuple,
        shard: u32,
    ) -> Result<TDigest> {
        match tx.get(&self.digest_key(group, shard), false)? {
            None => Ok(TDigest::new(self.compression)),
            Some(raw) => {
                let (format, body) = raw.split_first().ok_or_else(|| {
                    Error::TruncatedData("empty percentile sketch value".into())
                })?;
                if *format != DIGEST_FORMAT_V1 {
                    return Err(Error::InvalidStructure(format!(
                        "unknown percentile sketch format 0x{:02x}",
                        format
                    )));
                }
                bincode::deserialize(body).map_err(|e| Error::Serialization(e.to_string()))
            }
        }
    }

    /// Load the merged sketch for `group`, or an empty one
    ///
    /// # Errors
    ///
    /// `InvalidStructure` on an unknown format tag, `Serialization` on a
    /// corrupt body.
    pub fn load_digest(&self, tx: &mut dyn KvTransaction, group: &Tuple) -> Result<TDigest> {
        let mut merged = self.load_shard(tx, group, 0)?;
        for shard in 1..self.shard_count {
            let part = self.load_shard(tx, group, shard)?;
            if part.count() > 0 {
                merged.merge_from(&part);
            }
        }
        Ok(merged)
    }

    fn store_shard(
        &self,
        tx: &mut dyn KvTransaction,
        group: &Tuple,
        shard: u32,
        digest: &TDigest,
    ) -> Result<()> {
        let body =
            bincode::serialize(digest).map_err(|e| Error::Serialization(e.to_string()))?;
        let mut value = Vec::with_capacity(body.len() + 1);
        value.push(DIGEST_FORMAT_V1);
        value.extend_from_slice(&body);
        tx.set(&self.digest_key(group, shard), &value);
        Ok(())
    }

    /// Interpolated value at quantile `p ∈ [0, 1]` for `group`
    ///
    /// # Errors
    ///
    /// KV and decode errors propagate; `None` when the group is empty.
    pub fn get_percentile(
        &self,
        tx: &mut dyn KvTransaction,
        group: &Tuple,
        p: f64,
    ) -> Result<Option<f64>> {
        Ok(self.load_digest(tx, group)?.quantile(p))
    }

    /// Many quantiles from one sketch read
    ///
    /// # Errors
    ///
    /// KV and decode errors propagate.
    pub fn get_percentiles(
        &self,
        tx: &mut dyn KvTransaction,
        group: &Tuple,
        ps: &[f64],
    ) -> Result<Vec<Option<f64>>> {
        let digest = self.load_digest(tx, group)?;
        Ok(ps.iter().map(|p| digest.quantile(*p)).collect())
    }

    /// Approximate fraction of values ≤ `v` for `group`
    ///
    /// # Errors
    ///
    /// KV and decode errors propagate; `None` when the group is empty.
    pub fn get_cdf(
        &self,
        tx: &mut dyn KvTransaction,
        group: &Tuple,
        v: f64,
    ) -> Result<Option<f64>> {
        Ok(self.load_digest(tx, group)?.cdf(v))
    }

    /// Count, exact min/max and median for `group`
    ///
    /// # Errors
    ///
    /// KV and decode errors propagate; `None` when the group is empty.
    pub fn get_statistics(
        &self,
        tx: &mut dyn KvTransaction,
        group: &Tuple,
    ) -> Result<Option<DigestStatistics>> {
        let digest = self.load_digest(tx, group)?;
        match (digest.min(), digest.max(), digest.quantile(0.5)) {
            (Some(min), Some(max), Some(median)) => Ok(Some(DigestStatistics {
                count: digest.count(),
                min,
                max,
                median,
            })),
            _ => Ok(None),
        }
    }
}

impl IndexMaintainer for PercentileIndex {
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
        // Removals are no-ops: the sketch is add-only.
        let record = match new {
            Some(record) => record,
            None => return Ok(()),
        };
        let shard = self.shard_for(record.primary_key());
        for (group, value) in self.split(record)? {
            let mut digest = self.load_shard(tx, &group, shard)?;
            digest.add(value);
            digest.compress();
            self.store_shard(tx, &group, shard, &digest)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use facet_kv::MemoryDatabase;

    fn index() -> PercentileIndex {
        let descriptor = IndexDescriptor::new(
            "latency_digest",
            IndexKind::Percentile {
            compression: 100.0,
            shard_count: 1,
        },
            KeyExpression::fields(&["route", "latency"]),
        );
        PercentileIndex::for_descriptor(&descriptor)
    }

    fn sample(id: u32, latency: i64) -> RecordView {
        RecordView::new("sample", Tuple::new().with(id))
            .with_field("route", "/api/u")
            .with_field("latency", latency)
    }

    fn group() -> Tuple {
        Tuple::new().with("/api/u")
    }

    #[test]
    fn latency_percentiles() {
        let db = MemoryDatabase::new();
        let index = index();
        db.run(|tx| {
            for i in 1..=100 {
                index.update(tx, None, Some(&sample(i, i as i64)))?;
            }
            Ok(())
        })
        .unwrap();

        db.run(|tx| {
            let ps = index.get_percentiles(tx, &group(), &[0.5, 0.9, 0.99])?;
            let p50 = ps[0].unwrap();
            let p90 = ps[1].unwrap();
            let p99 = ps[2].unwrap();
            assert!((45.0..=55.0).contains(&p50), "p50 = {}", p50);
            assert!((85.0..=95.0).contains(&p90), "p90 = {}", p90);
            assert!((95.0..=100.0).contains(&p99), "p99 = {}", p99);
            let stats = index.get_statistics(tx, &group())?.unwrap();
            assert_eq!(stats.count, 100);
            assert!(stats.min <= 1.5);
            assert!(stats.max >= 99.5);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn deletes_do_not_decrement() {
        let db = MemoryDatabase::new();
        let index = index();
        db.run(|tx| {
            index.update(tx, None, Some(&sample(1, 10)))?;
            index.update(tx, None, Some(&sample(2, 20)))
        })
        .unwrap();
        db.run(|tx| index.update(tx, Some(&sample(1, 10)), None))
            .unwrap();
        db.run(|tx| {
            let stats = index.get_statistics(tx, &group())?.unwrap();
            assert_eq!(stats.count, 2);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn sharded_group_merges_at_read() {
        let descriptor = IndexDescriptor::new(
            "hot_latency_digest",
            IndexKind::Percentile {
                compression: 100.0,
                shard_count: 4,
            },
            KeyExpression::fields(&["route", "latency"]),
        );
        let index = PercentileIndex::for_descriptor(&descriptor);
        let db = MemoryDatabase::new();
        db.run(|tx| {
            for i in 1..=200 {
                let record = RecordView::new("sample", Tuple::new().with(i as i64))
                    .with_field("route", "/api/u")
                    .with_field("latency", i as i64);
                index.update(tx, None, Some(&record))?;
            }
            Ok(())
        })
        .unwrap();
        db.run(|tx| {
            let stats = index.get_statistics(tx, &group())?.unwrap();
            assert_eq!(stats.count, 200);
            assert!(stats.min <= 1.5);
            assert!(stats.max >= 199.5);
            let p50 = index.get_percentile(tx, &group(), 0.5)?.unwrap();
            assert!((90.0..=110.0).contains(&p50), "p50 = {}", p50);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn empty_group_returns_none() {
        let db = MemoryDatabase::new();
        let index = index();
        db.run(|tx| {
            assert_eq!(index.get_percentile(tx, &group(), 0.5)?, None);
            assert_eq!(index.get_cdf(tx, &group(), 1.0)?, None);
            assert!(index.get_statistics(tx, &group())?.is_none());
            Ok(())
        })
        .unwrap();
    }
}

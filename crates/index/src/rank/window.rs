//! Time-window leaderboards
//!
//! A leaderboard is a family of independent skip-lists, one per time
//! bucket derived from the record's timestamp field:
//!
//! ```text
//! <subspace> + "w" + <windowId> + …   one skip-list per bucket
//! <subspace> + "buckets" + <windowId> -> ""   bucket registry
//! ```
//!
//! Only the newest `window_count` buckets are retained. Rollover is lazy:
//! the writer that first lands in a new window clears whatever expired
//! buckets the registry still lists; readers address buckets explicitly
//! and never consult expired ones.

use chrono::{DateTime, Datelike, Utc};
use tracing::debug;

use facet_catalog::{IndexDescriptor, IndexKind, KeyExpression, LevelStrategy, RecordView};
use facet_core::{Error, KernelConfig, LeaderboardWindow, Result, Subspace, Tuple};
use facet_kv::{KeyRange, KvTransaction, RangeOptions};

use crate::codec::Score;
use crate::maintainer::IndexMaintainer;
use crate::rank::skiplist::{RankedEntry, SkipList};

/// Maintainer and read path for the time-window leaderboard
#[derive(Debug, Clone)]
pub struct LeaderboardIndex {
    name: String,
    subspace: Subspace,
    expression: KeyExpression,
    timestamp_field: String,
    window: LeaderboardWindow,
    window_count: u32,
    num_levels: u8,
    strategy: LevelStrategy,
}

impl LeaderboardIndex {
    /// Build from a leaderboard descriptor
    pub fn for_descriptor(descriptor: &IndexDescriptor, config: &KernelConfig) -> Self {
        let (window, window_count, timestamp_field, strategy) = match &descriptor.kind {
            IndexKind::TimeWindowLeaderboard {
                window,
                window_count,
                timestamp_field,
                level_strategy,
            } => (
                *window,
                *window_count,
                timestamp_field.clone(),
                *level_strategy,
            ),
            _ => (
                config.leaderboard_default_window,
                config.leaderboard_default_window_count,
                String::new(),
                LevelStrategy::Probabilistic,
            ),
        };
        Self {
            name: descriptor.name.clone(),
            subspace: descriptor.subspace(),
            expression: descriptor.key_expression.clone(),
            timestamp_field,
            window,
            window_count: window_count.max(1),
            num_levels: config.rank_max_levels,
            strategy,
        }
    }

    /// The bucket id containing `timestamp` (Unix seconds)
    pub fn window_id(&self, timestamp: i64) -> i64 {
        match self.window {
            LeaderboardWindow::Hourly => timestamp.div_euclid(3600),
            LeaderboardWindow::Daily => timestamp.div_euclid(86_400),
            LeaderboardWindow::Weekly => timestamp.div_euclid(7 * 86_400),
            LeaderboardWindow::Monthly => {
                let when: DateTime<Utc> =
                    DateTime::from_timestamp(timestamp, 0).unwrap_or(DateTime::UNIX_EPOCH);
                (when.year() as i64) * 12 + when.month0() as i64
            }
        }
    }

    fn bucket(&self, window_id: i64) -> SkipList {
        SkipList::new(
            self.subspace.child("w").child(window_id),
            self.num_levels,
            self.strategy,
        )
    }

    fn registry_key(&self, window_id: i64) -> Vec<u8> {
        self.subspace
            .child("buckets")
            .pack(&Tuple::new().with(window_id))
    }

    /// Extract `(score, window id)` from a record
    fn locate(&self, record: &RecordView) -> Result<(Score, i64)> {
        let tuples = self.expression.evaluate(record)?;
        let tuple = tuples.first().ok_or_else(|| {
            Error::InvalidStructure("leaderboard key expression produced no tuple".into())
        })?;
        if tuple.len() != 1 || tuples.len() != 1 {
            return Err(Error::InvalidStructure(
                "leaderboard key expression must produce exactly one score component".into(),
            ));
        }
        let score = Score::from_tuple_value(&tuple.values()[0])?;
        let timestamp = match record.require_field(&self.timestamp_field)? {
            facet_catalog::FieldValue::Int(v) => *v,
            other => {
                return Err(Error::UnsupportedType(format!(
                    "leaderboard timestamp field '{}' holds {:?}",
                    self.timestamp_field, other
                )))
            }
        };
        Ok((score, self.window_id(timestamp)))
    }

    /// Clear buckets that have rolled out of the retained window set
    fn expire_buckets(&self, tx: &mut dyn KvTransaction, current_window: i64) -> Result<()> {
        let horizon = current_window - self.window_count as i64 + 1;
        let registry = self.subspace.child("buckets");
        let (begin, end) = registry.range();
        let pairs = tx.get_range(&KeyRange::new(begin, end), &RangeOptions::default())?;
        for (key, _) in pairs {
            let id = match registry.unpack(&key)?.values().first() {
                Some(facet_core::TupleValue::Int(id)) => *id,
                _ => {
                    return Err(Error::InvalidStructure(format!(
                        "index '{}': malformed bucket registry key",
                        self.name
                    )))
                }
            };
            if id < horizon {
                let bucket_space = self.subspace.child("w").child(id);
                let (b, e) = bucket_space.range();
                tx.clear_range(&KeyRange::new(b, e));
                tx.clear(&key);
                debug!(
                    target: "facet::rank",
                    index = %self.name,
                    window = id,
                    "expired leaderboard bucket"
                );
            }
        }
        Ok(())
    }

    /// The `k` best entries of one window bucket
    ///
    /// # Errors
    ///
    /// KV errors propagate.
    pub fn top_k(
        &self,
        tx: &mut dyn KvTransaction,
        window_id: i64,
        k: usize,
    ) -> Result<Vec<RankedEntry>> {
        self.bucket(window_id).top_k(tx, k)
    }

    /// Rank of `(score, pk)` inside one window bucket
    ///
    /// # Errors
    ///
    /// KV errors propagate.
    pub fn rank_of(
        &self,
        tx: &mut dyn KvTransaction,
        window_id: i64,
        score: Score,
        pk: &Tuple,
    ) -> Result<Option<u64>> {
        self.bucket(window_id).rank_of(tx, score, pk)
    }

    /// Entry count of one window bucket
    ///
    /// # Errors
    ///
    /// KV errors propagate.
    pub fn count(&self, tx: &mut dyn KvTransaction, window_id: i64) -> Result<u64> {
        self.bucket(window_id).count(tx)
    }

    /// Window ids with live buckets, ascending
    ///
    /// # Errors
    ///
    /// KV errors propagate.
    pub fn windows(&self, tx: &mut dyn KvTransaction) -> Result<Vec<i64>> {
        let registry = self.subspace.child("buckets");
        let (begin, end) = registry.range();
        let pairs = tx.get_range(&KeyRange::new(begin, end), &RangeOptions::default())?;
        let mut out = Vec::with_capacity(pairs.len());
        for (key, _) in pairs {
            if let Some(facet_core::TupleValue::Int(id)) = registry.unpack(&key)?.values().first()
            {
                out.push(*id);
            }
        }
        Ok(out)
    }
}

impl IndexMaintainer for LeaderboardIndex {
    fn update(
        &self,
        tx: &mut dyn KvTransaction,
        old: Option<&RecordView>,
        new: Option<&RecordView>,
    ) -> Result<()> {
        if let (Some(old), Some(new)) = (old, new) {
            let mut touched: Vec<&str> = self.expression.touched_fields().into_iter().collect();
            touched.push(self.timestamp_field.as_str());
            if old.fields_equal(new, &touched) {
                return Ok(());
            }
        }
        if let Some(record) = old {
            let (score, window_id) = self.locate(record)?;
            self.bucket(window_id)
                .remove(tx, score, record.primary_key())?;
        }
        if let Some(record) = new {
            let (score, window_id) = self.locate(record)?;
            self.bucket(window_id)
                .insert(tx, score, record.primary_key())?;
            tx.set(&self.registry_key(window_id), b"");
            self.expire_buckets(tx, window_id)?;
        }
        Ok(())
    }
}

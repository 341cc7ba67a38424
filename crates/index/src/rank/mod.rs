//! Rank and leaderboard indexes
//!
//! [`RankIndex`] maintains one skip-list over the whole index subspace;
//! [`LeaderboardIndex`] maintains one per time-window bucket, keyed by a
//! record timestamp. Both extract a single numeric score through the
//! descriptor's key expression.

mod skiplist;
pub mod window;

pub use skiplist::{RankedEntry, SkipList};
pub use window::LeaderboardIndex;

use facet_catalog::{IndexDescriptor, IndexKind, KeyExpression, LevelStrategy, RecordView};
use facet_core::{Error, KernelConfig, Result, Tuple};
use facet_kv::KvTransaction;

use crate::codec::Score;
use crate::maintainer::IndexMaintainer;

/// Maintainer and read path for the skip-list rank index
#[derive(Debug, Clone)]
pub struct RankIndex {
    expression: KeyExpression,
    list: SkipList,
}

impl RankIndex {
    /// Build from a rank descriptor
    pub fn for_descriptor(descriptor: &IndexDescriptor, config: &KernelConfig) -> Self {
        let strategy = match descriptor.kind {
            IndexKind::Rank { level_strategy, .. } => level_strategy,
            _ => LevelStrategy::Probabilistic,
        };
        Self {
            expression: descriptor.key_expression.clone(),
            list: SkipList::new(descriptor.subspace(), config.rank_max_levels, strategy),
        }
    }

    /// Extract the record's score
    fn score(&self, record: &RecordView) -> Result<Score> {
        let tuples = self.expression.evaluate(record)?;
        let tuple = tuples.first().ok_or_else(|| {
            Error::InvalidStructure("rank key expression produced no tuple".into())
        })?;
        if tuple.len() != 1 || tuples.len() != 1 {
            return Err(Error::InvalidStructure(
                "rank key expression must produce exactly one score component".into(),
            ));
        }
        Score::from_tuple_value(&tuple.values()[0])
    }

    /// Zero-based rank of a record's current score; `None` when absent
    ///
    /// # Errors
    ///
    /// KV errors propagate.
    pub fn rank_of(
        &self,
        tx: &mut dyn KvTransaction,
        score: Score,
        pk: &Tuple,
    ) -> Result<Option<u64>> {
        self.list.rank_of(tx, score, pk)
    }

    /// The `k` best-ranked entries, best first
    ///
    /// # Errors
    ///
    /// KV errors propagate.
    pub fn top_k(&self, tx: &mut dyn KvTransaction, k: usize) -> Result<Vec<RankedEntry>> {
        self.list.top_k(tx, k)
    }

    /// Entries with ranks in `[start, end]` inclusive, best first
    ///
    /// # Errors
    ///
    /// KV errors propagate.
    pub fn rank_range(
        &self,
        tx: &mut dyn KvTransaction,
        start: u64,
        end: u64,
    ) -> Result<Vec<RankedEntry>> {
        if end < start {
            return Ok(Vec::new());
        }
        self.list
            .entries_by_rank(tx, start, (end - start + 1) as usize)
    }

    /// Total maintained entries
    ///
    /// # Errors
    ///
    /// KV errors propagate.
    pub fn count(&self, tx: &mut dyn KvTransaction) -> Result<u64> {
        self.list.count(tx)
    }

    /// Walk every level and check the span invariant
    ///
    /// # Errors
    ///
    /// `InvalidStructure` describing the first violated invariant.
    pub fn verify_integrity(&self, tx: &mut dyn KvTransaction) -> Result<()> {
        self.list.verify_integrity(tx)
    }
}

impl IndexMaintainer for RankIndex {
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
            self.list
                .remove(tx, self.score(record)?, record.primary_key())?;
        }
        if let Some(record) = new {
            self.list
                .insert(tx, self.score(record)?, record.primary_key())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use facet_kv::MemoryDatabase;

    fn index() -> RankIndex {
        let descriptor = IndexDescriptor::new(
            "by_score",
            IndexKind::Rank {
                bucket_size: 100,
                level_strategy: LevelStrategy::Probabilistic,
            },
            KeyExpression::field("score"),
        );
        RankIndex::for_descriptor(&descriptor, &KernelConfig::default())
    }

    fn player(id: &str, score: i64) -> RecordView {
        RecordView::new("player", Tuple::new().with(id)).with_field("score", score)
    }

    #[test]
    fn update_moves_a_player_between_ranks() {
        let db = MemoryDatabase::new();
        let index = index();
        db.run(|tx| {
            index.update(tx, None, Some(&player("A", 50)))?;
            index.update(tx, None, Some(&player("B", 80)))?;
            index.update(tx, None, Some(&player("C", 20)))
        })
        .unwrap();

        db.run(|tx| {
            assert_eq!(
                index.rank_of(tx, Score::Int(50), &Tuple::new().with("A"))?,
                Some(1)
            );
            Ok(())
        })
        .unwrap();

        // A overtakes B.
        db.run(|tx| index.update(tx, Some(&player("A", 50)), Some(&player("A", 95))))
            .unwrap();
        db.run(|tx| {
            assert_eq!(
                index.rank_of(tx, Score::Int(95), &Tuple::new().with("A"))?,
                Some(0)
            );
            assert_eq!(
                index.rank_of(tx, Score::Int(50), &Tuple::new().with("A"))?,
                None
            );
            assert_eq!(index.count(tx)?, 3);
            index.verify_integrity(tx)
        })
        .unwrap();
    }

    #[test]
    fn rank_range_is_inclusive() {
        let db = MemoryDatabase::new();
        let index = index();
        db.run(|tx| {
            for (i, id) in ["A", "B", "C", "D", "E"].iter().enumerate() {
                index.update(tx, None, Some(&player(id, (i as i64 + 1) * 10)))?;
            }
            Ok(())
        })
        .unwrap();
        db.run(|tx| {
            let slice = index.rank_range(tx, 1, 3)?;
            assert_eq!(slice.len(), 3);
            assert_eq!(slice[0].0, Score::Int(40));
            assert_eq!(slice[2].0, Score::Int(20));
            assert!(index.rank_range(tx, 3, 2)?.is_empty());
            Ok(())
        })
        .unwrap();
    }
}

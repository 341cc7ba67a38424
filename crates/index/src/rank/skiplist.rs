//! Persistent probabilistic skip-list with span counters
//!
//! The structure lives entirely in the store:
//!
//! ```text
//! <subspace> + "levels" + ℓ + <sentinel|entry suffix>  ->  span (i64 LE)
//! <subspace> + "meta" + "count"                         ->  i64 LE (atomic)
//! <subspace> + "meta" + "num_levels" / "fanout"         ->  u32 LE
//! ```
//!
//! An entry's suffix packs `(descending-score bytes, PK…)`, so ascending
//! key order at every level is rank order: rank 0 is the first real key.
//! Every level carries a sentinel head (a packed `Null`, which sorts
//! before every real suffix), which makes the splice arithmetic uniform;
//! there is no "new head" special case anywhere.
//!
//! # The span invariant
//!
//! For an entry `e` at level ℓ whose successor at that level is `s`,
//! `span(e)` equals the number of level-0 entries in the half-open
//! rank interval `[pos(e), pos(s))`. The sentinel occupies position 0
//! with its span counting the level-0 entries before the level's first
//! real entry (at an otherwise empty level: all of them). Consequently,
//! at every level the spans sum to the total entry count, and the sum of
//! spans from the head to any entry equals that entry's level-0 rank.
//! Rank lookups and rank-addressed traversals are O(log n) expected.

use byteorder::{ByteOrder, LittleEndian};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use tracing::trace;

use facet_catalog::LevelStrategy;
use facet_core::{Error, Result, Subspace, Tuple, TupleValue};
use facet_kv::{KeyRange, KvTransaction, RangeOptions};

use crate::codec::Score;

/// One decoded level-0 entry: score plus primary key
pub type RankedEntry = (Score, Tuple);

/// A persistent skip-list scoped to one subspace
#[derive(Debug, Clone)]
pub struct SkipList {
    subspace: Subspace,
    num_levels: u8,
    strategy: LevelStrategy,
}

/// Predecessor state collected per level during a descent
#[derive(Debug, Clone)]
struct Predecessor {
    /// Key suffix of the predecessor (sentinel included)
    suffix: Vec<u8>,
    /// Its level-0 rank (sentinel: 0)
    pos: u64,
    /// Its span at this level
    span: i64,
}

fn encode_span(span: i64) -> [u8; 8] {
    span.to_le_bytes()
}

fn decode_span(raw: &[u8]) -> Result<i64> {
    if raw.len() != 8 {
        return Err(Error::InvalidStructure(format!(
            "span value must be 8 bytes, got {}",
            raw.len()
        )));
    }
    Ok(LittleEndian::read_i64(raw))
}

impl SkipList {
    /// Create a handle over `subspace` with the given level cap
    pub fn new(subspace: Subspace, num_levels: u8, strategy: LevelStrategy) -> Self {
        Self {
            subspace,
            num_levels: num_levels.clamp(1, 16),
            strategy,
        }
    }

    fn level_subspace(&self, level: u8) -> Subspace {
        self.subspace.child("levels").child(level as i64)
    }

    fn meta_key(&self, name: &str) -> Vec<u8> {
        self.subspace.child("meta").pack(&Tuple::new().with(name))
    }

    fn sentinel_suffix() -> Vec<u8> {
        Tuple::new().with(TupleValue::Null).pack()
    }

    /// The suffix shared by one logical entry across all its levels
    pub fn entry_suffix(score: Score, pk: &Tuple) -> Vec<u8> {
        Tuple::new()
            .with(score.to_descending_bytes().to_vec())
            .concat(pk.clone())
            .pack()
    }

    fn entry_key(&self, level: u8, suffix: &[u8]) -> Vec<u8> {
        let mut key = self.level_subspace(level).prefix().to_vec();
        key.extend_from_slice(suffix);
        key
    }

    /// Decode a suffix back into `(score, pk)`
    fn decode_suffix(suffix: &[u8]) -> Result<RankedEntry> {
        let tuple = Tuple::unpack(suffix)?;
        let mut values = tuple.into_values();
        if values.is_empty() {
            return Err(Error::InvalidStructure("empty skip-list entry".into()));
        }
        let score = match values.remove(0) {
            TupleValue::Bytes(raw) => Score::from_descending_bytes(&raw)?,
            other => {
                return Err(Error::InvalidStructure(format!(
                    "skip-list entry starts with {} instead of score bytes",
                    other
                )))
            }
        };
        Ok((score, Tuple::from_values(values)))
    }

    /// Write sentinels and metadata if this list has never been used
    ///
    /// # Errors
    ///
    /// KV errors propagate.
    pub fn ensure_initialized(&self, tx: &mut dyn KvTransaction) -> Result<()> {
        let sentinel0 = self.entry_key(0, &Self::sentinel_suffix());
        if tx.get(&sentinel0, false)?.is_some() {
            return Ok(());
        }
        for level in 0..self.num_levels {
            tx.set(
                &self.entry_key(level, &Self::sentinel_suffix()),
                &encode_span(0),
            );
        }
        let mut levels = [0u8; 4];
        LittleEndian::write_u32(&mut levels, self.num_levels as u32);
        tx.set(&self.meta_key("num_levels"), &levels);
        let mut fanout = [0u8; 4];
        LittleEndian::write_u32(&mut fanout, 2);
        tx.set(&self.meta_key("fanout"), &fanout);
        Ok(())
    }

    /// Total number of entries
    ///
    /// # Errors
    ///
    /// KV errors propagate.
    pub fn count(&self, tx: &mut dyn KvTransaction) -> Result<u64> {
        let raw = tx.get(&self.meta_key("count"), true)?;
        Ok(raw
            .as_deref()
            .map(crate::codec::read_i64_le)
            .unwrap_or(0)
            .max(0) as u64)
    }

    /// Height of a new entry, deterministic per primary key
    ///
    /// Replayed transactions must splice identically, so the draw is
    /// seeded from the key rather than ambient randomness.
    fn assign_height(&self, suffix: &[u8]) -> u8 {
        let mut hasher = DefaultHasher::new();
        suffix.hash(&mut hasher);
        let hash = hasher.finish();
        let height = match self.strategy {
            LevelStrategy::Probabilistic => {
                let mut rng = StdRng::seed_from_u64(hash);
                let mut h = 1u8;
                while h < self.num_levels && rng.gen_bool(0.5) {
                    h += 1;
                }
                h
            }
            LevelStrategy::Deterministic => 1 + hash.trailing_zeros() as u8,
        };
        height.clamp(1, self.num_levels)
    }

    /// Collect each level's predecessor of `target_suffix`
    ///
    /// Walks top-down; at each level the scan starts at the level-above
    /// predecessor (which also exists at this level) and accumulates
    /// spans, so the position bookkeeping is exact. Indexed by level.
    fn descend(
        &self,
        tx: &mut dyn KvTransaction,
        target_suffix: &[u8],
    ) -> Result<Vec<Predecessor>> {
        let mut top_down: Vec<Predecessor> = Vec::with_capacity(self.num_levels as usize);
        let mut start_suffix = Self::sentinel_suffix();
        let mut base_pos = 0u64;
        for level in (0..self.num_levels).rev() {
            let begin = self.entry_key(level, &start_suffix);
            let end = self.entry_key(level, target_suffix);
            let pairs = tx.get_range(&KeyRange::new(begin, end), &RangeOptions::default())?;
            let prefix_len = self.level_subspace(level).prefix().len();
            let mut current: Option<Predecessor> = None;
            for (key, value) in pairs {
                let suffix = key[prefix_len..].to_vec();
                let span = decode_span(&value)?;
                current = Some(match current {
                    None => Predecessor {
                        suffix,
                        pos: base_pos,
                        span,
                    },
                    Some(prev) => Predecessor {
                        suffix,
                        pos: prev.pos + prev.span.max(0) as u64,
                        span,
                    },
                });
            }
            let predecessor = current.ok_or_else(|| {
                Error::InvalidStructure("skip list is missing its sentinel head".into())
            })?;
            base_pos = predecessor.pos;
            start_suffix = predecessor.suffix.clone();
            top_down.push(predecessor);
        }
        top_down.reverse();
        Ok(top_down)
    }

    /// Insert `(score, pk)`; a re-insert of a present entry is a no-op
    ///
    /// # Errors
    ///
    /// KV errors propagate.
    pub fn insert(&self, tx: &mut dyn KvTransaction, score: Score, pk: &Tuple) -> Result<()> {
        self.ensure_initialized(tx)?;
        let target = Self::entry_suffix(score, pk);
        if tx.get(&self.entry_key(0, &target), false)?.is_some() {
            return Ok(());
        }

        let predecessors = self.descend(tx, &target)?;
        let rank = predecessors[0].pos + predecessors[0].span.max(0) as u64;
        let height = self.assign_height(&target);
        trace!(target: "facet::rank", rank, height, "skip-list insert");

        for level in 0..self.num_levels {
            let u = &predecessors[level as usize];
            if level < height {
                let new_span = if level == 0 {
                    1
                } else {
                    u.pos as i64 + u.span + 1 - rank as i64
                };
                tx.set(&self.entry_key(level, &target), &encode_span(new_span));
                tx.set(
                    &self.entry_key(level, &u.suffix),
                    &encode_span(rank as i64 - u.pos as i64),
                );
            } else {
                // The new entry lands inside this predecessor's interval.
                tx.set(&self.entry_key(level, &u.suffix), &encode_span(u.span + 1));
            }
        }
        tx.atomic_op(
            &self.meta_key("count"),
            &1i64.to_le_bytes(),
            facet_kv::AtomicOp::Add,
        );
        Ok(())
    }

    /// Remove `(score, pk)`
    ///
    /// # Errors
    ///
    /// `NotFound` when the entry is absent at level 0.
    pub fn remove(&self, tx: &mut dyn KvTransaction, score: Score, pk: &Tuple) -> Result<()> {
        let target = Self::entry_suffix(score, pk);
        let mut spans: Vec<Option<i64>> = Vec::with_capacity(self.num_levels as usize);
        for level in 0..self.num_levels {
            let raw = tx.get(&self.entry_key(level, &target), false)?;
            spans.push(raw.as_deref().map(decode_span).transpose()?);
        }
        if spans[0].is_none() {
            return Err(Error::NotFound(format!(
                "skip-list entry for {} is not present",
                pk
            )));
        }

        let predecessors = self.descend(tx, &target)?;
        for level in 0..self.num_levels {
            let u = &predecessors[level as usize];
            match spans[level as usize] {
                Some(del_span) => {
                    tx.set(
                        &self.entry_key(level, &u.suffix),
                        &encode_span(u.span + del_span - 1),
                    );
                    tx.clear(&self.entry_key(level, &target));
                }
                None => {
                    tx.set(&self.entry_key(level, &u.suffix), &encode_span(u.span - 1));
                }
            }
        }
        tx.atomic_op(
            &self.meta_key("count"),
            &(-1i64).to_le_bytes(),
            facet_kv::AtomicOp::Add,
        );
        Ok(())
    }

    /// The zero-based rank of `(score, pk)`, or `None` when absent
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
        let target = Self::entry_suffix(score, pk);
        if tx.get(&self.entry_key(0, &target), false)?.is_none() {
            return Ok(None);
        }
        let predecessors = self.descend(tx, &target)?;
        Ok(Some(
            predecessors[0].pos + predecessors[0].span.max(0) as u64,
        ))
    }

    /// Up to `count` entries starting at `start_rank`, in rank order
    ///
    /// Skips to `start_rank` by span traversal (O(log n)) and then
    /// consumes level-0 entries (O(count)).
    ///
    /// # Errors
    ///
    /// KV errors propagate.
    pub fn entries_by_rank(
        &self,
        tx: &mut dyn KvTransaction,
        start_rank: u64,
        count: usize,
    ) -> Result<Vec<RankedEntry>> {
        if count == 0 {
            return Ok(Vec::new());
        }
        // Span traversal: at each level advance while the next link does
        // not overshoot, then drop a level.
        let mut suffix = Self::sentinel_suffix();
        let mut pos = 0u64;
        let mut span_here: i64 = 0;
        for level in (0..self.num_levels).rev() {
            let level_sub = self.level_subspace(level);
            let prefix_len = level_sub.prefix().len();
            let (_, level_end) = level_sub.range();
            loop {
                let begin = self.entry_key(level, &suffix);
                let pairs = tx.get_range(
                    &KeyRange::new(begin, level_end.clone()),
                    &RangeOptions::limited(32),
                )?;
                if pairs.is_empty() {
                    break;
                }
                let mut advanced = false;
                let mut iter = pairs.into_iter();
                // First row is the current entry itself; refresh its span.
                if let Some((_, value)) = iter.next() {
                    span_here = decode_span(&value)?;
                }
                for (key, value) in iter {
                    if pos + span_here.max(0) as u64 > start_rank {
                        break;
                    }
                    pos += span_here.max(0) as u64;
                    suffix = key[prefix_len..].to_vec();
                    span_here = decode_span(&value)?;
                    advanced = true;
                }
                if !advanced || pos + span_here.max(0) as u64 > start_rank {
                    break;
                }
            }
        }

        // Consume level-0 entries from the located position.
        let level0 = self.level_subspace(0);
        let prefix_len = level0.prefix().len();
        let (_, end) = level0.range();
        let mut out = Vec::with_capacity(count);
        let mut cursor = self.entry_key(0, &suffix);
        let mut include_cursor = suffix != Self::sentinel_suffix() && pos >= start_rank;
        loop {
            let batch = tx.get_range(
                &KeyRange::new(cursor.clone(), end.clone()),
                &RangeOptions::limited(count + 2),
            )?;
            if batch.is_empty() {
                break;
            }
            for (key, _) in &batch {
                let suffix = &key[prefix_len..];
                if suffix == Self::sentinel_suffix().as_slice() {
                    continue;
                }
                if !include_cursor && *key == cursor {
                    continue;
                }
                out.push(Self::decode_suffix(suffix)?);
                if out.len() == count {
                    return Ok(out);
                }
            }
            let last = match batch.last() {
                Some((key, _)) => key.clone(),
                None => break,
            };
            if last == cursor && batch.len() == 1 {
                break;
            }
            include_cursor = false;
            cursor = last;
        }
        Ok(out)
    }

    /// The `k` best-ranked entries
    ///
    /// # Errors
    ///
    /// KV errors propagate.
    pub fn top_k(&self, tx: &mut dyn KvTransaction, k: usize) -> Result<Vec<RankedEntry>> {
        self.entries_by_rank(tx, 0, k)
    }

    /// Walk every level and check the span invariant
    ///
    /// # Errors
    ///
    /// `InvalidStructure` describing the first violated invariant.
    pub fn verify_integrity(&self, tx: &mut dyn KvTransaction) -> Result<()> {
        // Level 0: positions are 0..n, spans all 1, sentinel span 0.
        let level0 = self.level_subspace(0);
        let (begin, end) = level0.range();
        let pairs = tx.get_range(&KeyRange::new(begin, end), &RangeOptions::default())?;
        let prefix_len = level0.prefix().len();
        let mut positions: std::collections::HashMap<Vec<u8>, u64> =
            std::collections::HashMap::new();
        let mut next_pos = 0u64;
        for (key, value) in &pairs {
            let suffix = key[prefix_len..].to_vec();
            let span = decode_span(value)?;
            if suffix == Self::sentinel_suffix() {
                if span != 0 {
                    return Err(Error::InvalidStructure(format!(
                        "level-0 sentinel span is {}, expected 0",
                        span
                    )));
                }
                continue;
            }
            if span != 1 {
                return Err(Error::InvalidStructure(format!(
                    "level-0 span is {}, expected 1",
                    span
                )));
            }
            positions.insert(suffix, next_pos);
            next_pos += 1;
        }
        let total = next_pos;
        let counted = self.count(tx)?;
        if counted != total {
            return Err(Error::InvalidStructure(format!(
                "count metadata says {}, level 0 holds {}",
                counted, total
            )));
        }

        for level in 1..self.num_levels {
            let level_sub = self.level_subspace(level);
            let (begin, end) = level_sub.range();
            let pairs = tx.get_range(&KeyRange::new(begin, end), &RangeOptions::default())?;
            let prefix_len = level_sub.prefix().len();
            let mut running = 0u64;
            let mut saw_sentinel = false;
            for (key, value) in &pairs {
                let suffix = key[prefix_len..].to_vec();
                let span = decode_span(value)?;
                if suffix == Self::sentinel_suffix() {
                    saw_sentinel = true;
                    running = span.max(0) as u64;
                    continue;
                }
                let pos = positions.get(&suffix).ok_or_else(|| {
                    Error::InvalidStructure(format!(
                        "level-{} entry is missing from level 0",
                        level
                    ))
                })?;
                if *pos != running {
                    return Err(Error::InvalidStructure(format!(
                        "level-{} prefix spans sum to {}, entry sits at rank {}",
                        level, running, pos
                    )));
                }
                running += span.max(0) as u64;
            }
            if !saw_sentinel && !pairs.is_empty() {
                return Err(Error::InvalidStructure(format!(
                    "level {} has entries but no sentinel",
                    level
                )));
            }
            if saw_sentinel && running != total {
                return Err(Error::InvalidStructure(format!(
                    "level-{} spans sum to {}, total is {}",
                    level, running, total
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use facet_kv::MemoryDatabase;

    fn list() -> SkipList {
        SkipList::new(
            Subspace::from_tuple(&Tuple::new().with("I").with("score_rank")),
            8,
            LevelStrategy::Probabilistic,
        )
    }

    fn pk(name: &str) -> Tuple {
        Tuple::new().with(name)
    }

    fn seed(db: &MemoryDatabase, sl: &SkipList, entries: &[(i64, &str)]) {
        db.run(|tx| {
            for (score, who) in entries {
                sl.insert(tx, Score::Int(*score), &pk(who))?;
            }
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn ranks_follow_descending_score_with_pk_ties() {
        let db = MemoryDatabase::new();
        let sl = list();
        seed(&db, &sl, &[(50, "A"), (30, "B"), (70, "C"), (30, "D"), (90, "E")]);

        db.run(|tx| {
            assert_eq!(sl.rank_of(tx, Score::Int(90), &pk("E"))?, Some(0));
            assert_eq!(sl.rank_of(tx, Score::Int(70), &pk("C"))?, Some(1));
            assert_eq!(sl.rank_of(tx, Score::Int(50), &pk("A"))?, Some(2));
            assert_eq!(sl.rank_of(tx, Score::Int(30), &pk("B"))?, Some(3));
            assert_eq!(sl.rank_of(tx, Score::Int(30), &pk("D"))?, Some(4));
            assert_eq!(sl.count(tx)?, 5);
            sl.verify_integrity(tx)
        })
        .unwrap();
    }

    #[test]
    fn top_k_returns_best_first() {
        let db = MemoryDatabase::new();
        let sl = list();
        seed(&db, &sl, &[(50, "A"), (30, "B"), (70, "C"), (30, "D"), (90, "E")]);
        db.run(|tx| {
            let top = sl.top_k(tx, 3)?;
            let expected = vec![
                (Score::Int(90), pk("E")),
                (Score::Int(70), pk("C")),
                (Score::Int(50), pk("A")),
            ];
            assert_eq!(top, expected);
            // Requesting more than present returns everything.
            assert_eq!(sl.top_k(tx, 10)?.len(), 5);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn delete_reranks_and_keeps_spans_valid() {
        let db = MemoryDatabase::new();
        let sl = list();
        seed(&db, &sl, &[(50, "A"), (30, "B"), (70, "C"), (30, "D"), (90, "E")]);
        db.run(|tx| sl.remove(tx, Score::Int(70), &pk("C"))).unwrap();
        db.run(|tx| {
            assert_eq!(sl.rank_of(tx, Score::Int(90), &pk("E"))?, Some(0));
            assert_eq!(sl.rank_of(tx, Score::Int(50), &pk("A"))?, Some(1));
            assert_eq!(sl.rank_of(tx, Score::Int(30), &pk("B"))?, Some(2));
            assert_eq!(sl.rank_of(tx, Score::Int(30), &pk("D"))?, Some(3));
            assert_eq!(sl.rank_of(tx, Score::Int(70), &pk("C"))?, None);
            assert_eq!(sl.count(tx)?, 4);
            sl.verify_integrity(tx)
        })
        .unwrap();
    }

    #[test]
    fn remove_missing_is_not_found() {
        let db = MemoryDatabase::new();
        let sl = list();
        seed(&db, &sl, &[(10, "A")]);
        let err = db
            .run(|tx| sl.remove(tx, Score::Int(99), &pk("Z")))
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn reinsert_is_idempotent() {
        let db = MemoryDatabase::new();
        let sl = list();
        seed(&db, &sl, &[(10, "A"), (20, "B")]);
        seed(&db, &sl, &[(10, "A")]);
        db.run(|tx| {
            assert_eq!(sl.count(tx)?, 2);
            sl.verify_integrity(tx)
        })
        .unwrap();
    }

    #[test]
    fn ranked_range_consumes_from_offset() {
        let db = MemoryDatabase::new();
        let sl = list();
        let entries: Vec<(i64, String)> =
            (0..40).map(|i| (i * 3, format!("pk{:02}", i))).collect();
        db.run(|tx| {
            for (score, who) in &entries {
                sl.insert(tx, Score::Int(*score), &pk(who))?;
            }
            Ok(())
        })
        .unwrap();

        db.run(|tx| {
            // Rank r holds score (39 - r) * 3.
            let slice = sl.entries_by_rank(tx, 5, 4)?;
            let scores: Vec<i64> = slice
                .iter()
                .map(|(s, _)| match s {
                    Score::Int(v) => *v,
                    Score::Double(v) => *v as i64,
                })
                .collect();
            assert_eq!(scores, vec![102, 99, 96, 93]);
            // Past the end yields a short slice.
            assert_eq!(sl.entries_by_rank(tx, 38, 10)?.len(), 2);
            assert!(sl.entries_by_rank(tx, 40, 3)?.is_empty());
            sl.verify_integrity(tx)
        })
        .unwrap();
    }

    #[test]
    fn random_churn_preserves_invariants() {
        let db = MemoryDatabase::new();
        let sl = list();
        let mut present: Vec<(i64, String)> = Vec::new();
        let mut rng = StdRng::seed_from_u64(7);

        for round in 0..120 {
            if !present.is_empty() && rng.gen_bool(0.35) {
                let idx = rng.gen_range(0..present.len());
                let (score, who) = present.swap_remove(idx);
                db.run(|tx| sl.remove(tx, Score::Int(score), &pk(&who)))
                    .unwrap();
            } else {
                let score = rng.gen_range(-50i64..50);
                let who = format!("pk{:03}", round);
                db.run(|tx| sl.insert(tx, Score::Int(score), &pk(&who)))
                    .unwrap();
                present.push((score, who));
            }
        }

        // Expected ranks: descending score, ties by PK ascending.
        let mut expected = present.clone();
        expected.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));

        db.run(|tx| {
            sl.verify_integrity(tx)?;
            assert_eq!(sl.count(tx)?, expected.len() as u64);
            for (rank, (score, who)) in expected.iter().enumerate() {
                assert_eq!(
                    sl.rank_of(tx, Score::Int(*score), &pk(who))?,
                    Some(rank as u64),
                    "rank of ({}, {})",
                    score,
                    who
                );
            }
            let everyone = sl.entries_by_rank(tx, 0, expected.len())?;
            assert_eq!(everyone.len(), expected.len());
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn deterministic_levels_behave() {
        let db = MemoryDatabase::new();
        let sl = SkipList::new(
            Subspace::from_tuple(&Tuple::new().with("I").with("det_rank")),
            6,
            LevelStrategy::Deterministic,
        );
        db.run(|tx| {
            for i in 0..30i64 {
                sl.insert(tx, Score::Int(i), &pk(&format!("p{:02}", i)))?;
            }
            Ok(())
        })
        .unwrap();
        db.run(|tx| {
            sl.verify_integrity(tx)?;
            assert_eq!(sl.rank_of(tx, Score::Int(29), &pk("p29"))?, Some(0));
            assert_eq!(sl.rank_of(tx, Score::Int(0), &pk("p00"))?, Some(29));
            Ok(())
        })
        .unwrap();
    }
}

//! Restartable range streams
//!
//! A [`RangeStream`] is a cursor over a key range that pulls bounded
//! batches through whatever transaction the caller hands it. The cursor
//! itself is plain data: after a transaction retry (or across transaction
//! boundaries during a long backfill) the caller resumes the same stream
//! with a fresh transaction and it continues from the last key it
//! yielded. Callers must not assume a single scan spans transaction
//! boundaries atomically; each batch sees the snapshot of the transaction
//! that fetched it.

use facet_core::Result;

use crate::adapter::{KeyRange, KvPair, KvTransaction, RangeOptions};

/// Default number of pairs fetched per batch
pub const DEFAULT_BATCH_SIZE: usize = 256;

/// A restartable cursor over a key range
#[derive(Debug, Clone)]
pub struct RangeStream {
    remaining: KeyRange,
    reverse: bool,
    snapshot: bool,
    batch_size: usize,
    exhausted: bool,
}

impl RangeStream {
    /// Create a forward stream over `range`
    pub fn forward(range: KeyRange) -> Self {
        Self {
            remaining: range,
            reverse: false,
            snapshot: false,
            batch_size: DEFAULT_BATCH_SIZE,
            exhausted: false,
        }
    }

    /// Create a reverse stream over `range`
    pub fn reverse(range: KeyRange) -> Self {
        Self {
            remaining: range,
            reverse: true,
            snapshot: false,
            batch_size: DEFAULT_BATCH_SIZE,
            exhausted: false,
        }
    }

    /// Use snapshot reads (no conflict ranges) for every batch
    pub fn snapshot(mut self) -> Self {
        self.snapshot = true;
        self
    }

    /// Override the per-batch fetch size
    pub fn batch_size(mut self, size: usize) -> Self {
        self.batch_size = size.max(1);
        self
    }

    /// Whether the stream has yielded its final batch
    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Fetch the next batch through `tx`
    ///
    /// Returns an empty vector once the range is exhausted. The stream
    /// advances past every key it returns, so the same batch is never
    /// yielded twice even when consecutive calls use different
    /// transactions.
    ///
    /// # Errors
    ///
    /// Propagates transaction failures; the stream does not advance on
    /// error and the failed batch can be re-fetched.
    pub fn next_batch(&mut self, tx: &mut dyn KvTransaction) -> Result<Vec<KvPair>> {
        if self.exhausted || self.remaining.is_empty() {
            self.exhausted = true;
            return Ok(Vec::new());
        }
        let options = RangeOptions {
            limit: Some(self.batch_size),
            reverse: self.reverse,
            snapshot: self.snapshot,
        };
        let batch = tx.get_range(&self.remaining, &options)?;
        if batch.len() < self.batch_size {
            self.exhausted = true;
        }
        if let Some((last_key, _)) = batch.last() {
            if self.reverse {
                // Continue strictly before the smallest key seen.
                self.remaining.end = last_key.clone();
            } else {
                // Continue strictly after the largest key seen.
                self.remaining.begin = key_successor(last_key);
            }
        }
        Ok(batch)
    }
}

/// The immediate successor of `key` in byte order
pub fn key_successor(key: &[u8]) -> Vec<u8> {
    let mut next = key.to_vec();
    next.push(0x00);
    next
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryDatabase;

    fn seed(db: &MemoryDatabase, count: usize) {
        db.run(|tx| {
            for i in 0..count {
                tx.set(format!("s/{:04}", i).as_bytes(), &[i as u8]);
            }
            Ok(())
        })
        .unwrap();
    }

    fn full_range() -> KeyRange {
        KeyRange::new(b"s/".to_vec(), b"s0".to_vec())
    }

    #[test]
    fn forward_stream_yields_everything_once() {
        let db = MemoryDatabase::new();
        seed(&db, 10);
        let mut stream = RangeStream::forward(full_range()).batch_size(3);
        let mut seen = Vec::new();
        let mut tx = db.begin();
        loop {
            let batch = stream.next_batch(&mut tx).unwrap();
            if batch.is_empty() {
                break;
            }
            seen.extend(batch.into_iter().map(|(k, _)| k));
        }
        assert_eq!(seen.len(), 10);
        let mut sorted = seen.clone();
        sorted.sort();
        assert_eq!(seen, sorted);
    }

    #[test]
    fn reverse_stream_descends() {
        let db = MemoryDatabase::new();
        seed(&db, 7);
        let mut stream = RangeStream::reverse(full_range()).batch_size(2);
        let mut seen = Vec::new();
        let mut tx = db.begin();
        loop {
            let batch = stream.next_batch(&mut tx).unwrap();
            if batch.is_empty() {
                break;
            }
            seen.extend(batch.into_iter().map(|(k, _)| k));
        }
        assert_eq!(seen.len(), 7);
        let mut sorted = seen.clone();
        sorted.sort_by(|a, b| b.cmp(a));
        assert_eq!(seen, sorted);
    }

    #[test]
    fn stream_resumes_across_transactions() {
        let db = MemoryDatabase::new();
        seed(&db, 6);
        let mut stream = RangeStream::forward(full_range()).batch_size(4);

        let mut tx = db.begin();
        let first = stream.next_batch(&mut tx).unwrap();
        assert_eq!(first.len(), 4);
        drop(tx);

        // A brand-new transaction picks up exactly where the first left off.
        let mut tx = db.begin();
        let second = stream.next_batch(&mut tx).unwrap();
        assert_eq!(second.len(), 2);
        assert!(first.last().unwrap().0 < second.first().unwrap().0);
        assert!(stream.is_exhausted());
    }
}

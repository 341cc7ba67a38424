//! Versioned history indexes
//!
//! Every write of a participating record appends a versionstamp-keyed
//! entry holding the record's serialized bytes; deletion appends a
//! tombstone. An auxiliary latest-pointer is updated in the same
//! transaction through `SetVersionstampedValue`, so reading the newest
//! version costs one KV read:
//!
//! ```text
//! <subspace> + "v" + <PK> + <versionstamp>  ->  0x01 + record bytes
//!                                               0x00 (tombstone)
//! <subspace> + "l" + <PK>                   ->  10-byte versionstamp
//! ```
//!
//! Retention is evaluated on every write. `KeepLast(N)` trims by a
//! descending scan; `KeepForDuration(D)` resolves entry ages through the
//! store's version-to-time mapping and trims everything older than
//! `now - D`.

use chrono::Utc;
use tracing::trace;

use facet_catalog::{IndexDescriptor, IndexKind, RecordView, RetentionPolicy};
use facet_core::{Error, Result, Subspace, Tuple, TupleValue, Versionstamp};
use facet_kv::{
    versionstamped_key_param, versionstamped_value_param, AtomicOp, KeyRange, KvTransaction,
    RangeOptions,
};

use crate::maintainer::IndexMaintainer;

const PAYLOAD_PRESENT: u8 = 0x01;
const PAYLOAD_TOMBSTONE: u8 = 0x00;

/// One historical version of a record
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    /// Commit-assigned versionstamp
    pub versionstamp: Versionstamp,
    /// The record bytes, or `None` for a deletion tombstone
    pub record: Option<Vec<u8>>,
}

/// Maintainer and read path for versioned history
#[derive(Debug, Clone)]
pub struct VersionIndex {
    name: String,
    subspace: Subspace,
    retention: RetentionPolicy,
}

impl VersionIndex {
    /// Build from a version descriptor
    pub fn for_descriptor(descriptor: &IndexDescriptor) -> Self {
        let retention = match &descriptor.kind {
            IndexKind::Version { retention } => retention.clone(),
            _ => RetentionPolicy::KeepAll,
        };
        Self {
            name: descriptor.name.clone(),
            subspace: descriptor.subspace(),
            retention,
        }
    }

    fn history_subspace(&self, pk: &Tuple) -> Subspace {
        self.subspace.child("v").subspace(pk)
    }

    fn latest_key(&self, pk: &Tuple) -> Vec<u8> {
        self.subspace.child("l").pack(pk)
    }

    /// Append one version entry and refresh the latest pointer
    fn append(&self, tx: &mut dyn KvTransaction, pk: &Tuple, payload: Vec<u8>) {
        let placeholder = Versionstamp::incomplete(0);
        let template = self
            .history_subspace(pk)
            .pack(&Tuple::new().with(placeholder));
        // The 10 stamp bytes sit at the end of the packed key, after the
        // versionstamp type code.
        let offset = (template.len() - 10) as u32;
        tx.atomic_op(
            &versionstamped_key_param(&template, offset),
            &payload,
            AtomicOp::SetVersionstampedKey,
        );
        tx.atomic_op(
            &self.latest_key(pk),
            &versionstamped_value_param(placeholder.as_bytes(), 0),
            AtomicOp::SetVersionstampedValue,
        );
    }

    /// Trim history per the retention policy
    fn apply_retention(&self, tx: &mut dyn KvTransaction, pk: &Tuple) -> Result<()> {
        match &self.retention {
            RetentionPolicy::KeepAll => Ok(()),
            RetentionPolicy::KeepLast { count } => {
                // The incoming write is invisible until commit, so retain
                // count-1 persisted entries alongside it.
                let keep = (*count as usize).saturating_sub(1);
                let scope = self.history_subspace(pk);
                let (begin, end) = scope.range();
                let entries = tx.get_range(
                    &KeyRange::new(begin, end),
                    &RangeOptions {
                        limit: None,
                        reverse: true,
                        snapshot: false,
                    },
                )?;
                for (key, _) in entries.into_iter().skip(keep) {
                    tx.clear(&key);
                }
                Ok(())
            }
            RetentionPolicy::KeepForDuration { max_age } => {
                let age = chrono::Duration::from_std(*max_age).map_err(|_| {
                    Error::InvalidStructure(format!(
                        "index '{}': retention duration out of range",
                        self.name
                    ))
                })?;
                let cutoff = Utc::now() - age;
                let scope = self.history_subspace(pk);
                let (begin, end) = scope.range();
                let entries =
                    tx.get_range(&KeyRange::new(begin, end), &RangeOptions::default())?;
                for (key, _) in entries {
                    let stamp = self.decode_stamp(&scope, &key)?;
                    let committed =
                        tx.approximate_time_for_version(stamp.transaction_version())?;
                    match committed {
                        Some(at) if at < cutoff => {
                            trace!(
                                target: "facet::index",
                                index = %self.name,
                                "retention trimmed an aged version"
                            );
                            tx.clear(&key);
                        }
                        // Entries are scanned oldest-first; the first
                        // survivor ends the trim.
                        _ => break,
                    }
                }
                Ok(())
            }
        }
    }

    fn decode_stamp(&self, scope: &Subspace, key: &[u8]) -> Result<Versionstamp> {
        match scope.unpack(key)?.values().first() {
            Some(TupleValue::Versionstamp(stamp)) => Ok(*stamp),
            _ => Err(Error::InvalidStructure(format!(
                "index '{}': malformed history key",
                self.name
            ))),
        }
    }

    fn decode_payload(&self, raw: &[u8]) -> Result<Option<Vec<u8>>> {
        match raw.split_first() {
            Some((&PAYLOAD_PRESENT, body)) => Ok(Some(body.to_vec())),
            Some((&PAYLOAD_TOMBSTONE, _)) => Ok(None),
            _ => Err(Error::InvalidStructure(format!(
                "index '{}': malformed history payload",
                self.name
            ))),
        }
    }

    /// The newest versionstamp for `pk`; one KV read
    ///
    /// # Errors
    ///
    /// KV and decode errors propagate.
    pub fn get_latest_version(
        &self,
        tx: &mut dyn KvTransaction,
        pk: &Tuple,
    ) -> Result<Option<Versionstamp>> {
        match tx.get(&self.latest_key(pk), false)? {
            None => Ok(None),
            Some(raw) => Versionstamp::from_bytes(&raw).map(Some),
        }
    }

    /// Version history for `pk`, newest first
    ///
    /// # Errors
    ///
    /// KV and decode errors propagate.
    pub fn get_version_history(
        &self,
        tx: &mut dyn KvTransaction,
        pk: &Tuple,
        limit: Option<usize>,
    ) -> Result<Vec<HistoryEntry>> {
        let scope = self.history_subspace(pk);
        let (begin, end) = scope.range();
        let entries = tx.get_range(
            &KeyRange::new(begin, end),
            &RangeOptions {
                limit,
                reverse: true,
                snapshot: false,
            },
        )?;
        let mut out = Vec::with_capacity(entries.len());
        for (key, raw) in entries {
            out.push(HistoryEntry {
                versionstamp: self.decode_stamp(&scope, &key)?,
                record: self.decode_payload(&raw)?,
            });
        }
        Ok(out)
    }
}

impl IndexMaintainer for VersionIndex {
    fn update(
        &self,
        tx: &mut dyn KvTransaction,
        old: Option<&RecordView>,
        new: Option<&RecordView>,
    ) -> Result<()> {
        let (pk, payload) = match (old, new) {
            (_, Some(record)) => {
                let mut payload = vec![PAYLOAD_PRESENT];
                if let Some(bytes) = record.raw_bytes() {
                    payload.extend_from_slice(bytes);
                }
                (record.primary_key().clone(), payload)
            }
            (Some(record), None) => (record.primary_key().clone(), vec![PAYLOAD_TOMBSTONE]),
            (None, None) => return Ok(()),
        };
        self.apply_retention(tx, &pk)?;
        self.append(tx, &pk, payload);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use facet_kv::MemoryDatabase;
    use std::time::Duration;

    fn index(retention: RetentionPolicy) -> VersionIndex {
        let descriptor = IndexDescriptor::new(
            "doc_history",
            IndexKind::Version { retention },
            facet_catalog::KeyExpression::Versionstamp,
        );
        VersionIndex::for_descriptor(&descriptor)
    }

    fn doc(body: &str) -> RecordView {
        RecordView::new("doc", Tuple::new().with("doc1"))
            .with_field("body", body)
            .with_raw_bytes(body.as_bytes().to_vec())
    }

    fn pk() -> Tuple {
        Tuple::new().with("doc1")
    }

    #[test]
    fn keep_last_retains_newest_five() {
        let db = MemoryDatabase::new();
        let index = index(RetentionPolicy::KeepLast { count: 5 });
        for i in 0..10 {
            db.run(|tx| index.update(tx, None, Some(&doc(&format!("v{}", i)))))
                .unwrap();
        }
        db.run(|tx| {
            let history = index.get_version_history(tx, &pk(), None)?;
            assert_eq!(history.len(), 5);
            // Newest first, strictly decreasing stamps.
            for pair in history.windows(2) {
                assert!(pair[0].versionstamp > pair[1].versionstamp);
            }
            assert_eq!(history[0].record.as_deref(), Some(b"v9".as_slice()));
            assert_eq!(history[4].record.as_deref(), Some(b"v5".as_slice()));
            let latest = index.get_latest_version(tx, &pk())?.expect("latest");
            assert_eq!(latest, history[0].versionstamp);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn deletion_appends_a_tombstone() {
        let db = MemoryDatabase::new();
        let index = index(RetentionPolicy::KeepAll);
        db.run(|tx| index.update(tx, None, Some(&doc("alive"))))
            .unwrap();
        db.run(|tx| index.update(tx, Some(&doc("alive")), None))
            .unwrap();
        db.run(|tx| {
            let history = index.get_version_history(tx, &pk(), None)?;
            assert_eq!(history.len(), 2);
            assert_eq!(history[0].record, None);
            assert_eq!(history[1].record.as_deref(), Some(b"alive".as_slice()));
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn history_limit_truncates() {
        let db = MemoryDatabase::new();
        let index = index(RetentionPolicy::KeepAll);
        for i in 0..4 {
            db.run(|tx| index.update(tx, None, Some(&doc(&format!("v{}", i)))))
                .unwrap();
        }
        db.run(|tx| {
            let history = index.get_version_history(tx, &pk(), Some(2))?;
            assert_eq!(history.len(), 2);
            assert_eq!(history[0].record.as_deref(), Some(b"v3".as_slice()));
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn keep_for_duration_trims_aged_versions() {
        let db = MemoryDatabase::new();
        let index = index(RetentionPolicy::KeepForDuration {
            max_age: Duration::from_secs(3600),
        });
        db.run(|tx| index.update(tx, None, Some(&doc("old"))))
            .unwrap();
        let old_version = db.current_version();
        db.backdate_version_for_testing(old_version, Utc::now() - chrono::Duration::hours(2));

        db.run(|tx| index.update(tx, None, Some(&doc("new"))))
            .unwrap();
        db.run(|tx| {
            let history = index.get_version_history(tx, &pk(), None)?;
            assert_eq!(history.len(), 1);
            assert_eq!(history[0].record.as_deref(), Some(b"new".as_slice()));
            Ok(())
        })
        .unwrap();
    }
}

//! The maintainer protocol and kind dispatch
//!
//! Every index kind implements [`IndexMaintainer`]. Both operations take a
//! live transaction and execute only KV primitives; nothing escapes the
//! transaction, and a maintainer holds no cross-transaction mutable state,
//! so a retried transaction replays deterministically.
//!
//! Maintainers are built from the persisted descriptor tag at
//! construction time ([`build_maintainer`]); the on-disk representation is
//! never a language-level type parameter.

use facet_catalog::{IndexDescriptor, IndexKind, RecordView};
use facet_core::{KernelConfig, Result};
use facet_kv::KvTransaction;

use crate::aggregate::{AggregateIndex, AggregateKind};
use crate::bitmap::BitmapIndex;
use crate::extremum::{ExtremumIndex, ExtremumKind};
use crate::percentile::PercentileIndex;
use crate::rank::{LeaderboardIndex, RankIndex};
use crate::value_index::ValueIndex;
use crate::version::VersionIndex;

/// Per-kind transformation of record deltas into KV operations
pub trait IndexMaintainer {
    /// Apply the index delta for a record change
    ///
    /// `(None, Some)` is an insert, `(Some, None)` a delete and
    /// `(Some, Some)` an update. When old and new agree on every field
    /// the key expression reads, no KV writes are emitted.
    ///
    /// # Errors
    ///
    /// `SchemaMismatch` when field extraction fails; `UniquenessViolation`
    /// in immediate mode; KV errors propagate.
    fn update(
        &self,
        tx: &mut dyn KvTransaction,
        old: Option<&RecordView>,
        new: Option<&RecordView>,
    ) -> Result<()>;

    /// (Re-)derive one record's entries during online backfill
    ///
    /// Produces exactly the keys `update(None, Some(record))` would.
    /// Structure-backed kinds (value, bitmap, rank, version latest) are
    /// safe to re-run on already-present entries; counter-backed kinds
    /// rely on the builder's cursor for exactly-once delivery.
    ///
    /// # Errors
    ///
    /// As for [`IndexMaintainer::update`].
    fn scan_item(&self, tx: &mut dyn KvTransaction, record: &RecordView) -> Result<()> {
        self.update(tx, None, Some(record))
    }
}

/// Build the maintainer for a descriptor
///
/// Dispatches on the persisted kind tag; parameters not carried by the
/// descriptor fall back to `config` defaults.
pub fn build_maintainer(
    descriptor: &IndexDescriptor,
    config: &KernelConfig,
) -> Box<dyn IndexMaintainer> {
    match &descriptor.kind {
        IndexKind::Scalar | IndexKind::Compound | IndexKind::Permuted { .. } => {
            Box::new(ValueIndex::for_descriptor(descriptor))
        }
        IndexKind::Bitmap => Box::new(BitmapIndex::for_descriptor(descriptor)),
        IndexKind::Count => Box::new(AggregateIndex::for_descriptor(
            descriptor,
            AggregateKind::Count,
        )),
        IndexKind::Sum { value_type } => Box::new(AggregateIndex::for_descriptor(
            descriptor,
            AggregateKind::Sum { tag: *value_type },
        )),
        IndexKind::Average { value_type } => Box::new(AggregateIndex::for_descriptor(
            descriptor,
            AggregateKind::Average { tag: *value_type },
        )),
        IndexKind::Min { value_type } => Box::new(ExtremumIndex::for_descriptor(
            descriptor,
            ExtremumKind::Min,
            *value_type,
        )),
        IndexKind::Max { value_type } => Box::new(ExtremumIndex::for_descriptor(
            descriptor,
            ExtremumKind::Max,
            *value_type,
        )),
        IndexKind::Rank { .. } => Box::new(RankIndex::for_descriptor(descriptor, config)),
        IndexKind::TimeWindowLeaderboard { .. } => {
            Box::new(LeaderboardIndex::for_descriptor(descriptor, config))
        }
        IndexKind::Percentile { .. } => Box::new(PercentileIndex::for_descriptor(descriptor)),
        IndexKind::Version { .. } => Box::new(VersionIndex::for_descriptor(descriptor)),
    }
}

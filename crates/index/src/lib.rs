//! Index maintainers and read-side traversals
//!
//! Every index kind implements the same two-operation protocol: given a
//! record delta `(old, new)` it emits the matching KV delta inside the
//! caller's transaction, and `scan_item` re-derives a single record's
//! entries during online backfill. Read paths are inherent methods on the
//! concrete per-kind types.
//!
//! Kinds:
//!
//! - [`ValueIndex`]: scalar / compound / permuted order-preserving entries
//! - [`BitmapIndex`]: roaring bitmap of record ids per distinct value
//! - [`AggregateIndex`]: count / sum / average over atomic slots
//! - [`ExtremumIndex`]: min / max with the deletion tie-break protocol
//! - [`PercentileIndex`]: t-digest quantile sketch per group
//! - [`RankIndex`]: skip-list with span counters (rank / top-k)
//! - [`LeaderboardIndex`]: time-window bucketed rank index
//! - [`VersionIndex`]: versionstamp-keyed history per record

#![warn(clippy::all)]

pub mod aggregate;
pub mod bitmap;
pub mod codec;
pub mod extremum;
pub mod maintainer;
pub mod percentile;
pub mod rank;
pub mod unique;
pub mod value_index;
pub mod version;

pub use aggregate::{AggregateIndex, AggregateKind};
pub use bitmap::{BitmapIndex, RoaringBitmap};
pub use codec::Score;
pub use extremum::{ExtremumIndex, ExtremumKind};
pub use maintainer::{build_maintainer, IndexMaintainer};
pub use percentile::{PercentileIndex, TDigest};
pub use rank::{LeaderboardIndex, RankIndex};
pub use unique::ViolationRecord;
pub use value_index::ValueIndex;
pub use version::VersionIndex;

//! Index descriptors: one maintained index and its parameters
//!
//! Descriptors are immutable after creation and persist inside the entity
//! schema document. The kind is a tagged variant: the source of truth on
//! disk is the tag plus per-kind parameters, never a language-level type
//! parameter, so a process can rebuild the right maintainer after restart.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use facet_core::{Subspace, Tuple, UniquenessMode};

use crate::expr::KeyExpression;

/// Erased value type carried by numeric aggregation kinds
///
/// Integers are exact; floats are maintained as scaled fixed-point with
/// six decimal places so commutative atomic addition stays well-defined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueTypeTag {
    /// 32-bit signed integer
    I32,
    /// 64-bit signed integer
    I64,
    /// 32-bit float, scaled fixed-point on disk
    F32,
    /// 64-bit float, scaled fixed-point on disk
    F64,
}

impl ValueTypeTag {
    /// Whether values of this type are floats scaled on encode
    pub fn is_float(&self) -> bool {
        matches!(self, ValueTypeTag::F32 | ValueTypeTag::F64)
    }
}

/// Skip-list level assignment strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LevelStrategy {
    /// Geometric with p = 1/2, capped by the configured maximum
    Probabilistic,
    /// Deterministic: 1 + trailing zero bits of the primary-key hash
    Deterministic,
}

/// How much history the version index retains per record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum RetentionPolicy {
    /// Keep every version forever
    #[default]
    KeepAll,
    /// Keep only the newest `count` versions
    KeepLast {
        /// Number of versions retained
        count: u32,
    },
    /// Keep versions newer than `max_age`
    KeepForDuration {
        /// Maximum age before a version is trimmed
        max_age: Duration,
    },
}

/// The kind tag plus per-kind parameters of one index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IndexKind {
    /// One entry per record under the order-preserving value key
    Scalar,
    /// Scalar over two or more concatenated fields
    Compound,
    /// Compound with a physical field permutation for alternate prefixes
    Permuted {
        /// Permutation applied to declared field order before packing
        permutation: Vec<usize>,
    },
    /// Roaring bitmap of record ids per distinct value
    Bitmap,
    /// Atomic count per group
    Count,
    /// Atomic sum per group
    Sum {
        /// Declared value type of the summed field
        value_type: ValueTypeTag,
    },
    /// Sum and count pair; quotient computed on read
    Average {
        /// Declared value type of the averaged field
        value_type: ValueTypeTag,
    },
    /// Atomic minimum per group, with deletion tie-break protocol
    Min {
        /// Declared value type of the tracked field
        value_type: ValueTypeTag,
    },
    /// Atomic maximum per group, with deletion tie-break protocol
    Max {
        /// Declared value type of the tracked field
        value_type: ValueTypeTag,
    },
    /// Skip-list rank index over a numeric score
    Rank {
        /// Nominal leaf bucket size used to recommend level counts
        bucket_size: u32,
        /// Level assignment strategy
        level_strategy: LevelStrategy,
    },
    /// Bucketed rank index keyed by a record timestamp
    TimeWindowLeaderboard {
        /// Window granularity
        window: facet_core::LeaderboardWindow,
        /// Number of retained windows
        window_count: u32,
        /// Field holding the record's timestamp in Unix seconds
        timestamp_field: String,
        /// Level assignment strategy for each bucket's skip-list
        level_strategy: LevelStrategy,
    },
    /// T-digest quantile sketch per group
    Percentile {
        /// Compression parameter (δ); centroid count is O(δ)
        compression: f64,
        /// Sub-key count for hot groups; shards are merged at read time
        #[serde(default = "one_shard")]
        shard_count: u32,
    },
    /// Versionstamp-keyed history per record
    Version {
        /// Retention evaluated on every write
        retention: RetentionPolicy,
    },
}

fn one_shard() -> u32 {
    1
}

impl IndexKind {
    /// Short lowercase tag used in logs and diagnostics
    pub fn tag(&self) -> &'static str {
        match self {
            IndexKind::Scalar => "scalar",
            IndexKind::Compound => "compound",
            IndexKind::Permuted { .. } => "permuted",
            IndexKind::Bitmap => "bitmap",
            IndexKind::Count => "count",
            IndexKind::Sum { .. } => "sum",
            IndexKind::Average { .. } => "average",
            IndexKind::Min { .. } => "min",
            IndexKind::Max { .. } => "max",
            IndexKind::Rank { .. } => "rank",
            IndexKind::TimeWindowLeaderboard { .. } => "leaderboard",
            IndexKind::Percentile { .. } => "percentile",
            IndexKind::Version { .. } => "version",
        }
    }
}

/// One maintained index: name, kind, key expression and enforcement mode
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexDescriptor {
    /// Unique index name; also the default root subspace key
    pub name: String,
    /// Kind tag and parameters
    pub kind: IndexKind,
    /// Key expression feeding the index
    pub key_expression: KeyExpression,
    /// Root subspace key under `/I/`; defaults to `name`
    pub root_subspace_key: String,
    /// Entity names whose records feed this index
    pub participating_record_types: Vec<String>,
    /// Uniqueness enforcement mode
    pub uniqueness: UniquenessMode,
}

impl IndexDescriptor {
    /// Create a descriptor with the default subspace key and no uniqueness
    pub fn new(
        name: impl Into<String>,
        kind: IndexKind,
        key_expression: KeyExpression,
    ) -> Self {
        let name = name.into();
        Self {
            root_subspace_key: name.clone(),
            name,
            kind,
            key_expression,
            participating_record_types: Vec::new(),
            uniqueness: UniquenessMode::Skip,
        }
    }

    /// Restrict the descriptor to the given entities
    pub fn for_entities(mut self, entities: &[&str]) -> Self {
        self.participating_record_types = entities.iter().map(|e| e.to_string()).collect();
        self
    }

    /// Set the uniqueness mode
    pub fn with_uniqueness(mut self, mode: UniquenessMode) -> Self {
        self.uniqueness = mode;
        self
    }

    /// Whether records of `entity` feed this index
    ///
    /// An empty participating list means "every entity that carries the
    /// descriptor", which is the common single-entity case.
    pub fn applies_to(&self, entity: &str) -> bool {
        self.participating_record_types.is_empty()
            || self.participating_record_types.iter().any(|e| e == entity)
    }

    /// The index's root subspace: `/I/<root_subspace_key>/`
    pub fn subspace(&self) -> Subspace {
        Subspace::from_tuple(
            &Tuple::new()
                .with("I")
                .with(self.root_subspace_key.as_str()),
        )
    }

    /// The violations subspace: `/I/<root>/_violations/`
    pub fn violations_subspace(&self) -> Subspace {
        self.subspace().child("_violations")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_tags_are_stable_in_json() {
        let kind = IndexKind::Sum {
            value_type: ValueTypeTag::I64,
        };
        let json = serde_json::to_string(&kind).unwrap();
        assert_eq!(json, r#"{"kind":"sum","value_type":"i64"}"#);
        let back: IndexKind = serde_json::from_str(&json).unwrap();
        assert_eq!(back, kind);
    }

    #[test]
    fn retention_round_trips() {
        for policy in [
            RetentionPolicy::KeepAll,
            RetentionPolicy::KeepLast { count: 5 },
            RetentionPolicy::KeepForDuration {
                max_age: Duration::from_secs(3600),
            },
        ] {
            let json = serde_json::to_string(&policy).unwrap();
            let back: RetentionPolicy = serde_json::from_str(&json).unwrap();
            assert_eq!(back, policy);
        }
    }

    #[test]
    fn applies_to_defaults_to_all_entities() {
        let d = IndexDescriptor::new(
            "by_email",
            IndexKind::Scalar,
            KeyExpression::field("email"),
        );
        assert!(d.applies_to("user"));
        let d = d.for_entities(&["user"]);
        assert!(d.applies_to("user"));
        assert!(!d.applies_to("order"));
    }

    #[test]
    fn subspaces_are_disjoint_per_index() {
        let a = IndexDescriptor::new("a", IndexKind::Count, KeyExpression::field("x"));
        let b = IndexDescriptor::new("b", IndexKind::Count, KeyExpression::field("x"));
        assert_ne!(a.subspace(), b.subspace());
        assert!(a
            .violations_subspace()
            .prefix()
            .starts_with(a.subspace().prefix()));
    }
}

//! Facet: a secondary-index maintenance and query kernel
//!
//! Facet layers maintained auxiliary structures (scalar and permuted
//! value indexes, roaring-bitmap indexes, grouped aggregates, rank
//! skip-lists with span counters, percentile sketches and versioned
//! history) on top of any ordered key/value store that offers
//! transactions, snapshot reads, atomic mutations and commit-assigned
//! versionstamps. Predicate, range, ranking, aggregation and time-travel
//! queries then run in time proportional to result size.
//!
//! This facade re-exports the public surface of the workspace crates:
//!
//! - [`facet_core`]: tuples, subspaces, versionstamps, errors, config
//! - [`facet_kv`]: the KV adapter contract and the in-memory store
//! - [`facet_catalog`]: schemas, descriptors, key expressions, state
//! - [`facet_index`]: the per-kind maintainers and read paths
//! - [`facet_engine`]: the kernel orchestrator, query routing, backfill
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use std::time::Duration;
//! use facetdb::{
//!     EntitySchema, FieldType, IndexDescriptor, IndexKernel, IndexKind,
//!     KernelConfig, KeyExpression, MemoryDatabase, RecordView, ScanLimits,
//!     SchemaCatalog, Tuple,
//! };
//!
//! let db = MemoryDatabase::new();
//! let catalog = Arc::new(SchemaCatalog::new(Duration::from_secs(300)));
//! let schema = EntitySchema::new("user")
//!     .with_field("email", FieldType::String, false, false)
//!     .with_index(IndexDescriptor::new(
//!         "user_email",
//!         IndexKind::Scalar,
//!         KeyExpression::field("email"),
//!     ));
//! db.run(|tx| catalog.persist_schema(tx, &schema)).unwrap();
//!
//! let kernel = IndexKernel::new(catalog, KernelConfig::default());
//! let alice = RecordView::new("user", Tuple::new().with("u1"))
//!     .with_field("email", "alice@example.com");
//! db.run(|tx| kernel.apply(tx, None, Some(&alice))).unwrap();
//!
//! let hits = db
//!     .run(|tx| {
//!         kernel.scan_index_prefix(
//!             tx,
//!             &schema,
//!             "user_email",
//!             &Tuple::new().with("alice@example.com"),
//!             &ScanLimits::default(),
//!         )
//!     })
//!     .unwrap();
//! assert_eq!(hits.items, vec![Tuple::new().with("u1")]);
//! ```

pub use facet_core::{
    Error, KernelConfig, LeaderboardWindow, LimitReason, Result, ScanLimits, ScanResult,
    Subspace, Tuple, TupleValue, UniquenessMode, Versionstamp,
};

pub use facet_kv::{
    AtomicOp, CommitMeta, KeyRange, KvTransaction, MemoryDatabase, MemoryTransaction,
    RangeOptions, RangeStream, TransactionOptions,
};

pub use facet_catalog::{
    DirectoryComponent, EntitySchema, EnumMetadata, FieldDescriptor, FieldType, FieldValue,
    IndexDescriptor, IndexKind, IndexState, IndexStateKind, KeyExpression, LevelStrategy,
    RecordView, RetentionPolicy, SchemaCatalog, ValueTypeTag,
};

pub use facet_index::{
    AggregateIndex, AggregateKind, BitmapIndex, ExtremumIndex, ExtremumKind, IndexMaintainer,
    LeaderboardIndex, PercentileIndex, RankIndex, RoaringBitmap, Score, TDigest, ValueIndex,
    VersionIndex,
};

pub use facet_engine::{
    AggregateFunction, AggregateValue, IndexKernel, OnlineIndexBuilder, RecordSource,
    TransactionRunner,
};

//! Index catalog: persisted schemas, descriptors and lifecycle state
//!
//! The catalog is the kernel's source of truth for what indexes exist and
//! how records feed them:
//!
//! - [`EntitySchema`]: per-entity field layout, enum metadata and the
//!   index descriptors attached to the entity
//! - [`IndexDescriptor`] / [`IndexKind`]: one maintained index, its kind
//!   tag and per-kind parameters (the on-disk representation is tag-based
//!   so it survives restart)
//! - [`KeyExpression`]: pure functions from a record to ordered key tuples
//! - [`RecordView`] / [`FieldValue`]: the kernel's window onto a record,
//!   a primary-key tuple plus named field values
//! - [`IndexState`]: Disabled / WriteOnly / ReadWrite lifecycle marker
//! - [`SchemaCatalog`]: read-through, TTL-cached access on top of a live
//!   transaction
//!
//! Schemas persist under `/_schema/<entity>` as JSON with deterministic
//! key order; index state under `/I/<name>/_state`.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cache;
pub mod catalog;
pub mod descriptor;
pub mod expr;
pub mod record;
pub mod schema;
pub mod state;

pub use catalog::SchemaCatalog;
pub use descriptor::{
    IndexDescriptor, IndexKind, LevelStrategy, RetentionPolicy, ValueTypeTag,
};
pub use expr::KeyExpression;
pub use record::{FieldValue, RecordView};
pub use schema::{DirectoryComponent, EntitySchema, EnumMetadata, FieldDescriptor, FieldType};
pub use state::{IndexState, IndexStateKind};

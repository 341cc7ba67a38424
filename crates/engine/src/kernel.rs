//! Mutation fan-out over the index catalog

use std::sync::Arc;
use tracing::{debug, trace};

use facet_catalog::{RecordView, SchemaCatalog};
use facet_core::{Error, KernelConfig, Result};
use facet_index::build_maintainer;
use facet_kv::KvTransaction;

/// The kernel's entry point: catalog-driven index maintenance
///
/// One kernel per process is typical; it owns the catalog handle and the
/// configuration, and is free of per-transaction state, so concurrent
/// callers share it behind an `Arc`.
#[derive(Debug)]
pub struct IndexKernel {
    catalog: Arc<SchemaCatalog>,
    config: KernelConfig,
}

impl IndexKernel {
    /// Create a kernel over `catalog` with `config`
    pub fn new(catalog: Arc<SchemaCatalog>, config: KernelConfig) -> Self {
        Self { catalog, config }
    }

    /// The catalog handle
    pub fn catalog(&self) -> &SchemaCatalog {
        &self.catalog
    }

    /// The kernel configuration
    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    /// Apply a record mutation to every participating index
    ///
    /// `(None, Some)` inserts, `(Some, None)` deletes, `(Some, Some)`
    /// updates. Indexes in `Disabled` state are skipped; `WriteOnly`
    /// indexes are maintained but not readable. Any maintainer error,
    /// including an immediate-mode uniqueness violation, aborts the
    /// whole fan-out, so sibling indexes never observe the half-applied
    /// record once the caller drops the transaction.
    ///
    /// # Errors
    ///
    /// `SchemaMismatch` when old and new disagree on identity; maintainer
    /// and KV errors propagate.
    pub fn apply(
        &self,
        tx: &mut dyn KvTransaction,
        old: Option<&RecordView>,
        new: Option<&RecordView>,
    ) -> Result<()> {
        let entity = match (old, new) {
            (Some(record), _) | (None, Some(record)) => record.entity().to_string(),
            (None, None) => return Ok(()),
        };
        if let (Some(old), Some(new)) = (old, new) {
            if old.entity() != new.entity()
                || old.primary_key().pack() != new.primary_key().pack()
            {
                return Err(Error::SchemaMismatch {
                    entity,
                    detail: "old and new records disagree on identity".into(),
                });
            }
        }

        let schema = self.catalog.load_schema(tx, &entity)?;
        for descriptor in &schema.index_descriptors {
            if !descriptor.applies_to(&entity) {
                continue;
            }
            let state = self.catalog.load_index_state(tx, &descriptor.name)?;
            if !state.is_writable() {
                trace!(
                    target: "facet::kernel",
                    index = %descriptor.name,
                    "skipping disabled index"
                );
                continue;
            }
            let maintainer = build_maintainer(descriptor, &self.config);
            maintainer.update(tx, old, new)?;
            trace!(
                target: "facet::kernel",
                index = %descriptor.name,
                kind = descriptor.kind.tag(),
                "index delta applied"
            );
        }
        debug!(
            target: "facet::kernel",
            entity = %entity,
            indexes = schema.index_descriptors.len(),
            "record mutation fanned out"
        );
        Ok(())
    }

    /// Fail unless `index_name` is readable
    ///
    /// # Errors
    ///
    /// `IndexStateViolation` when the index is disabled or still
    /// write-only.
    pub fn require_readable(
        &self,
        tx: &mut dyn KvTransaction,
        index_name: &str,
    ) -> Result<()> {
        let state = self.catalog.load_index_state(tx, index_name)?;
        if !state.is_readable() {
            return Err(Error::IndexStateViolation {
                index: index_name.to_string(),
                state: state.state.to_string(),
            });
        }
        Ok(())
    }
}

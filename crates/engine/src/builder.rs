//! Online index backfill
//!
//! Building a new index over existing data runs while writers stay live:
//!
//! 1. the index enters `WriteOnly`: new mutations maintain it from now
//!    on, readers stay away
//! 2. the builder walks existing records in primary-key order, batch by
//!    batch, calling `scan_item` for each and persisting the cursor with
//!    the batch in the same transaction
//! 3. when the scan completes the index flips to `ReadWrite`
//!
//! The persisted cursor makes the build restartable: a crashed builder
//! resumes from the last committed batch. Records mutated concurrently
//! are covered either by the scan (not yet reached) or by the live
//! maintainer path (already `WriteOnly`), and structure-backed kinds
//! tolerate the overlap because `scan_item` is idempotent for them.

use tracing::{debug, info};

use facet_catalog::{IndexDescriptor, IndexState, RecordView};
use facet_core::Result;
use facet_index::build_maintainer;
use facet_kv::{KvTransaction, MemoryDatabase};

use crate::kernel::IndexKernel;

/// Default records per backfill batch
pub const DEFAULT_BUILD_BATCH: usize = 128;

/// Supplies records in primary-key order during backfill and fallback
/// aggregation
///
/// `after` is the packed primary key of the last record already
/// processed; implementations return up to `limit` records strictly
/// after it.
pub trait RecordSource {
    /// Fetch the next batch of records
    ///
    /// # Errors
    ///
    /// KV and decode errors propagate.
    fn scan(
        &self,
        tx: &mut dyn KvTransaction,
        after: Option<&[u8]>,
        limit: usize,
    ) -> Result<Vec<RecordView>>;
}

/// Runs closures inside retry-looped transactions
///
/// The builder needs one of these because a backfill spans many
/// transactions; embedders adapt whatever database handle they hold.
pub trait TransactionRunner {
    /// Run `f` in a fresh transaction, committing on success
    ///
    /// # Errors
    ///
    /// The closure's terminal error after the retry budget is spent.
    fn run_tx(&self, f: &mut dyn FnMut(&mut dyn KvTransaction) -> Result<()>) -> Result<()>;
}

impl TransactionRunner for MemoryDatabase {
    fn run_tx(&self, f: &mut dyn FnMut(&mut dyn KvTransaction) -> Result<()>) -> Result<()> {
        self.run(|tx| f(tx))
    }
}

/// Batched, restartable index backfill
#[derive(Debug)]
pub struct OnlineIndexBuilder<'a> {
    kernel: &'a IndexKernel,
    batch_size: usize,
}

impl<'a> OnlineIndexBuilder<'a> {
    /// Create a builder driving `kernel`'s catalog
    pub fn new(kernel: &'a IndexKernel) -> Self {
        Self {
            kernel,
            batch_size: DEFAULT_BUILD_BATCH,
        }
    }

    /// Override the records-per-batch size
    pub fn batch_size(mut self, size: usize) -> Self {
        self.batch_size = size.max(1);
        self
    }

    /// Build `descriptor` from `source`, leaving it readable
    ///
    /// Safe to call on a crashed build: the scan resumes from the
    /// persisted cursor instead of starting over.
    ///
    /// # Errors
    ///
    /// Maintainer and KV errors propagate; the index stays `WriteOnly`
    /// with its cursor intact so a later call can resume.
    pub fn build(
        &self,
        runner: &dyn TransactionRunner,
        source: &dyn RecordSource,
        descriptor: &IndexDescriptor,
    ) -> Result<()> {
        let catalog = self.kernel.catalog();
        let maintainer = build_maintainer(descriptor, self.kernel.config());

        // Enter WriteOnly, preserving the cursor of an interrupted build.
        runner.run_tx(&mut |tx| {
            let state = catalog.load_index_state(tx, &descriptor.name)?;
            let cursor = state.build_cursor.clone();
            catalog.store_index_state(tx, &descriptor.name, &IndexState::write_only(cursor))
        })?;
        info!(
            target: "facet::build",
            index = %descriptor.name,
            "backfill started"
        );

        let mut batches = 0usize;
        loop {
            let mut finished = false;
            runner.run_tx(&mut |tx| {
                let state = catalog.load_index_state(tx, &descriptor.name)?;
                let cursor = state.build_cursor.clone();
                let batch = source.scan(tx, cursor.as_deref(), self.batch_size)?;
                if batch.is_empty() {
                    finished = true;
                    return Ok(());
                }
                for record in &batch {
                    maintainer.scan_item(tx, record)?;
                }
                let next_cursor = batch
                    .last()
                    .map(|record| record.primary_key().pack());
                catalog.store_index_state(
                    tx,
                    &descriptor.name,
                    &IndexState::write_only(next_cursor),
                )?;
                Ok(())
            })?;
            if finished {
                break;
            }
            batches += 1;
            debug!(
                target: "facet::build",
                index = %descriptor.name,
                batches,
                "backfill batch committed"
            );
        }

        runner.run_tx(&mut |tx| {
            catalog.store_index_state(tx, &descriptor.name, &IndexState::read_write())
        })?;
        info!(
            target: "facet::build",
            index = %descriptor.name,
            batches,
            "backfill complete"
        );
        Ok(())
    }
}

//! KV adapter contract and in-memory reference store
//!
//! The index kernel talks to its backing store exclusively through the
//! [`KvTransaction`] contract defined here: snapshot reads, range scans,
//! blind writes, and commutative atomic mutations, all scoped to one
//! caller-owned transaction. Any ordered store with serializable
//! optimistic transactions can sit behind it.
//!
//! [`MemoryDatabase`] is the bundled implementation: an ordered in-memory
//! map with snapshot-at-begin isolation, first-committer-wins validation,
//! commit-time atomic ops and versionstamp assignment. It backs the test
//! suites and doubles as the executable specification of the contract.

pub mod adapter;
pub mod memory;
pub mod range;

pub use adapter::{
    versionstamped_key_param, versionstamped_value_param, AtomicOp, CommitMeta, KeyRange,
    KvPair, KvTransaction, RangeOptions, TransactionOptions,
};
pub use memory::{MemoryDatabase, MemoryTransaction};
pub use range::RangeStream;

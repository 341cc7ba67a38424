//! Core types for the Facet index kernel
//!
//! This crate defines the foundational vocabulary shared by every layer:
//! - Tuple: order-preserving composite key encoding
//! - Subspace: byte-prefix namespace with pack/unpack/range helpers
//! - Versionstamp: 10-byte monotonic commit identifier
//! - Error: the kernel-wide error taxonomy
//! - ScanLimits / LimitReason: bounded-read accounting
//! - KernelConfig: the tunable configuration surface

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod scan;
pub mod subspace;
pub mod tuple;
pub mod versionstamp;

pub use config::{KernelConfig, LeaderboardWindow, UniquenessMode};
pub use error::{Error, Result};
pub use scan::{LimitReason, ScanLimits, ScanResult};
pub use subspace::Subspace;
pub use tuple::{Tuple, TupleValue};
pub use versionstamp::Versionstamp;

//! Error types for the Facet kernel
//!
//! One unified error enum is used across all crates. Errors fall into
//! four broad groups:
//!
//! - **Schema**: descriptor and record disagree (programming errors, fatal)
//! - **Decode**: persisted bytes failed structural invariants
//! - **Index**: violations surfaced by maintainers (uniqueness, state)
//! - **Transaction**: classified failures propagated from the KV store
//!
//! Maintainers never swallow errors and never leave partial state outside
//! the caller's transaction. Callers branch on [`Error::is_retryable`] to
//! decide whether to replay the logical operation from the top.

use thiserror::Error;

/// Result type alias for kernel operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the Facet kernel
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// Descriptor and record disagree; field extraction failed
    ///
    /// This is a programming error and is never retried.
    #[error("schema mismatch for entity '{entity}': {detail}")]
    SchemaMismatch {
        /// Entity whose record failed extraction
        entity: String,
        /// What went wrong
        detail: String,
    },

    /// A scan or write supplied the wrong number of field values
    #[error("field count mismatch: expected {expected}, got {actual}")]
    FieldCountMismatch {
        /// Declared field count of the index
        expected: usize,
        /// Number of values supplied
        actual: usize,
    },

    /// A value's type is not usable where it appeared
    #[error("unsupported type: {0}")]
    UnsupportedType(String),

    /// A numeric value does not fit the declared index value type
    #[error("type conversion overflow: {value} does not fit {target}")]
    TypeConversionOverflow {
        /// Offending value, rendered for diagnostics
        value: String,
        /// Target type name
        target: &'static str,
    },

    /// A second record carries indexed values equal to an existing record's
    #[error("uniqueness violation on index '{index}': value {value} held by existing key")]
    UniquenessViolation {
        /// Index that rejected the write
        index: String,
        /// Rendered indexed value
        value: String,
        /// Packed primary key of the record already holding the value
        existing_pk: Vec<u8>,
        /// Packed primary key of the record that was rejected
        new_pk: Vec<u8>,
    },

    /// A write or read hit an index whose lifecycle state forbids it
    #[error("index '{index}' is {state} and cannot serve this operation")]
    IndexStateViolation {
        /// Index name
        index: String,
        /// Rendered state
        state: String,
    },

    /// The requested entity, entry or document does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// Decoded bytes violate a structural invariant
    #[error("invalid structure: {0}")]
    InvalidStructure(String),

    /// Persisted bytes ended before the declared length
    #[error("truncated data: {0}")]
    TruncatedData(String),

    /// A record wire tag carried an unknown wire type
    #[error("unknown wire type: {0}")]
    UnknownWireType(u8),

    /// A varint ran past its maximum width
    #[error("varint overflow")]
    VarintOverflow,

    /// Serialization or deserialization of a persisted document failed
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The KV store reported a conflict the caller should retry
    #[error("retryable transaction error: {0}")]
    Retryable(String),

    /// The transaction's read version is no longer vended by the store
    #[error("transaction too old")]
    TransactionTooOld,

    /// Commit outcome is unknown; the caller must replay idempotently
    #[error("transaction not committed")]
    NotCommitted,

    /// The owning task observed cancellation at a suspension point
    #[error("operation cancelled")]
    Cancelled,

    /// The transaction exceeded its configured time budget
    #[error("transaction timed out")]
    Timeout,

    /// Unclassified fatal storage failure
    #[error("storage error: {0}")]
    Storage(String),
}

impl Error {
    /// Whether the caller's retry loop should replay the logical operation
    ///
    /// Retryable errors are those the KV store classifies as transient:
    /// optimistic-commit conflicts, unknown commit outcomes, and read
    /// versions that aged out mid-operation. Everything else is surfaced
    /// to the caller as-is.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Retryable(_) | Error::NotCommitted | Error::TransactionTooOld
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification() {
        assert!(Error::Retryable("conflict".into()).is_retryable());
        assert!(Error::NotCommitted.is_retryable());
        assert!(Error::TransactionTooOld.is_retryable());
        assert!(!Error::Cancelled.is_retryable());
        assert!(!Error::VarintOverflow.is_retryable());
        assert!(!Error::SchemaMismatch {
            entity: "user".into(),
            detail: "missing field".into(),
        }
        .is_retryable());
    }

    #[test]
    fn display_carries_context() {
        let err = Error::FieldCountMismatch {
            expected: 2,
            actual: 3,
        };
        assert_eq!(err.to_string(), "field count mismatch: expected 2, got 3");
    }
}

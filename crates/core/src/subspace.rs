//! Subspace: byte-prefix namespace over packed tuples
//!
//! A subspace delimits a contiguous key range of the underlying store.
//! Entity data lives under `/D/<entity>/…`, indexes under `/I/<name>/…`;
//! both are expressed as subspaces whose prefix is itself a packed tuple.
//!
//! Packing appends a tuple to the prefix; unpacking strips the prefix and
//! decodes the remainder. `range()` yields the half-open byte interval
//! covering every key the subspace can contain.

use crate::error::{Error, Result};
use crate::tuple::{Tuple, TupleValue};

/// A byte-prefix namespace with order-preserving pack/unpack helpers
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Subspace {
    prefix: Vec<u8>,
}

impl Subspace {
    /// Create a subspace from a raw byte prefix
    pub fn from_bytes(prefix: impl Into<Vec<u8>>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Create a subspace whose prefix is a packed tuple
    pub fn from_tuple(tuple: &Tuple) -> Self {
        Self {
            prefix: tuple.pack(),
        }
    }

    /// The raw prefix bytes
    pub fn prefix(&self) -> &[u8] {
        &self.prefix
    }

    /// A child subspace extending this prefix by packed components
    pub fn subspace(&self, tuple: &Tuple) -> Subspace {
        let mut prefix = self.prefix.clone();
        prefix.extend_from_slice(&tuple.pack());
        Subspace { prefix }
    }

    /// A child subspace extending this prefix by one component
    pub fn child(&self, value: impl Into<TupleValue>) -> Subspace {
        self.subspace(&Tuple::new().with(value))
    }

    /// Pack a tuple under this prefix
    pub fn pack(&self, tuple: &Tuple) -> Vec<u8> {
        let mut key = self.prefix.clone();
        key.extend_from_slice(&tuple.pack());
        key
    }

    /// Strip the prefix from `key` and decode the remainder
    ///
    /// # Errors
    ///
    /// Returns `InvalidStructure` if `key` is not inside this subspace,
    /// or a decode error if the remainder is malformed.
    pub fn unpack(&self, key: &[u8]) -> Result<Tuple> {
        let rest = key.strip_prefix(self.prefix.as_slice()).ok_or_else(|| {
            Error::InvalidStructure("key does not belong to this subspace".into())
        })?;
        Tuple::unpack(rest)
    }

    /// Whether `key` lies inside this subspace
    pub fn contains(&self, key: &[u8]) -> bool {
        key.starts_with(&self.prefix)
    }

    /// The half-open byte range `[begin, end)` covering this subspace
    ///
    /// `begin` is the prefix followed by `0x00`, `end` the prefix followed
    /// by `0xFF`; every packed tuple under the prefix falls between them.
    pub fn range(&self) -> (Vec<u8>, Vec<u8>) {
        let mut begin = self.prefix.clone();
        begin.push(0x00);
        let mut end = self.prefix.clone();
        end.push(0xFF);
        (begin, end)
    }
}

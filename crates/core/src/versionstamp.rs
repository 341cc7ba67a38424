//! Versionstamp: 10-byte monotonic commit identifier
//!
//! A versionstamp is assigned by the KV store at commit time. The first
//! 8 bytes are the big-endian commit version; the final 2 bytes are a
//! caller-supplied in-transaction order so multiple versionstamped writes
//! within one transaction remain distinct and ordered.
//!
//! ## Invariants
//!
//! - Versionstamps from later commits compare greater, bytewise
//! - All versionstamps assigned within one transaction share the same
//!   8-byte prefix and differ only in the 2-byte suffix

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Error, Result};

/// Length of a packed versionstamp in bytes
pub const VERSIONSTAMP_LEN: usize = 10;

/// 10-byte monotonic commit identifier
///
/// An *incomplete* versionstamp (all 0xFF in the version prefix) is a
/// placeholder the store fills in at commit; a *complete* one carries a
/// real commit version and is totally ordered against all others.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Versionstamp([u8; VERSIONSTAMP_LEN]);

impl Versionstamp {
    /// Create a complete versionstamp from a commit version and order
    pub fn complete(version: u64, order: u16) -> Self {
        let mut bytes = [0u8; VERSIONSTAMP_LEN];
        bytes[..8].copy_from_slice(&version.to_be_bytes());
        bytes[8..].copy_from_slice(&order.to_be_bytes());
        Self(bytes)
    }

    /// Create an incomplete placeholder with the given in-transaction order
    ///
    /// The 8-byte version prefix is all 0xFF until the store splices the
    /// real commit version in at commit time.
    pub fn incomplete(order: u16) -> Self {
        let mut bytes = [0xFF; VERSIONSTAMP_LEN];
        bytes[8..].copy_from_slice(&order.to_be_bytes());
        Self(bytes)
    }

    /// Reconstruct a versionstamp from its packed form
    ///
    /// # Errors
    ///
    /// Returns `InvalidStructure` if `bytes` is not exactly 10 bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let arr: [u8; VERSIONSTAMP_LEN] = bytes.try_into().map_err(|_| {
            Error::InvalidStructure(format!("versionstamp must be 10 bytes, got {}", bytes.len()))
        })?;
        Ok(Self(arr))
    }

    /// The packed 10-byte form
    pub fn as_bytes(&self) -> &[u8; VERSIONSTAMP_LEN] {
        &self.0
    }

    /// The 8-byte commit version
    pub fn transaction_version(&self) -> u64 {
        u64::from_be_bytes(self.0[..8].try_into().unwrap())
    }

    /// The caller-supplied 2-byte in-transaction order
    pub fn user_order(&self) -> u16 {
        u16::from_be_bytes(self.0[8..].try_into().unwrap())
    }

    /// Whether the version prefix is still the 0xFF placeholder
    pub fn is_incomplete(&self) -> bool {
        self.0[..8] == [0xFF; 8]
    }
}

impl fmt::Display for Versionstamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.transaction_version(), self.user_order())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn complete_round_trip() {
        let vs = Versionstamp::complete(42, 7);
        assert_eq!(vs.transaction_version(), 42);
        assert_eq!(vs.user_order(), 7);
        assert!(!vs.is_incomplete());
        let restored = Versionstamp::from_bytes(vs.as_bytes()).unwrap();
        assert_eq!(restored, vs);
    }

    #[test]
    fn incomplete_placeholder() {
        let vs = Versionstamp::incomplete(3);
        assert!(vs.is_incomplete());
        assert_eq!(vs.user_order(), 3);
    }

    #[test]
    fn later_commits_order_greater() {
        let a = Versionstamp::complete(10, u16::MAX);
        let b = Versionstamp::complete(11, 0);
        assert!(a < b);
        assert!(a.as_bytes().as_slice() < b.as_bytes().as_slice());
    }

    #[test]
    fn rejects_wrong_length() {
        assert!(Versionstamp::from_bytes(&[0u8; 9]).is_err());
        assert!(Versionstamp::from_bytes(&[0u8; 11]).is_err());
    }
}

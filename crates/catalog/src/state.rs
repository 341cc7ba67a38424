//! Index lifecycle state
//!
//! Every index carries a state marker selecting whether writes and reads
//! traverse it. Only the online builder mutates the marker:
//!
//! - `Disabled`: the index is ignored entirely
//! - `WriteOnly`: maintainers keep it current but readers must not trust
//!   it (backfill is still running)
//! - `ReadWrite`: fully built; readers may traverse it
//!
//! The marker persists at `/I/<name>/_state` as a small JSON document. A
//! missing document reads as `ReadWrite`: indexes created before state
//! tracking are fully built by definition.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Whether writes and/or reads traverse an index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexStateKind {
    /// Ignored by maintainers and readers
    Disabled,
    /// Maintained on write, not yet readable
    WriteOnly,
    /// Fully built and readable
    ReadWrite,
}

impl fmt::Display for IndexStateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            IndexStateKind::Disabled => "disabled",
            IndexStateKind::WriteOnly => "write_only",
            IndexStateKind::ReadWrite => "read_write",
        };
        write!(f, "{}", s)
    }
}

/// Persisted lifecycle state of one index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexState {
    /// Current lifecycle marker
    pub state: IndexStateKind,
    /// Resume point of an in-flight backfill: the last primary key
    /// processed, packed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build_cursor: Option<Vec<u8>>,
}

impl IndexState {
    /// A fully built, readable state
    pub fn read_write() -> Self {
        Self {
            state: IndexStateKind::ReadWrite,
            build_cursor: None,
        }
    }

    /// A write-only state with an optional backfill cursor
    pub fn write_only(build_cursor: Option<Vec<u8>>) -> Self {
        Self {
            state: IndexStateKind::WriteOnly,
            build_cursor,
        }
    }

    /// A disabled state
    pub fn disabled() -> Self {
        Self {
            state: IndexStateKind::Disabled,
            build_cursor: None,
        }
    }

    /// Whether maintainers should keep the index current
    pub fn is_writable(&self) -> bool {
        !matches!(self.state, IndexStateKind::Disabled)
    }

    /// Whether readers may traverse the index
    pub fn is_readable(&self) -> bool {
        matches!(self.state, IndexStateKind::ReadWrite)
    }
}

impl Default for IndexState {
    fn default() -> Self {
        Self::read_write()
    }
}

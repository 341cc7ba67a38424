//! Bounded-read accounting for query-side traversals
//!
//! Every reader enforces declared limits and reports *why* it stopped
//! early, so callers can distinguish "that was everything" from "the
//! budget ran out, resume from the last key".

use serde::{Deserialize, Serialize};

/// Why a scan or traversal stopped before exhausting its range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LimitReason {
    /// The declared result-count limit was reached
    MaxResultsReached,
    /// The traversal visited its maximum number of nodes
    MaxNodesReached,
    /// The traversal reached its maximum depth
    MaxDepthReached,
    /// The traversal detected its maximum number of cycles
    MaxCyclesReached,
    /// The traversal touched its maximum number of cells
    MaxCellsReached,
}

/// Declared budgets for a single traversal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanLimits {
    /// Maximum number of results to return
    pub max_results: usize,
    /// Maximum number of underlying entries to visit
    pub max_nodes: usize,
}

impl ScanLimits {
    /// A limit on results only, with an effectively unbounded node budget
    pub fn results(max_results: usize) -> Self {
        Self {
            max_results,
            max_nodes: usize::MAX,
        }
    }
}

impl Default for ScanLimits {
    fn default() -> Self {
        Self {
            max_results: usize::MAX,
            max_nodes: usize::MAX,
        }
    }
}

/// Results of a bounded traversal plus the reason it stopped, if truncated
#[derive(Debug, Clone, PartialEq)]
pub struct ScanResult<T> {
    /// The collected results, in traversal order
    pub items: Vec<T>,
    /// Present when the scan stopped before exhausting its range
    pub limit_reason: Option<LimitReason>,
}

impl<T> ScanResult<T> {
    /// A complete, untruncated result
    pub fn complete(items: Vec<T>) -> Self {
        Self {
            items,
            limit_reason: None,
        }
    }

    /// A truncated result with the reason the scan stopped
    pub fn truncated(items: Vec<T>, reason: LimitReason) -> Self {
        Self {
            items,
            limit_reason: Some(reason),
        }
    }

    /// Whether the scan stopped early
    pub fn is_truncated(&self) -> bool {
        self.limit_reason.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_limits_are_unbounded() {
        let limits = ScanLimits::default();
        assert_eq!(limits.max_results, usize::MAX);
        assert_eq!(limits.max_nodes, usize::MAX);
    }

    #[test]
    fn truncation_carries_reason() {
        let r = ScanResult::truncated(vec![1, 2], LimitReason::MaxResultsReached);
        assert!(r.is_truncated());
        assert_eq!(r.limit_reason, Some(LimitReason::MaxResultsReached));
        let c: ScanResult<i32> = ScanResult::complete(vec![]);
        assert!(!c.is_truncated());
    }
}

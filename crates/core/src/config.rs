//! Kernel configuration surface
//!
//! All tunables live on one serializable struct so embedders can load
//! them from their own configuration layer. Defaults match the documented
//! contract and are safe for production use.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Time-window granularity for bucketed leaderboards
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LeaderboardWindow {
    /// One bucket per hour
    Hourly,
    /// One bucket per day
    Daily,
    /// One bucket per ISO week
    Weekly,
    /// One bucket per calendar month
    Monthly,
}

/// How uniqueness constraints react to a duplicate indexed value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UniquenessMode {
    /// Fail the write with `UniquenessViolation`
    Immediate,
    /// Record the violation in the violations subspace and succeed
    Track,
    /// Perform no check
    Skip,
}

/// Tunable configuration for the index kernel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KernelConfig {
    /// How long catalog cache entries stay fresh
    pub catalog_cache_ttl: Duration,
    /// Default skip-list bucket size for rank indexes
    pub rank_default_bucket_size: u32,
    /// Hard cap on skip-list levels
    pub rank_max_levels: u8,
    /// Default t-digest compression parameter (δ)
    pub percentile_default_compression: f64,
    /// Default leaderboard window granularity
    pub leaderboard_default_window: LeaderboardWindow,
    /// Default number of retained leaderboard windows
    pub leaderboard_default_window_count: u32,
    /// Default uniqueness enforcement mode
    pub uniqueness_default_mode: UniquenessMode,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            catalog_cache_ttl: Duration::from_secs(300),
            rank_default_bucket_size: 100,
            rank_max_levels: 16,
            percentile_default_compression: 100.0,
            leaderboard_default_window: LeaderboardWindow::Daily,
            leaderboard_default_window_count: 7,
            uniqueness_default_mode: UniquenessMode::Immediate,
        }
    }
}

impl KernelConfig {
    /// Override the catalog cache TTL
    pub fn with_catalog_cache_ttl(mut self, ttl: Duration) -> Self {
        self.catalog_cache_ttl = ttl;
        self
    }

    /// Override the skip-list level cap
    pub fn with_rank_max_levels(mut self, levels: u8) -> Self {
        self.rank_max_levels = levels;
        self
    }

    /// Override the t-digest compression parameter
    pub fn with_percentile_compression(mut self, compression: f64) -> Self {
        self.percentile_default_compression = compression;
        self
    }

    /// Override the default uniqueness mode
    pub fn with_uniqueness_mode(mut self, mode: UniquenessMode) -> Self {
        self.uniqueness_default_mode = mode;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_contract() {
        let cfg = KernelConfig::default();
        assert_eq!(cfg.catalog_cache_ttl, Duration::from_secs(300));
        assert_eq!(cfg.rank_default_bucket_size, 100);
        assert_eq!(cfg.rank_max_levels, 16);
        assert_eq!(cfg.percentile_default_compression, 100.0);
        assert_eq!(cfg.leaderboard_default_window_count, 7);
        assert_eq!(cfg.uniqueness_default_mode, UniquenessMode::Immediate);
    }

    #[test]
    fn builder_overrides() {
        let cfg = KernelConfig::default()
            .with_rank_max_levels(8)
            .with_uniqueness_mode(UniquenessMode::Track);
        assert_eq!(cfg.rank_max_levels, 8);
        assert_eq!(cfg.uniqueness_default_mode, UniquenessMode::Track);
    }
}

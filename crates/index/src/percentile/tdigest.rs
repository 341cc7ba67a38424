//! Bounded-space approximate quantile sketch
//!
//! A t-digest holds a sorted list of weighted centroids whose count is
//! bounded by the compression parameter δ. Adds buffer into the centroid
//! list and a merge pass re-bounds per-centroid weight at `count / δ`,
//! giving O(1/δ) quantile error in the interior; the exact minimum and
//! maximum are tracked separately so the tails stay exact after any add.
//!
//! The sketch is add-only: removals are documented no-ops at the index
//! layer, so `count` and `max` never decrease.

use serde::{Deserialize, Serialize};

/// One weighted centroid
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Centroid {
    /// Weighted mean of the values merged into this centroid
    pub mean: f64,
    /// Number of values merged
    pub weight: u64,
}

/// Add-only approximate quantile sketch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TDigest {
    compression: f64,
    /// Sorted by mean
    centroids: Vec<Centroid>,
    count: u64,
    min: f64,
    max: f64,
}

impl TDigest {
    /// Create an empty sketch with compression parameter δ
    pub fn new(compression: f64) -> Self {
        Self {
            compression: compression.max(1.0),
            centroids: Vec::new(),
            count: 0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
        }
    }

    /// Number of values added
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Exact minimum of all added values; `None` when empty
    pub fn min(&self) -> Option<f64> {
        (self.count > 0).then_some(self.min)
    }

    /// Exact maximum of all added values; `None` when empty
    pub fn max(&self) -> Option<f64> {
        (self.count > 0).then_some(self.max)
    }

    /// The compression parameter δ
    pub fn compression(&self) -> f64 {
        self.compression
    }

    /// Current centroids, sorted by mean
    pub fn centroids(&self) -> &[Centroid] {
        &self.centroids
    }

    /// Add one value with weight 1
    pub fn add(&mut self, value: f64) {
        self.add_weighted(value, 1);
    }

    /// Add a value with explicit weight
    pub fn add_weighted(&mut self, value: f64, weight: u64) {
        if weight == 0 || value.is_nan() {
            return;
        }
        let at = self
            .centroids
            .partition_point(|c| c.mean < value);
        self.centroids.insert(
            at,
            Centroid {
                mean: value,
                weight,
            },
        );
        self.count += weight;
        self.min = self.min.min(value);
        self.max = self.max.max(value);
        if self.centroids.len() as f64 > self.compression * 4.0 {
            self.compress();
        }
    }

    /// Fold another sketch into this one
    ///
    /// Used when a hot group is sharded into sub-sketches that merge at
    /// read time.
    pub fn merge_from(&mut self, other: &TDigest) {
        for c in other.centroids() {
            self.add_weighted(c.mean, c.weight);
        }
        // Centroid means blur the tails; carry the exact extrema over.
        if let (Some(min), Some(max)) = (other.min(), other.max()) {
            self.min = self.min.min(min);
            self.max = self.max.max(max);
        }
        self.compress();
    }

    /// Merge adjacent centroids until per-centroid weight is re-bounded
    pub fn compress(&mut self) {
        if self.centroids.len() < 2 {
            return;
        }
        let cap = ((self.count as f64 / self.compression).ceil() as u64).max(1);
        let mut merged: Vec<Centroid> = Vec::with_capacity(self.compression as usize + 1);
        let mut acc = self.centroids[0];
        for c in &self.centroids[1..] {
            if acc.weight + c.weight <= cap {
                let total = acc.weight + c.weight;
                acc.mean = (acc.mean * acc.weight as f64 + c.mean * c.weight as f64)
                    / total as f64;
                acc.weight = total;
            } else {
                merged.push(acc);
                acc = *c;
            }
        }
        merged.push(acc);
        self.centroids = merged;
    }

    /// Interpolated value at quantile `q ∈ [0, 1]`; `None` when empty
    pub fn quantile(&self, q: f64) -> Option<f64> {
        if self.count == 0 {
            return None;
        }
        if q <= 0.0 {
            return Some(self.min);
        }
        if q >= 1.0 {
            return Some(self.max);
        }
        let target = q * self.count as f64;
        let mut cumulative = 0.0;
        for (i, c) in self.centroids.iter().enumerate() {
            let center = cumulative + c.weight as f64 / 2.0;
            if target < center {
                let (prev_mean, prev_center) = if i == 0 {
                    (self.min, 0.0)
                } else {
                    let p = &self.centroids[i - 1];
                    (p.mean, cumulative - p.weight as f64 / 2.0)
                };
                let span = center - prev_center;
                if span <= 0.0 {
                    return Some(c.mean);
                }
                let t = (target - prev_center) / span;
                return Some(prev_mean + t * (c.mean - prev_mean));
            }
            cumulative += c.weight as f64;
        }
        Some(self.max)
    }

    /// Approximate fraction of added values ≤ `v`; `None` when empty
    pub fn cdf(&self, v: f64) -> Option<f64> {
        if self.count == 0 {
            return None;
        }
        if v < self.min {
            return Some(0.0);
        }
        if v >= self.max {
            return Some(1.0);
        }
        let mut cumulative = 0.0;
        for (i, c) in self.centroids.iter().enumerate() {
            if v < c.mean {
                let (prev_mean, prev_center) = if i == 0 {
                    (self.min, 0.0)
                } else {
                    let p = &self.centroids[i - 1];
                    (p.mean, cumulative - p.weight as f64 / 2.0)
                };
                let center = cumulative + c.weight as f64 / 2.0;
                let span = c.mean - prev_mean;
                let position = if span <= 0.0 {
                    center
                } else {
                    prev_center + (v - prev_mean) / span * (center - prev_center)
                };
                return Some((position / self.count as f64).clamp(0.0, 1.0));
            }
            cumulative += c.weight as f64;
        }
        Some(1.0)
    }
}

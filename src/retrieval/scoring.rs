//! Score normalization and fusion for hybrid ranking
//!
//! Two separate time signals live here and must not be mixed up:
//! [`FreshnessWindow`] scores how recently a *file was modified* and feeds the
//! hybrid ranker, while [`usage_recency_bonus`] scores how recently a source
//! was *included in an answer* and feeds the context optimizer.

use crate::config::RetrievalConfig;
use ahash::HashMap;

/// Usage recency is full for sources included within this many seconds
const USAGE_FULL_SECS: f64 = 60.0;

/// Usage recency reaches zero after this many seconds
const USAGE_ZERO_SECS: f64 = 3600.0;

/// Rank-derived semantic score lost per position in the result list
const RANK_DECAY: f64 = 0.2;

/// Convert a cosine distance in `[0, 2]` to a similarity in `[0, 1]`
pub fn similarity_from_distance(distance: f64) -> f64 {
    (1.0 - distance / 2.0).clamp(0.0, 1.0)
}

/// Divide every score by the largest one.
///
/// A non-positive maximum (no matching terms, no vector results) leaves the
/// scores untouched.
pub fn normalize_by_max(scores: &mut HashMap<String, f64>) {
    let max = scores.values().copied().fold(f64::NEG_INFINITY, f64::max);
    if max > 0.0 {
        scores.values_mut().for_each(|score| *score /= max);
    }
}

/// Semantic score assumed for the result at `rank` when only order is known
pub fn rank_semantic_score(rank: usize) -> f64 {
    (1.0 - RANK_DECAY * rank as f64).max(0.0)
}

/// Bonus in `[0, 1]` for a source last included in an answer `age_secs` ago
pub fn usage_recency_bonus(age_secs: f64) -> f64 {
    if age_secs <= USAGE_FULL_SECS {
        1.0
    } else if age_secs >= USAGE_ZERO_SECS {
        0.0
    } else {
        (1.0 - (age_secs - USAGE_FULL_SECS) / (USAGE_ZERO_SECS - USAGE_FULL_SECS)).clamp(0.0, 1.0)
    }
}

/// Linear decay of file freshness by modification age
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FreshnessWindow {
    /// Ages up to this many seconds score 1.0
    pub full_secs: f64,
    /// Ages from this many seconds on score 0.0
    pub zero_secs: f64,
}

impl FreshnessWindow {
    pub fn from_config(config: &RetrievalConfig) -> Self {
        Self {
            full_secs: config.freshness_full_hours.saturating_mul(3600) as f64,
            zero_secs: config.freshness_zero_days.saturating_mul(24 * 3600) as f64,
        }
    }

    /// Freshness in `[0, 1]` of a file modified `age_secs` ago
    pub fn score(&self, age_secs: f64) -> f64 {
        if age_secs <= self.full_secs {
            1.0
        } else if age_secs >= self.zero_secs {
            0.0
        } else {
            let span = self.zero_secs - self.full_secs;
            (1.0 - (age_secs - self.full_secs) / span).max(0.0)
        }
    }
}

impl Default for FreshnessWindow {
    fn default() -> Self {
        Self::from_config(&RetrievalConfig::default())
    }
}

/// Weights applied when fusing keyword, semantic and freshness signals
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HybridWeights {
    pub keyword: f64,
    pub semantic: f64,
    pub freshness: f64,
}

impl HybridWeights {
    pub fn from_config(config: &RetrievalConfig) -> Self {
        Self {
            keyword: config.keyword_weight,
            semantic: config.semantic_weight,
            freshness: config.freshness_weight,
        }
    }

    /// `(1 - f) * (kw * keyword + sw * semantic) + f * freshness`
    pub fn fuse(&self, keyword: f64, semantic: f64, freshness: f64) -> f64 {
        let base = self.keyword * keyword + self.semantic * semantic;
        (1.0 - self.freshness) * base + self.freshness * freshness
    }
}

impl Default for HybridWeights {
    fn default() -> Self {
        Self::from_config(&RetrievalConfig::default())
    }
}

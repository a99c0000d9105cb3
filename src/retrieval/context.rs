//! Token-budget context optimization
//!
//! Candidates are ranked by a composite priority and packed greedily into
//! the budget, best first. The accepted subset is then returned in the
//! original candidate order because callers concatenate it as a document.

use crate::chunking::Chunk;
use crate::config::ContextConfig;
use ahash::HashMap;
use serde::Serialize;

/// Base priority every candidate starts with
const BASE_PRIORITY: f64 = 0.5;
const SEMANTIC_WEIGHT: f64 = 0.4;
const RECENCY_WEIGHT: f64 = 0.3;
const POSITION_WEIGHT: f64 = 0.3;

/// Outcome of an optimization pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizationStatus {
    /// No candidates were given
    NoChunks,
    /// The query behind the candidates returned nothing
    NoResults,
    NoTruncationNeeded,
    Truncated,
}

impl OptimizationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OptimizationStatus::NoChunks => "no_chunks",
            OptimizationStatus::NoResults => "no_results",
            OptimizationStatus::NoTruncationNeeded => "no_truncation_needed",
            OptimizationStatus::Truncated => "truncated",
        }
    }
}

/// A candidate that did not fit the budget
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DroppedChunk {
    /// Position in the candidate list
    pub index: usize,
    pub source: String,
    pub heading_path: Vec<String>,
    pub tokens: usize,
    pub priority: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OptimizationStats {
    pub status: OptimizationStatus,
    pub total_tokens: usize,
    pub used_tokens: usize,
    pub dropped_chunks: usize,
    pub max_allowed: usize,
    pub dropped_details: Vec<DroppedChunk>,
}

impl OptimizationStats {
    /// Stats for a pass that had nothing to work with
    pub fn empty(status: OptimizationStatus, max_allowed: usize) -> Self {
        Self {
            status,
            total_tokens: 0,
            used_tokens: 0,
            dropped_chunks: 0,
            max_allowed,
            dropped_details: Vec::new(),
        }
    }
}

/// Fits ranked chunks into a share of a model's context window
#[derive(Debug, Clone)]
pub struct ContextOptimizer {
    context_window: usize,
    reserve_percent: f64,
    max_tokens: usize,
}

impl Default for ContextOptimizer {
    fn default() -> Self {
        Self::from_config(&ContextConfig::default())
    }
}

impl ContextOptimizer {
    /// `reserve_percent` is the fraction of the window context may occupy
    pub fn new(context_window: usize, reserve_percent: f64) -> Self {
        Self {
            context_window,
            reserve_percent,
            max_tokens: budget(context_window, reserve_percent),
        }
    }

    pub fn from_config(config: &ContextConfig) -> Self {
        Self::new(config.context_window, config.reserve_percent)
    }

    /// Copy of this optimizer sized for a different window
    pub fn with_context_window(&self, context_window: usize) -> Self {
        Self::new(context_window, self.reserve_percent)
    }

    pub fn set_context_window(&mut self, context_window: usize) {
        self.context_window = context_window;
        self.max_tokens = budget(context_window, self.reserve_percent);
    }

    pub fn context_window(&self) -> usize {
        self.context_window
    }

    pub fn reserve_percent(&self) -> f64 {
        self.reserve_percent
    }

    /// Token budget available to retrieved context
    pub fn max_tokens(&self) -> usize {
        self.max_tokens
    }

    /// Select the subset of `chunks` that fits the budget.
    ///
    /// `semantic_scores` runs parallel to `chunks`; `recency_bonus` maps a
    /// source path to a bonus in `[0, 1]`. Missing entries count as zero.
    pub fn optimize(
        &self,
        chunks: Vec<Chunk>,
        semantic_scores: Option<&[f64]>,
        recency_bonus: Option<&HashMap<String, f64>>,
    ) -> (Vec<Chunk>, OptimizationStats) {
        if chunks.is_empty() {
            return (
                chunks,
                OptimizationStats::empty(OptimizationStatus::NoChunks, self.max_tokens),
            );
        }

        let count = chunks.len();
        let tokens: Vec<usize> = chunks.iter().map(Chunk::tokens).collect();
        let total_tokens: usize = tokens.iter().sum();

        if total_tokens <= self.max_tokens {
            tracing::debug!(
                "All {} chunks fit ({} tokens, limit {})",
                count,
                total_tokens,
                self.max_tokens
            );
            return (
                chunks,
                OptimizationStats {
                    status: OptimizationStatus::NoTruncationNeeded,
                    total_tokens,
                    used_tokens: total_tokens,
                    dropped_chunks: 0,
                    max_allowed: self.max_tokens,
                    dropped_details: Vec::new(),
                },
            );
        }

        let priorities: Vec<f64> = chunks
            .iter()
            .enumerate()
            .map(|(i, chunk)| {
                let semantic = semantic_scores
                    .and_then(|scores| scores.get(i))
                    .copied()
                    .unwrap_or(0.0);
                let recency = recency_bonus
                    .and_then(|bonus| bonus.get(&chunk.metadata.source))
                    .copied()
                    .unwrap_or(0.0);
                let position = (1.0 - i as f64 / count as f64).max(0.0);

                BASE_PRIORITY
                    + SEMANTIC_WEIGHT * semantic
                    + RECENCY_WEIGHT * recency
                    + POSITION_WEIGHT * position
            })
            .collect();

        // Stable, so equal priorities keep candidate order
        let mut by_priority: Vec<usize> = (0..count).collect();
        by_priority.sort_by(|&a, &b| {
            priorities[b]
                .partial_cmp(&priorities[a])
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let mut accepted = vec![false; count];
        let mut used_tokens = 0usize;
        for &i in &by_priority {
            if used_tokens + tokens[i] <= self.max_tokens {
                accepted[i] = true;
                used_tokens += tokens[i];
            }
        }

        let mut kept = Vec::new();
        let mut dropped_details = Vec::new();
        for (i, chunk) in chunks.into_iter().enumerate() {
            if accepted[i] {
                kept.push(chunk);
            } else {
                dropped_details.push(DroppedChunk {
                    index: i,
                    source: chunk.metadata.source,
                    heading_path: chunk.metadata.heading_path,
                    tokens: tokens[i],
                    priority: priorities[i],
                });
            }
        }

        tracing::debug!(
            "Truncated context from {} to {} tokens, kept {}/{} chunks",
            total_tokens,
            used_tokens,
            kept.len(),
            count
        );

        let stats = OptimizationStats {
            status: OptimizationStatus::Truncated,
            total_tokens,
            used_tokens,
            dropped_chunks: dropped_details.len(),
            max_allowed: self.max_tokens,
            dropped_details,
        };
        (kept, stats)
    }
}

fn budget(context_window: usize, reserve_percent: f64) -> usize {
    (context_window as f64 * reserve_percent).floor().max(0.0) as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunking::{ChunkMetadata, ContentType};
    use ahash::HashMapExt;

    fn chunk(source: &str, index: usize, chars: usize) -> Chunk {
        Chunk {
            text: "x".repeat(chars),
            metadata: ChunkMetadata {
                source: source.to_string(),
                heading_path: vec![format!("H{}", index)],
                start_line: index,
                end_line: index + 1,
                content_type: ContentType::Text,
                chunk_index: index,
            },
        }
    }

    #[test]
    fn test_budget_floor() {
        let optimizer = ContextOptimizer::new(4096, 0.70);
        assert_eq!(optimizer.max_tokens(), 2867);
    }

    #[test]
    fn test_empty_input() {
        let optimizer = ContextOptimizer::default();
        let (kept, stats) = optimizer.optimize(Vec::new(), None, None);
        assert!(kept.is_empty());
        assert_eq!(stats.status, OptimizationStatus::NoChunks);
    }

    #[test]
    fn test_no_truncation_returns_input() {
        let optimizer = ContextOptimizer::new(1000, 0.5);
        let input = vec![chunk("a.md", 0, 40), chunk("b.md", 1, 40)];
        let (kept, stats) = optimizer.optimize(input.clone(), None, None);

        assert_eq!(kept, input);
        assert_eq!(stats.status, OptimizationStatus::NoTruncationNeeded);
        assert_eq!(stats.used_tokens, 20);
    }

    #[test]
    fn test_truncation_keeps_earliest_and_original_order() {
        let optimizer = ContextOptimizer::new(100, 0.5);
        let input = vec![
            chunk("a.md", 0, 120),
            chunk("b.md", 1, 120),
            chunk("c.md", 2, 120),
        ];
        let (kept, stats) = optimizer.optimize(input, None, None);

        assert_eq!(stats.status, OptimizationStatus::Truncated);
        assert_eq!(stats.total_tokens, 90);
        assert!(kept.len() <= 2);
        assert!(stats.dropped_chunks >= 1);
        assert!(stats.used_tokens <= 50);
        assert_eq!(kept[0].metadata.source, "a.md");
        assert_eq!(stats.dropped_details[0].heading_path, vec!["H1"]);
    }

    #[test]
    fn test_recency_bonus_changes_selection_not_order() {
        let optimizer = ContextOptimizer::new(100, 0.5);
        let input = vec![
            chunk("a.md", 0, 120),
            chunk("b.md", 1, 120),
            chunk("c.md", 2, 120),
        ];
        let mut bonus = HashMap::new();
        bonus.insert("c.md".to_string(), 1.0);
        let scores = [0.0, 0.0, 1.0];

        let (kept, _) = optimizer.optimize(input, Some(&scores[..]), Some(&bonus));
        let sources: Vec<&str> = kept.iter().map(|c| c.metadata.source.as_str()).collect();
        assert_eq!(sources, vec!["c.md"]);
    }

    #[test]
    fn test_skips_oversized_and_keeps_packing() {
        let optimizer = ContextOptimizer::new(100, 0.5);
        let input = vec![
            chunk("big.md", 0, 400),
            chunk("a.md", 1, 40),
            chunk("b.md", 2, 40),
        ];
        let (kept, stats) = optimizer.optimize(input, None, None);

        assert_eq!(kept.len(), 2);
        assert_eq!(stats.dropped_details[0].source, "big.md");
        assert_eq!(stats.dropped_details[0].index, 0);
    }

    #[test]
    fn test_set_context_window() {
        let mut optimizer = ContextOptimizer::new(1000, 0.5);
        optimizer.set_context_window(2000);
        assert_eq!(optimizer.max_tokens(), 1000);
        assert_eq!(optimizer.with_context_window(10).max_tokens(), 5);
    }
}

//! Hybrid retrieval over indexed project documents
//!
//! The [`RetrievalEngine`] fuses BM25 keyword scores, vector similarity and
//! file freshness into a single ranking, caches query results, and trims
//! results to a model's context budget with the [`ContextOptimizer`].

mod cache;
mod context;
mod engine;
mod ingest;
mod provenance;
pub mod scoring;
mod shared;

pub use cache::{CacheStats, QueryCache};
pub use context::{ContextOptimizer, DroppedChunk, OptimizationStats, OptimizationStatus};
pub use engine::{IndexStatus, RetrievalEngine};
pub use ingest::{CancellationToken, IngestError, IngestFailure, IngestReport, IngestSummary};
pub use provenance::ScoredChunk;
pub use shared::SharedEngine;

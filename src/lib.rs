//! inkrag - Hybrid retrieval for writing projects
//!
//! Splits a project's markdown and text documents into structure-aware chunks,
//! indexes them for BM25 keyword search alongside an external vector store, and
//! returns ranked, token-budget-aware context for prompting a language model.

pub mod chunking;
pub mod cli;
pub mod config;
pub mod error;
pub mod fs;
pub mod index;
pub mod retrieval;

pub use chunking::{Chunk, ChunkMetadata, ContentType, MarkdownChunker};
pub use error::{RagError, Result};
pub use index::{InMemoryVectorStore, KeywordIndex, VectorStore};
pub use retrieval::{ContextOptimizer, QueryCache, RetrievalEngine, SharedEngine};

//! Scored chunk returned from ranked queries

use crate::chunking::{Chunk, ChunkMetadata};
use serde::{Deserialize, Serialize};

/// A retrieved chunk with its relevance score and full provenance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredChunk {
    /// Corpus-wide identifier (`"{source}#{chunk_index}"`)
    pub id: String,

    pub text: String,

    pub metadata: ChunkMetadata,

    /// Relevance score, higher is better. Vector-only queries report a
    /// similarity in `[0, 1]`; hybrid queries report the fused score.
    pub score: f64,
}

impl ScoredChunk {
    pub fn new(id: String, text: String, metadata: ChunkMetadata, score: f64) -> Self {
        Self {
            id,
            text,
            metadata,
            score,
        }
    }

    /// Source document of the chunk
    pub fn source(&self) -> &str {
        &self.metadata.source
    }

    /// Get a short preview of the text (first N characters)
    pub fn preview(&self, max_chars: usize) -> String {
        match self.text.char_indices().nth(max_chars) {
            None => self.text.clone(),
            Some((cut, _)) => format!("{}...", &self.text[..cut]),
        }
    }
}

impl From<ScoredChunk> for Chunk {
    fn from(scored: ScoredChunk) -> Self {
        Chunk {
            text: scored.text,
            metadata: scored.metadata,
        }
    }
}

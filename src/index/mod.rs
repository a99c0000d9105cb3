//! Keyword and vector indices
//!
//! - [`KeywordIndex`]: in-memory BM25 ranker rebuilt wholesale from the corpus
//! - [`VectorStore`]: contract of the external store that owns embeddings
//! - [`InMemoryVectorStore`]: hashed bag-of-words reference store

mod keyword_index;
mod vector_store;

pub use keyword_index::{tokenize, KeywordIndex, DEFAULT_B, DEFAULT_K1};
pub use vector_store::{
    GetRequest, GetResponse, InMemoryVectorStore, Metadata, MetadataFilter, QueryResponse,
    VectorStore, VectorStoreError,
};

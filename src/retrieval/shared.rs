//! Thread-safe handle around a [`RetrievalEngine`]
//!
//! Queries take the read lock and run concurrently; the cache and usage
//! tracking they touch sit behind their own mutexes inside the engine.
//! Anything that changes the indices takes the write lock, so a keyword
//! index rebuild never overlaps a query.

use crate::error::{RagError, Result};
use crate::retrieval::cache::CacheStats;
use crate::retrieval::context::OptimizationStats;
use crate::retrieval::engine::{IndexStatus, RetrievalEngine};
use crate::retrieval::ingest::{CancellationToken, IngestReport};
use crate::retrieval::provenance::ScoredChunk;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Debug, Clone)]
pub struct SharedEngine {
    inner: Arc<RwLock<RetrievalEngine>>,
}

impl SharedEngine {
    pub fn new(engine: RetrievalEngine) -> Self {
        Self {
            inner: Arc::new(RwLock::new(engine)),
        }
    }

    pub fn query(&self, query: &str, k: usize, use_hybrid: bool) -> Result<Vec<String>> {
        self.read()?.query(query, k, use_hybrid)
    }

    pub fn query_with_metadata(
        &self,
        query: &str,
        k: usize,
        use_hybrid: bool,
    ) -> Result<Vec<ScoredChunk>> {
        self.read()?.query_with_metadata(query, k, use_hybrid)
    }

    pub fn get_optimized_context(
        &self,
        query: &str,
        k: usize,
        context_window: Option<usize>,
    ) -> Result<(Vec<String>, OptimizationStats)> {
        self.read()?.get_optimized_context(query, k, context_window)
    }

    pub fn get_file_index_status(&self, path: &str) -> Result<Option<IndexStatus>> {
        Ok(self.read()?.get_file_index_status(path))
    }

    pub fn cache_stats(&self) -> Result<CacheStats> {
        self.read()?.cache_stats()
    }

    pub fn chunk_count(&self) -> Result<usize> {
        Ok(self.read()?.chunk_count())
    }

    pub fn index_file(&self, path: &str, content: &str, invalidate_cache: bool) -> Result<usize> {
        self.write()?.index_file(path, content, invalidate_cache)
    }

    pub fn remove_file(&self, path: &str) -> Result<usize> {
        self.write()?.remove_file(path)
    }

    /// Holds the write lock for the whole walk
    pub fn index_project(&self, cancel: Option<&CancellationToken>) -> Result<IngestReport> {
        self.write()?.index_project(cancel)
    }

    pub fn clean_excluded_files(&self) -> Result<usize> {
        self.write()?.clean_excluded_files()
    }

    pub fn set_context_window(&self, context_window: usize) -> Result<()> {
        self.write()?.set_context_window(context_window);
        Ok(())
    }

    /// Run `f` with shared access to the engine
    pub fn with_engine<R>(&self, f: impl FnOnce(&RetrievalEngine) -> R) -> Result<R> {
        let engine = self.read()?;
        Ok(f(&engine))
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, RetrievalEngine>> {
        self.inner.read().map_err(|_| RagError::LockPoisoned)
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, RetrievalEngine>> {
        self.inner.write().map_err(|_| RagError::LockPoisoned)
    }
}

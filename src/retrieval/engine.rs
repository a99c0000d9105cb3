//! Retrieval engine: ingestion and hybrid querying over a project's documents
//!
//! The engine owns the chunker, the BM25 index, the query cache and the
//! context optimizer, and drives an external [`VectorStore`]. After every
//! mutation the keyword index is rebuilt from the store's full corpus, so
//! both indices always hold exactly the same chunk ids.

use crate::chunking::{source_of_id, ChunkMetadata, MarkdownChunker};
use crate::config::{ConfigValidator, RagConfig};
use crate::error::{RagError, Result};
use crate::fs::{FileSystem, LocalFs};
use crate::index::{
    GetRequest, KeywordIndex, Metadata, MetadataFilter, VectorStore, VectorStoreError,
};
use crate::retrieval::cache::{CacheStats, QueryCache};
use crate::retrieval::context::{ContextOptimizer, OptimizationStats, OptimizationStatus};
use crate::retrieval::ingest::{CancellationToken, IngestError, IngestFailure, IngestReport};
use crate::retrieval::provenance::ScoredChunk;
use crate::retrieval::scoring::{
    normalize_by_max, rank_semantic_score, similarity_from_distance, usage_recency_bonus,
    FreshnessWindow, HybridWeights,
};
use ahash::{HashMap, HashMapExt, HashSet};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use walkdir::WalkDir;

/// Where a document stands relative to the index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexStatus {
    Indexed,
    /// Indexed, but the file changed on disk since
    NeedsReindex,
    NotIndexed,
}

impl IndexStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IndexStatus::Indexed => "indexed",
            IndexStatus::NeedsReindex => "needs_reindex",
            IndexStatus::NotIndexed => "not_indexed",
        }
    }
}

/// A stored chunk mirrored into the keyword index
#[derive(Debug, Clone)]
struct CorpusEntry {
    id: String,
    text: String,
    metadata: Metadata,
}

pub struct RetrievalEngine {
    project_root: PathBuf,
    config: RagConfig,
    store: Box<dyn VectorStore>,
    fs: Arc<dyn FileSystem>,
    chunker: MarkdownChunker,
    keyword_index: KeywordIndex,
    /// Parallel to the keyword index's documents
    corpus: Vec<CorpusEntry>,
    cache: Mutex<QueryCache>,
    optimizer: ContextOptimizer,
    weights: HybridWeights,
    freshness: FreshnessWindow,
    /// Modification time of each file when it was last indexed
    indexed_files: HashMap<String, DateTime<Utc>>,
    /// When each source was last part of an optimized context
    last_included: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl std::fmt::Debug for RetrievalEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetrievalEngine")
            .field("project_root", &self.project_root)
            .field("chunks", &self.corpus.len())
            .field("indexed_files", &self.indexed_files.len())
            .finish()
    }
}

impl RetrievalEngine {
    /// Create an engine reading documents from the local filesystem
    pub fn new(
        project_root: impl Into<PathBuf>,
        config: RagConfig,
        store: Box<dyn VectorStore>,
    ) -> Result<Self> {
        Self::with_file_system(project_root, config, store, Arc::new(LocalFs))
    }

    /// Create an engine with an explicit filesystem collaborator.
    ///
    /// The keyword index is built immediately from whatever the store
    /// already holds.
    pub fn with_file_system(
        project_root: impl Into<PathBuf>,
        config: RagConfig,
        store: Box<dyn VectorStore>,
        fs: Arc<dyn FileSystem>,
    ) -> Result<Self> {
        ConfigValidator::validate(&config)?;

        let mut engine = Self {
            project_root: project_root.into(),
            chunker: MarkdownChunker::new(config.chunking.clone()),
            cache: Mutex::new(QueryCache::from_config(&config.cache, fs.clone())),
            optimizer: ContextOptimizer::from_config(&config.context),
            weights: HybridWeights::from_config(&config.retrieval),
            freshness: FreshnessWindow::from_config(&config.retrieval),
            config,
            store,
            fs,
            keyword_index: KeywordIndex::new(),
            corpus: Vec::new(),
            indexed_files: HashMap::new(),
            last_included: Mutex::new(HashMap::new()),
        };
        engine.rebuild()?;

        Ok(engine)
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    pub fn store(&self) -> &dyn VectorStore {
        self.store.as_ref()
    }

    pub fn optimizer(&self) -> &ContextOptimizer {
        &self.optimizer
    }

    /// Number of chunks in the keyword index (and the store)
    pub fn chunk_count(&self) -> usize {
        self.corpus.len()
    }

    /// Ids of every indexed chunk, in keyword-index order
    pub fn chunk_ids(&self) -> Vec<String> {
        self.corpus.iter().map(|entry| entry.id.clone()).collect()
    }

    pub fn set_context_window(&mut self, context_window: usize) {
        self.optimizer.set_context_window(context_window);
    }

    pub fn cache_stats(&self) -> Result<CacheStats> {
        Ok(self.lock_cache()?.stats())
    }

    /// Reload the keyword index from the complete store corpus
    pub fn rebuild(&mut self) -> Result<()> {
        let all = self.store.get(&GetRequest::all())?;

        self.corpus = all
            .ids
            .into_iter()
            .zip(all.documents)
            .zip(all.metadatas)
            .map(|((id, text), metadata)| CorpusEntry { id, text, metadata })
            .collect();

        let texts: Vec<&str> = self.corpus.iter().map(|entry| entry.text.as_str()).collect();
        self.keyword_index.index(&texts);

        tracing::debug!("Rebuilt keyword index over {} chunks", self.corpus.len());
        Ok(())
    }

    /// Chunk and upsert one document, replacing whatever was stored for it.
    ///
    /// Returns the number of chunks written. With `invalidate_cache` unset
    /// the caller is responsible for clearing affected cache entries.
    pub fn index_file(
        &mut self,
        path: &str,
        content: &str,
        invalidate_cache: bool,
    ) -> Result<usize> {
        let count = self.write_chunks(path, content)?;
        self.rebuild()?;
        self.record_mtime(path);

        if invalidate_cache {
            self.cache_mut()?.invalidate_file(path);
        }

        tracing::info!("Indexed {} chunks for {}", count, path);
        Ok(count)
    }

    /// Delete every chunk of `path`; returns how many were removed
    pub fn remove_file(&mut self, path: &str) -> Result<usize> {
        let existing = self
            .store
            .get(&GetRequest::filter(MetadataFilter::source(path)))?;

        if !existing.ids.is_empty() {
            self.store.delete(&existing.ids)?;
            self.rebuild()?;
            tracing::info!("Removed {} chunks for {}", existing.ids.len(), path);
        }

        self.indexed_files.remove(path);
        self.cache_mut()?.invalidate_file(path);

        Ok(existing.ids.len())
    }

    /// Delete every stored chunk whose source lies in an excluded directory
    pub fn clean_excluded_files(&mut self) -> Result<usize> {
        let all = self.store.get(&GetRequest::all())?;

        let mut excluded_ids = Vec::new();
        let mut excluded_sources = HashSet::default();
        for (id, metadata) in all.ids.iter().zip(&all.metadatas) {
            let source = metadata
                .get("source")
                .and_then(|v| v.as_str())
                .unwrap_or("");
            if self.is_excluded(source) {
                excluded_ids.push(id.clone());
                excluded_sources.insert(source.to_string());
            }
        }

        if excluded_ids.is_empty() {
            tracing::info!("No chunks from excluded directories found");
            return Ok(0);
        }

        self.store.delete(&excluded_ids)?;
        self.rebuild()?;
        for source in &excluded_sources {
            self.indexed_files.remove(source);
        }
        self.cache_mut()?.invalidate_all();

        tracing::info!(
            "Removed {} chunks from {} excluded files",
            excluded_ids.len(),
            excluded_sources.len()
        );
        Ok(excluded_ids.len())
    }

    /// Index every document under the project root.
    ///
    /// The whole cache is cleared first and per-file invalidation is skipped.
    /// Unreadable files and store rejections are recorded in the report and
    /// do not stop the walk. `cancel` is checked between files only.
    pub fn index_project(&mut self, cancel: Option<&CancellationToken>) -> Result<IngestReport> {
        if !self.project_root.is_dir() {
            return Err(RagError::Io {
                source: std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "project root is not a directory",
                ),
                context: format!("Cannot index {}", self.project_root.display()),
            });
        }

        self.cache_mut()?.invalidate_all();

        let files = self.project_documents();
        tracing::info!(
            "Indexing {} documents under {}",
            files.len(),
            self.project_root.display()
        );

        let mut report = IngestReport::default();
        for path in files {
            if cancel.is_some_and(CancellationToken::is_cancelled) {
                tracing::info!("Project indexing cancelled");
                report.cancelled = true;
                break;
            }

            let source = path.to_string_lossy().into_owned();
            let Some(content) = self.fs.read_file(&path) else {
                tracing::warn!("Skipping unreadable file {}", path.display());
                report.failures.push(IngestFailure {
                    path,
                    error: IngestError::Unreadable,
                });
                continue;
            };

            match self.write_chunks(&source, &content) {
                Ok(count) => {
                    self.record_mtime(&source);
                    report.indexed.push((path, count));
                }
                Err(e) => {
                    tracing::warn!("Failed to index {}: {}", path.display(), e);
                    report.failures.push(IngestFailure {
                        path,
                        error: IngestError::VectorStore(e),
                    });
                }
            }
        }

        self.rebuild()?;

        tracing::info!(
            "Indexed {} chunks from {} files ({} failures)",
            report.total_chunks(),
            report.indexed.len(),
            report.failures.len()
        );
        Ok(report)
    }

    /// Ranked chunk texts for `query`, served from the cache when possible
    pub fn query(&self, query: &str, k: usize, use_hybrid: bool) -> Result<Vec<String>> {
        validate_query(query)?;
        if k == 0 {
            return Ok(Vec::new());
        }

        if let Some(cached) = self.lock_cache()?.get(query) {
            return Ok(cached);
        }

        let results = self.ranked(query, k, use_hybrid)?;
        let texts: Vec<String> = results.iter().map(|r| r.text.clone()).collect();
        let sources: Vec<String> = results.iter().map(|r| r.metadata.source.clone()).collect();

        self.lock_cache()?.set(query, texts.clone(), sources);
        Ok(texts)
    }

    /// Ranked chunks with ids, metadata and scores. Never cached.
    pub fn query_with_metadata(
        &self,
        query: &str,
        k: usize,
        use_hybrid: bool,
    ) -> Result<Vec<ScoredChunk>> {
        validate_query(query)?;
        if k == 0 {
            return Ok(Vec::new());
        }
        self.ranked(query, k, use_hybrid)
    }

    /// Hybrid results for `query` trimmed to the context budget.
    ///
    /// `context_window` overrides the configured window for this call only.
    /// Sources that survive are stamped as recently used.
    pub fn get_optimized_context(
        &self,
        query: &str,
        k: usize,
        context_window: Option<usize>,
    ) -> Result<(Vec<String>, OptimizationStats)> {
        let optimizer = match context_window {
            Some(window) => self.optimizer.with_context_window(window),
            None => self.optimizer.clone(),
        };

        let results = self.query_with_metadata(query, k, true)?;
        if results.is_empty() {
            return Ok((
                Vec::new(),
                OptimizationStats::empty(OptimizationStatus::NoResults, optimizer.max_tokens()),
            ));
        }

        let semantic_scores: Vec<f64> = (0..results.len()).map(rank_semantic_score).collect();
        let recency_bonus = self.usage_recency()?;
        let chunks = results.into_iter().map(Into::into).collect();

        let (kept, stats) =
            optimizer.optimize(chunks, Some(semantic_scores.as_slice()), Some(&recency_bonus));

        let now = Utc::now();
        let mut last_included = self
            .last_included
            .lock()
            .map_err(|_| RagError::LockPoisoned)?;
        for chunk in &kept {
            last_included.insert(chunk.metadata.source.clone(), now);
        }

        tracing::debug!(
            "Optimized context: {} ({} of {} tokens)",
            stats.status.as_str(),
            stats.used_tokens,
            stats.total_tokens
        );

        Ok((kept.into_iter().map(|chunk| chunk.text).collect(), stats))
    }

    /// Index status of a document, or `None` for non-document files
    pub fn get_file_index_status(&self, path: &str) -> Option<IndexStatus> {
        if !self.has_document_extension(Path::new(path)) {
            return None;
        }

        let Some(indexed) = self.indexed_files.get(path) else {
            return Some(IndexStatus::NotIndexed);
        };

        match self.fs.mtime(Path::new(path)) {
            Some(current) if current > *indexed => Some(IndexStatus::NeedsReindex),
            Some(_) => Some(IndexStatus::Indexed),
            None => Some(IndexStatus::NotIndexed),
        }
    }

    /// Whether `source` lies inside an excluded directory of the project
    pub fn is_excluded(&self, source: &str) -> bool {
        let relative = Path::new(source)
            .strip_prefix(&self.project_root)
            .ok()
            .and_then(Path::to_str)
            .unwrap_or(source);

        relative
            .replace('\\', "/")
            .split('/')
            .any(|part| self.config.indexing.excluded_dirs.iter().any(|dir| dir == part))
    }

    fn ranked(&self, query: &str, k: usize, use_hybrid: bool) -> Result<Vec<ScoredChunk>> {
        if !use_hybrid || self.corpus.is_empty() {
            self.vector_only(query, k)
        } else {
            self.hybrid(query, k)
        }
    }

    fn vector_only(&self, query: &str, k: usize) -> Result<Vec<ScoredChunk>> {
        let response = self.store.query(&[query.to_string()], k.saturating_mul(2))?;

        let (Some(ids), Some(documents), Some(distances), Some(metadatas)) = (
            response.ids.into_iter().next(),
            response.documents.into_iter().next(),
            response.distances.into_iter().next(),
            response.metadatas.into_iter().next(),
        ) else {
            return Ok(Vec::new());
        };

        let results: Vec<ScoredChunk> = ids
            .into_iter()
            .zip(documents)
            .zip(distances)
            .zip(metadatas)
            .map(|(((id, text), distance), metadata)| {
                ScoredChunk::new(
                    id,
                    text,
                    ChunkMetadata::from_store_map(&metadata),
                    similarity_from_distance(distance),
                )
            })
            .filter(|result| !self.is_excluded(&result.metadata.source))
            .take(k)
            .collect();

        tracing::debug!("Vector-only query returned {} chunks", results.len());
        Ok(results)
    }

    fn hybrid(&self, query: &str, k: usize) -> Result<Vec<ScoredChunk>> {
        let response = self.store.query(&[query.to_string()], k.saturating_mul(2))?;

        // Store rows stand in for ids the keyword corpus does not mirror
        let mut extra: HashMap<String, (String, Metadata)> = HashMap::new();
        let mut semantic: HashMap<String, f64> = HashMap::new();
        if let (Some(ids), Some(documents), Some(distances), Some(metadatas)) = (
            response.ids.into_iter().next(),
            response.documents.into_iter().next(),
            response.distances.into_iter().next(),
            response.metadatas.into_iter().next(),
        ) {
            for (((id, text), distance), metadata) in
                ids.into_iter().zip(documents).zip(distances).zip(metadatas)
            {
                semantic.insert(id.clone(), similarity_from_distance(distance));
                extra.insert(id, (text, metadata));
            }
        }
        normalize_by_max(&mut semantic);

        let mut keyword: HashMap<String, f64> = self
            .corpus
            .iter()
            .zip(self.keyword_index.score(query))
            .map(|(entry, score)| (entry.id.clone(), score))
            .collect();
        normalize_by_max(&mut keyword);

        let mut candidates: HashMap<&str, (&str, &Metadata)> = HashMap::new();
        for entry in &self.corpus {
            candidates.insert(entry.id.as_str(), (entry.text.as_str(), &entry.metadata));
        }
        for (id, (text, metadata)) in &extra {
            candidates
                .entry(id.as_str())
                .or_insert((text.as_str(), metadata));
        }

        let now = Utc::now();
        let mut freshness_by_source: HashMap<&str, f64> = HashMap::new();
        let mut scored: Vec<(&str, f64)> = Vec::with_capacity(candidates.len());

        for (&id, (_, metadata)) in &candidates {
            let source = metadata
                .get("source")
                .and_then(|v| v.as_str())
                .unwrap_or_else(|| source_of_id(id));
            if self.is_excluded(source) {
                continue;
            }

            let freshness = *freshness_by_source
                .entry(source)
                .or_insert_with(|| self.freshness_of(source, now));
            let kw = keyword.get(id).copied().unwrap_or(0.0);
            let sem = semantic.get(id).copied().unwrap_or(0.0);

            scored.push((id, self.weights.fuse(kw, sem, freshness)));
        }

        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(b.0))
        });

        // Top k, backfilled from the next-ranked candidates up to the minimum
        let wanted = k.max(self.config.retrieval.min_hybrid_results);
        scored.truncate(wanted);

        let results: Vec<ScoredChunk> = scored
            .into_iter()
            .filter_map(|(id, score)| {
                let (text, metadata) = candidates.get(id)?;
                Some(ScoredChunk::new(
                    id.to_string(),
                    text.to_string(),
                    ChunkMetadata::from_store_map(metadata),
                    score,
                ))
            })
            .collect();

        tracing::debug!(
            "Hybrid query returned {} chunks (keyword {:.0}%, semantic {:.0}%, freshness {:.0}%)",
            results.len(),
            self.weights.keyword * 100.0,
            self.weights.semantic * 100.0,
            self.weights.freshness * 100.0
        );
        Ok(results)
    }

    /// Chunk `content` and write it to the store without touching the
    /// keyword index. Stale ids left over from a longer previous version of
    /// the document are deleted.
    fn write_chunks(
        &mut self,
        path: &str,
        content: &str,
    ) -> std::result::Result<usize, VectorStoreError> {
        let chunks = self.chunker.chunk(content, path);

        let ids: Vec<String> = chunks.iter().map(|c| c.id()).collect();
        let documents: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let metadatas: Vec<Metadata> = chunks.iter().map(|c| c.metadata.to_store_map()).collect();

        let previous = self
            .store
            .get(&GetRequest::filter(MetadataFilter::source(path)))?;

        if !ids.is_empty() {
            self.store.upsert(&ids, &documents, &metadatas)?;
        }

        let current: HashSet<&str> = ids.iter().map(String::as_str).collect();
        let stale: Vec<String> = previous
            .ids
            .into_iter()
            .filter(|id| !current.contains(id.as_str()))
            .collect();
        if !stale.is_empty() {
            tracing::debug!("Deleting {} stale chunks of {}", stale.len(), path);
            self.store.delete(&stale)?;
        }

        Ok(chunks.len())
    }

    fn project_documents(&self) -> Vec<PathBuf> {
        let excluded = &self.config.indexing.excluded_dirs;

        WalkDir::new(&self.project_root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| {
                entry.depth() == 0
                    || !entry.file_type().is_dir()
                    || !excluded
                        .iter()
                        .any(|dir| entry.file_name().to_str() == Some(dir.as_str()))
            })
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    tracing::warn!("Skipping unreadable directory entry: {}", e);
                    None
                }
            })
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.into_path())
            .filter(|path| self.has_document_extension(path))
            .collect()
    }

    fn has_document_extension(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| self.config.indexing.extensions.iter().any(|e| e == ext))
    }

    fn record_mtime(&mut self, path: &str) {
        if let Some(mtime) = self.fs.mtime(Path::new(path)) {
            self.indexed_files.insert(path.to_string(), mtime);
        }
    }

    /// File freshness in `[0, 1]`; files never seen on disk score zero
    fn freshness_of(&self, source: &str, now: DateTime<Utc>) -> f64 {
        let mtime = self
            .indexed_files
            .get(source)
            .copied()
            .or_else(|| self.fs.mtime(Path::new(source)));

        match mtime {
            Some(mtime) => {
                let age_secs = (now - mtime).num_milliseconds() as f64 / 1000.0;
                self.freshness.score(age_secs)
            }
            None => 0.0,
        }
    }

    fn usage_recency(&self) -> Result<HashMap<String, f64>> {
        let now = Utc::now();
        let last_included = self.last_included.lock().map_err(|_| RagError::LockPoisoned)?;

        Ok(last_included
            .iter()
            .map(|(source, at)| {
                let age_secs = (now - *at).num_milliseconds() as f64 / 1000.0;
                (source.clone(), usage_recency_bonus(age_secs))
            })
            .collect())
    }

    fn lock_cache(&self) -> Result<std::sync::MutexGuard<'_, QueryCache>> {
        self.cache.lock().map_err(|_| RagError::LockPoisoned)
    }

    fn cache_mut(&mut self) -> Result<&mut QueryCache> {
        self.cache.get_mut().map_err(|_| RagError::LockPoisoned)
    }
}

fn validate_query(query: &str) -> Result<()> {
    if query.trim().is_empty() {
        return Err(RagError::InvalidQuery(
            "Query text cannot be empty".to_string(),
        ));
    }
    Ok(())
}

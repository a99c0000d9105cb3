//! Query result cache with TTL and file-modification invalidation
//!
//! Entries are keyed by the exact query text. An entry dies when its TTL
//! elapses, when any file it was built from disappears, or when such a file's
//! modification time moves past the one recorded for that entry. Each entry
//! keeps its own snapshot, taken at insertion or, for files that did not
//! exist yet, at the first lookup.
//! Capacity overflow evicts the oldest *inserted* entry (FIFO, not LRU).

use crate::config::CacheConfig;
use crate::fs::FileSystem;
use ahash::{HashMap, HashMapExt};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
struct CacheEntry {
    results: Vec<String>,
    inserted_at: Instant,
    /// Modification time of each source file as this entry last saw it
    source_files: BTreeMap<String, Option<DateTime<Utc>>>,
}

/// Snapshot of cache counters
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub invalidations: u64,
    /// Hits as a percentage of all lookups
    pub hit_rate: f64,
    /// Entries currently held
    pub cached_queries: usize,
}

/// TTL- and mtime-aware cache of query results
pub struct QueryCache {
    ttl: Duration,
    max_entries: usize,
    entries: HashMap<String, CacheEntry>,
    insertion_order: VecDeque<String>,
    fs: Arc<dyn FileSystem>,
    hits: u64,
    misses: u64,
    invalidations: u64,
}

impl std::fmt::Debug for QueryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryCache")
            .field("ttl", &self.ttl)
            .field("max_entries", &self.max_entries)
            .field("entries", &self.entries.len())
            .finish()
    }
}

impl QueryCache {
    pub fn new(ttl: Duration, max_entries: usize, fs: Arc<dyn FileSystem>) -> Self {
        Self {
            ttl,
            max_entries: max_entries.max(1),
            entries: HashMap::new(),
            insertion_order: VecDeque::new(),
            fs,
            hits: 0,
            misses: 0,
            invalidations: 0,
        }
    }

    pub fn from_config(config: &CacheConfig, fs: Arc<dyn FileSystem>) -> Self {
        Self::new(Duration::from_secs(config.ttl_seconds), config.max_entries, fs)
    }

    /// Look up `query`, evicting the entry if it has gone stale
    pub fn get(&mut self, query: &str) -> Option<Vec<String>> {
        let Some(entry) = self.entries.get(query) else {
            self.misses += 1;
            tracing::debug!("Cache miss: {:?}", query);
            return None;
        };

        if entry.inserted_at.elapsed() > self.ttl {
            tracing::debug!("Cache entry expired: {:?}", query);
            self.evict_stale(query);
            return None;
        }

        let snapshot: Vec<(String, Option<DateTime<Utc>>)> = entry
            .source_files
            .iter()
            .map(|(file, mtime)| (file.clone(), *mtime))
            .collect();

        let mut first_seen = Vec::new();
        for (file, recorded) in snapshot {
            let Some(current) = self.fs.mtime(Path::new(&file)) else {
                tracing::debug!("Cache entry {:?} references missing file {}", query, file);
                self.evict_stale(query);
                return None;
            };

            match recorded {
                None => first_seen.push((file, current)),
                Some(recorded) if current > recorded => {
                    tracing::debug!("Cache entry {:?} outdated by change to {}", query, file);
                    self.evict_stale(query);
                    return None;
                }
                Some(_) => {}
            }
        }

        let entry = self.entries.get_mut(query)?;
        for (file, mtime) in first_seen {
            entry.source_files.insert(file, Some(mtime));
        }

        self.hits += 1;
        tracing::debug!("Cache hit: {:?}", query);
        Some(entry.results.clone())
    }

    /// Store `results` for `query`, remembering which files produced them
    pub fn set<I, S>(&mut self, query: &str, results: Vec<String>, source_files: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let source_files: BTreeMap<String, Option<DateTime<Utc>>> = source_files
            .into_iter()
            .map(Into::into)
            .map(|file: String| {
                let mtime = self.fs.mtime(Path::new(&file));
                (file, mtime)
            })
            .collect();

        if self.entries.contains_key(query) {
            self.insertion_order.retain(|q| q != query);
        } else if self.entries.len() >= self.max_entries {
            if let Some(oldest) = self.insertion_order.pop_front() {
                self.entries.remove(&oldest);
                tracing::debug!("Cache full, evicted oldest query {:?}", oldest);
            }
        }

        self.entries.insert(
            query.to_string(),
            CacheEntry {
                results,
                inserted_at: Instant::now(),
                source_files,
            },
        );
        self.insertion_order.push_back(query.to_string());
    }

    /// Drop every entry built from `path`; returns how many were dropped
    pub fn invalidate_file(&mut self, path: &str) -> usize {
        let stale: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.source_files.contains_key(path))
            .map(|(query, _)| query.clone())
            .collect();

        for query in &stale {
            self.remove(query);
        }

        if !stale.is_empty() {
            self.invalidations += stale.len() as u64;
            tracing::info!("Invalidated {} cache entries for {}", stale.len(), path);
        }
        stale.len()
    }

    /// Clear every entry along with its recorded modification times
    pub fn invalidate_all(&mut self) -> usize {
        let count = self.entries.len();
        self.entries.clear();
        self.insertion_order.clear();

        if count > 0 {
            self.invalidations += count as u64;
            tracing::info!("Cleared all {} cache entries", count);
        }
        count
    }

    pub fn stats(&self) -> CacheStats {
        let lookups = self.hits + self.misses;
        let hit_rate = if lookups > 0 {
            self.hits as f64 / lookups as f64 * 100.0
        } else {
            0.0
        };

        CacheStats {
            hits: self.hits,
            misses: self.misses,
            invalidations: self.invalidations,
            hit_rate,
            cached_queries: self.entries.len(),
        }
    }

    /// Whether `query` currently has an entry (without validating it)
    pub fn contains(&self, query: &str) -> bool {
        self.entries.contains_key(query)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn evict_stale(&mut self, query: &str) {
        self.remove(query);
        self.invalidations += 1;
        self.misses += 1;
    }

    fn remove(&mut self, query: &str) {
        self.entries.remove(query);
        self.insertion_order.retain(|q| q != query);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeFs {
        mtimes: Mutex<HashMap<String, DateTime<Utc>>>,
    }

    impl FakeFs {
        fn touch(&self, path: &str, secs: i64) {
            let time = DateTime::<Utc>::from_timestamp(secs, 0).unwrap();
            self.mtimes.lock().unwrap().insert(path.to_string(), time);
        }

        fn remove(&self, path: &str) {
            self.mtimes.lock().unwrap().remove(path);
        }
    }

    impl FileSystem for FakeFs {
        fn read_file(&self, _path: &Path) -> Option<String> {
            None
        }

        fn mtime(&self, path: &Path) -> Option<DateTime<Utc>> {
            self.mtimes
                .lock()
                .unwrap()
                .get(path.to_str().unwrap())
                .copied()
        }
    }

    fn cache_with(fs: Arc<FakeFs>, max_entries: usize) -> QueryCache {
        QueryCache::new(Duration::from_secs(600), max_entries, fs)
    }

    #[test]
    fn test_hit_after_set() {
        let fs = Arc::new(FakeFs::default());
        fs.touch("a.md", 100);
        let mut cache = cache_with(fs, 5);

        cache.set("q", vec!["r".to_string()], ["a.md"]);
        assert_eq!(cache.get("q"), Some(vec!["r".to_string()]));
        assert_eq!(cache.stats().hits, 1);
    }

    #[test]
    fn test_modified_file_invalidates() {
        let fs = Arc::new(FakeFs::default());
        fs.touch("a.md", 100);
        let mut cache = cache_with(fs.clone(), 5);

        cache.set("q", vec!["r".to_string()], ["a.md"]);
        fs.touch("a.md", 200);

        assert!(cache.get("q").is_none());
        let stats = cache.stats();
        assert_eq!(stats.invalidations, 1);
        assert_eq!(stats.misses, 1);
        assert!(!cache.contains("q"));
    }

    #[test]
    fn test_deleted_file_invalidates() {
        let fs = Arc::new(FakeFs::default());
        fs.touch("a.md", 100);
        let mut cache = cache_with(fs.clone(), 5);

        cache.set("q", vec!["r".to_string()], ["a.md"]);
        fs.remove("a.md");

        assert!(cache.get("q").is_none());
        assert_eq!(cache.stats().invalidations, 1);
    }

    #[test]
    fn test_newer_entry_does_not_rebase_older_one() {
        let fs = Arc::new(FakeFs::default());
        fs.touch("f.md", 100);
        let mut cache = cache_with(fs.clone(), 5);

        cache.set("q1", vec!["old".to_string()], ["f.md"]);
        fs.touch("f.md", 200);
        cache.set("q2", vec!["new".to_string()], ["f.md"]);

        assert!(cache.get("q1").is_none());
        assert_eq!(cache.get("q2"), Some(vec!["new".to_string()]));
        assert_eq!(cache.stats().invalidations, 1);
    }

    #[test]
    fn test_missing_file_recorded_at_first_lookup() {
        let fs = Arc::new(FakeFs::default());
        let mut cache = cache_with(fs.clone(), 5);

        cache.set("q", vec!["r".to_string()], ["late.md"]);
        fs.touch("late.md", 100);
        assert!(cache.get("q").is_some());
        assert!(cache.get("q").is_some());

        fs.touch("late.md", 150);
        assert!(cache.get("q").is_none());
    }

    #[test]
    fn test_fifo_eviction() {
        let fs = Arc::new(FakeFs::default());
        let mut cache = cache_with(fs, 2);

        cache.set("one", vec![], Vec::<String>::new());
        cache.set("two", vec![], Vec::<String>::new());
        // Reading does not refresh insertion order
        assert!(cache.get("one").is_some());
        cache.set("three", vec![], Vec::<String>::new());

        assert_eq!(cache.len(), 2);
        assert!(!cache.contains("one"));
        assert!(cache.contains("two"));
        assert!(cache.contains("three"));
    }

    #[test]
    fn test_overwrite_does_not_evict() {
        let fs = Arc::new(FakeFs::default());
        let mut cache = cache_with(fs, 2);

        cache.set("one", vec!["a".to_string()], Vec::<String>::new());
        cache.set("two", vec![], Vec::<String>::new());
        cache.set("one", vec!["b".to_string()], Vec::<String>::new());

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("one"), Some(vec!["b".to_string()]));
    }

    #[test]
    fn test_invalidate_file_and_all() {
        let fs = Arc::new(FakeFs::default());
        fs.touch("a.md", 1);
        fs.touch("b.md", 1);
        let mut cache = cache_with(fs, 5);

        cache.set("q1", vec![], ["a.md"]);
        cache.set("q2", vec![], ["a.md", "b.md"]);
        cache.set("q3", vec![], ["b.md"]);

        assert_eq!(cache.invalidate_file("a.md"), 2);
        assert!(cache.contains("q3"));
        assert_eq!(cache.invalidate_all(), 1);
        assert!(cache.is_empty());
        assert_eq!(cache.stats().invalidations, 3);
    }

    #[test]
    fn test_hit_rate() {
        let fs = Arc::new(FakeFs::default());
        let mut cache = cache_with(fs, 5);

        cache.set("q", vec![], Vec::<String>::new());
        cache.get("q");
        cache.get("missing");

        let stats = cache.stats();
        assert!((stats.hit_rate - 50.0).abs() < 1e-9);
        assert_eq!(stats.cached_queries, 1);
    }
}

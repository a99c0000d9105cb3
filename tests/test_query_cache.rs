//! Integration tests for the query cache against real and fake filesystems

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use inkrag::fs::{FileSystem, LocalFs};
use inkrag::QueryCache;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

/// Filesystem whose modification times are set by the test
#[derive(Default)]
struct ClockFs {
    mtimes: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl ClockFs {
    fn set(&self, path: &str, mtime: DateTime<Utc>) {
        self.mtimes.lock().unwrap().insert(path.to_string(), mtime);
    }
}

impl FileSystem for ClockFs {
    fn read_file(&self, _path: &Path) -> Option<String> {
        None
    }

    fn mtime(&self, path: &Path) -> Option<DateTime<Utc>> {
        self.mtimes
            .lock()
            .unwrap()
            .get(path.to_string_lossy().as_ref())
            .copied()
    }
}

#[test]
fn test_ttl_expiry() {
    let mut cache = QueryCache::new(Duration::from_secs(1), 5, Arc::new(LocalFs));

    cache.set("q", vec!["r".to_string()], Vec::<String>::new());
    assert!(cache.get("q").is_some());

    std::thread::sleep(Duration::from_millis(1100));

    assert!(cache.get("q").is_none());
    let stats = cache.stats();
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.invalidations, 1);
    assert_eq!(stats.cached_queries, 0);
}

#[test]
fn test_mtime_bump_invalidates() {
    let fs = Arc::new(ClockFs::default());
    let t0 = Utc::now();
    fs.set("/novel/ch1.md", t0);

    let mut cache = QueryCache::new(Duration::from_secs(600), 5, fs.clone());
    cache.set(
        "who is the keeper",
        vec!["The keeper climbed".to_string()],
        ["/novel/ch1.md"],
    );
    assert!(cache.get("who is the keeper").is_some());

    fs.set("/novel/ch1.md", t0 + ChronoDuration::seconds(5));

    assert!(cache.get("who is the keeper").is_none());
    assert_eq!(cache.stats().invalidations, 1);
}

#[test]
fn test_unchanged_or_older_mtime_still_hits() {
    let fs = Arc::new(ClockFs::default());
    let t0 = Utc::now();
    fs.set("a.md", t0);

    let mut cache = QueryCache::new(Duration::from_secs(600), 5, fs.clone());
    cache.set("q", vec!["r".to_string()], ["a.md"]);

    fs.set("a.md", t0 - ChronoDuration::seconds(30));
    assert!(cache.get("q").is_some());
}

#[test]
fn test_mtime_recorded_on_first_lookup() {
    let fs = Arc::new(ClockFs::default());
    let mut cache = QueryCache::new(Duration::from_secs(600), 5, fs.clone());

    // The file does not exist yet, so nothing is recorded at insert time
    cache.set("q", vec!["r".to_string()], ["late.md"]);

    let t0 = Utc::now();
    fs.set("late.md", t0);
    assert!(cache.get("q").is_some());

    fs.set("late.md", t0 + ChronoDuration::seconds(1));
    assert!(cache.get("q").is_none());
}

#[test]
fn test_capacity_is_fifo() {
    let max_entries = 5;
    let mut cache = QueryCache::new(Duration::from_secs(600), max_entries, Arc::new(LocalFs));

    for i in 0..=max_entries {
        cache.set(&format!("query {}", i), vec![format!("r{}", i)], Vec::<String>::new());
    }

    assert_eq!(cache.len(), max_entries);
    assert!(!cache.contains("query 0"));
    for i in 1..=max_entries {
        assert!(cache.contains(&format!("query {}", i)));
    }
}

#[test]
fn test_real_file_removed() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("draft.md");
    std::fs::write(&path, "# Draft").unwrap();
    let source = path.to_string_lossy().into_owned();

    let mut cache = QueryCache::new(Duration::from_secs(600), 5, Arc::new(LocalFs));
    cache.set("draft", vec!["# Draft".to_string()], [source.clone()]);
    assert!(cache.get("draft").is_some());

    std::fs::remove_file(&path).unwrap();
    assert!(cache.get("draft").is_none());
    assert_eq!(cache.stats().invalidations, 1);
}

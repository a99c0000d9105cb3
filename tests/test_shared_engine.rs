//! Concurrency tests for the shared engine handle

use inkrag::config::RagConfig;
use inkrag::retrieval::OptimizationStatus;
use inkrag::{InMemoryVectorStore, RetrievalEngine, SharedEngine};

fn shared() -> SharedEngine {
    let mut config = RagConfig::default();
    config.chunking.min_tokens = 0;
    let engine =
        RetrievalEngine::new("/novel", config, Box::new(InMemoryVectorStore::new())).unwrap();
    SharedEngine::new(engine)
}

fn scene(i: usize) -> String {
    format!(
        "# Scene {}\n\nThe keeper lit lantern number {} as the fog rolled over the harbour.",
        i, i
    )
}

#[test]
fn test_readers_run_while_writer_indexes() {
    let engine = shared();
    engine.index_file("/novel/scene0.md", &scene(0), true).unwrap();

    std::thread::scope(|s| {
        let writer = engine.clone();
        s.spawn(move || {
            for i in 1..20 {
                writer
                    .index_file(&format!("/novel/scene{}.md", i), &scene(i), true)
                    .unwrap();
            }
        });

        for _ in 0..4 {
            let reader = engine.clone();
            s.spawn(move || {
                for _ in 0..25 {
                    let results = reader
                        .query_with_metadata("keeper lantern fog", 3, true)
                        .unwrap();
                    assert!(!results.is_empty());
                    assert!(results.len() <= 3);

                    reader.query("harbour", 2, true).unwrap();

                    let (_, stats) = reader
                        .get_optimized_context("keeper lantern", 3, None)
                        .unwrap();
                    assert_ne!(stats.status, OptimizationStatus::NoResults);
                }
            });
        }
    });

    assert_eq!(engine.chunk_count().unwrap(), 20);
    let ids_match = engine
        .with_engine(|e| {
            let stored = e.store().get(&inkrag::index::GetRequest::all()).unwrap();
            stored.ids == e.chunk_ids()
        })
        .unwrap();
    assert!(ids_match);
}

#[test]
fn test_window_change_is_visible_to_readers() {
    let engine = shared();
    engine.index_file("/novel/scene0.md", &scene(0), true).unwrap();

    engine.set_context_window(1000).unwrap();

    let (_, stats) = engine.get_optimized_context("keeper", 3, None).unwrap();
    assert_eq!(stats.max_allowed, 700);
}

//! Integration tests for token-budget context optimization

use ahash::{HashMap, HashMapExt};
use inkrag::chunking::{Chunk, ChunkMetadata, ContentType};
use inkrag::retrieval::{ContextOptimizer, OptimizationStatus};

fn chunk(source: &str, index: usize, chars: usize) -> Chunk {
    Chunk {
        text: format!("{:<width$}", format!("{}#{}", source, index), width = chars),
        metadata: ChunkMetadata {
            source: source.to_string(),
            heading_path: vec!["Scene".to_string()],
            start_line: index * 10,
            end_line: index * 10 + 10,
            content_type: ContentType::Text,
            chunk_index: index,
        },
    }
}

#[test]
fn test_three_chunks_over_budget() {
    let optimizer = ContextOptimizer::new(100, 0.5);
    let input = vec![
        chunk("a.md", 0, 120),
        chunk("b.md", 0, 120),
        chunk("c.md", 0, 120),
    ];

    let (kept, stats) = optimizer.optimize(input, None, None);

    assert_eq!(stats.max_allowed, 50);
    assert_eq!(stats.total_tokens, 90);
    assert!(kept.len() <= 2);
    assert!(stats.dropped_chunks >= 1);
    assert_eq!(stats.dropped_chunks, stats.dropped_details.len());
    assert_eq!(stats.status, OptimizationStatus::Truncated);
}

#[test]
fn test_fitting_input_is_returned_unchanged() {
    let optimizer = ContextOptimizer::new(4096, 0.7);
    let input: Vec<Chunk> = (0..6).map(|i| chunk("ch.md", i, 200)).collect();

    let (kept, stats) = optimizer.optimize(input.clone(), Some(&[1.0, 0.0, 0.5][..]), None);

    assert_eq!(kept, input);
    assert_eq!(stats.status, OptimizationStatus::NoTruncationNeeded);
    assert_eq!(stats.used_tokens, stats.total_tokens);
    assert!(stats.dropped_details.is_empty());
}

#[test]
fn test_selection_keeps_candidate_order() {
    let optimizer = ContextOptimizer::new(400, 0.5);
    let sizes = [160, 40, 320, 80, 120, 60, 200, 100, 40, 240];
    let input: Vec<Chunk> = sizes
        .iter()
        .enumerate()
        .map(|(i, &chars)| chunk(&format!("s{}.md", i), i, chars))
        .collect();

    // Scores that run against candidate order push selection out of order
    let semantic: Vec<f64> = (0..sizes.len()).map(|i| i as f64 / 10.0).collect();
    let mut recency = HashMap::new();
    recency.insert("s9.md".to_string(), 1.0);
    recency.insert("s7.md".to_string(), 0.8);

    let (kept, stats) =
        optimizer.optimize(input.clone(), Some(semantic.as_slice()), Some(&recency));

    assert_eq!(stats.status, OptimizationStatus::Truncated);
    assert!(stats.used_tokens <= optimizer.max_tokens());

    let positions: Vec<usize> = kept
        .iter()
        .map(|k| input.iter().position(|c| c == k).unwrap())
        .collect();
    assert!(positions.windows(2).all(|w| w[0] < w[1]));

    let kept_tokens: usize = kept.iter().map(Chunk::tokens).sum();
    assert_eq!(kept_tokens, stats.used_tokens);
    assert_eq!(kept.len() + stats.dropped_chunks, input.len());
}

#[test]
fn test_dropped_details_describe_chunks() {
    let optimizer = ContextOptimizer::new(40, 1.0);
    let input = vec![chunk("keep.md", 0, 100), chunk("drop.md", 3, 100)];

    let (kept, stats) = optimizer.optimize(input, None, None);

    assert_eq!(kept.len(), 1);
    let dropped = &stats.dropped_details[0];
    assert_eq!(dropped.index, 1);
    assert_eq!(dropped.source, "drop.md");
    assert_eq!(dropped.heading_path, vec!["Scene"]);
    assert_eq!(dropped.tokens, 25);
    assert!((dropped.priority - (0.5 + 0.3 * 0.5)).abs() < 1e-9);
}

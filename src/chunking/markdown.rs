//! Markdown chunker
//!
//! Walks a document line by line, cutting a new chunk whenever a heading
//! starts, the running token estimate would pass `max_tokens`, or an open
//! code block grows past twice `default_tokens`. The heading stack recorded on
//! a chunk is the one in force *before* the heading that ended it.

use super::{estimate_tokens, Chunk, ChunkMetadata, ContentType};
use crate::config::ChunkingConfig;
use regex::Regex;
use std::sync::OnceLock;

/// Heading path given to a leading frontmatter block
const FRONTMATTER_HEADING: &str = "Frontmatter";

fn heading_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(#{1,6})\s+(.+)$").expect("heading pattern is valid"))
}

fn yaml_frontmatter_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)\A---\n(.*?)\n---\n(.*)\z").expect("frontmatter pattern is valid")
    })
}

fn toml_frontmatter_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)\A\+\+\+\n(.*?)\n\+\+\+\n(.*)\z").expect("frontmatter pattern is valid")
    })
}

/// A frontmatter block split off the front of a document
struct Frontmatter<'a> {
    content: &'a str,
    body: &'a str,
    /// Number of document lines consumed by the block and its delimiters
    line_count: usize,
}

/// Line held in the accumulation buffer
struct BufferedLine<'a> {
    text: &'a str,
    tokens: usize,
    in_code: bool,
}

/// Structure-aware markdown chunker
#[derive(Debug, Clone)]
pub struct MarkdownChunker {
    config: ChunkingConfig,
}

impl Default for MarkdownChunker {
    fn default() -> Self {
        Self::new(ChunkingConfig::default())
    }
}

impl MarkdownChunker {
    pub fn new(config: ChunkingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ChunkingConfig {
        &self.config
    }

    /// Split `text` into ordered chunks attributed to `source`.
    ///
    /// Identical input always yields an identical chunk sequence, which is
    /// what makes re-indexing a file an idempotent upsert.
    pub fn chunk(&self, text: &str, source: &str) -> Vec<Chunk> {
        let mut chunks = Vec::new();
        let mut chunk_index = 0;

        let (body, line_offset) = match split_frontmatter(text) {
            Some(fm) => {
                if !fm.content.trim().is_empty() {
                    chunks.push(Chunk {
                        text: fm.content.to_string(),
                        metadata: ChunkMetadata {
                            source: source.to_string(),
                            heading_path: vec![FRONTMATTER_HEADING.to_string()],
                            start_line: 0,
                            end_line: fm.line_count,
                            content_type: ContentType::Frontmatter,
                            chunk_index,
                        },
                    });
                    chunk_index += 1;
                }
                (fm.body, fm.line_count)
            }
            None => (text, 0),
        };

        let lines: Vec<&str> = body
            .split('\n')
            .map(|line| line.strip_suffix('\r').unwrap_or(line))
            .collect();

        let mut buffer: Vec<BufferedLine> = Vec::new();
        let mut buffer_tokens = 0usize;
        let mut headings: Vec<(usize, String)> = Vec::new();
        let mut chunk_start = 0usize;
        let mut in_code_block = false;

        for (line_idx, &line) in lines.iter().enumerate() {
            // `#` lines inside a fenced block are code, not headings
            let heading = if in_code_block {
                None
            } else {
                parse_heading(line)
            };
            let is_fence = line.starts_with("```");
            if is_fence {
                in_code_block = !in_code_block;
            }

            let line_tokens = estimate_tokens(line);

            let should_flush = if heading.is_some() && !buffer.is_empty() {
                true
            } else if buffer_tokens + line_tokens > self.config.max_tokens {
                true
            } else if in_code_block
                && buffer_tokens + line_tokens > self.config.default_tokens * 2
            {
                buffer_tokens > self.config.default_tokens
            } else {
                false
            };

            if should_flush && !buffer.is_empty() {
                if let Some(chunk) = build_chunk(
                    source,
                    &buffer,
                    &headings,
                    line_offset + chunk_start,
                    line_offset + line_idx,
                    chunk_index,
                ) {
                    if chunk.tokens() >= self.config.min_tokens {
                        chunks.push(chunk);
                        chunk_index += 1;
                    }
                }

                let overlap = self.overlap_window(&mut buffer);
                buffer_tokens = overlap.iter().map(|l| l.tokens).sum();
                chunk_start = line_idx - overlap.len();
                buffer = overlap;
            }

            if let Some((level, title)) = heading {
                while headings.last().is_some_and(|(top, _)| *top >= level) {
                    headings.pop();
                }
                headings.push((level, title));
            }

            buffer.push(BufferedLine {
                text: line,
                tokens: line_tokens,
                in_code: in_code_block || is_fence,
            });
            buffer_tokens += line_tokens;
        }

        // The tail is kept regardless of `min_tokens` so short documents survive
        if !buffer.is_empty() {
            if let Some(chunk) = build_chunk(
                source,
                &buffer,
                &headings,
                line_offset + chunk_start,
                line_offset + lines.len(),
                chunk_index,
            ) {
                chunks.push(chunk);
            }
        }

        chunks
    }

    /// Take the trailing lines of `buffer` whose combined estimate fits in
    /// `overlap_tokens`, in document order
    fn overlap_window<'a>(&self, buffer: &mut Vec<BufferedLine<'a>>) -> Vec<BufferedLine<'a>> {
        let mut taken = 0usize;
        let mut tokens = 0usize;
        for line in buffer.iter().rev() {
            if tokens + line.tokens > self.config.overlap_tokens {
                break;
            }
            tokens += line.tokens;
            taken += 1;
        }
        buffer.split_off(buffer.len() - taken)
    }
}

fn split_frontmatter(text: &str) -> Option<Frontmatter<'_>> {
    let regex = if text.starts_with("---") {
        yaml_frontmatter_regex()
    } else if text.starts_with("+++") {
        toml_frontmatter_regex()
    } else {
        return None;
    };

    // Unterminated blocks fall through to ordinary body chunking
    let captures = regex.captures(text)?;
    let content = captures.get(1)?.as_str();
    let body = captures.get(2)?;
    let line_count = text[..body.start()].matches('\n').count();

    Some(Frontmatter {
        content,
        body: body.as_str(),
        line_count,
    })
}

fn parse_heading(line: &str) -> Option<(usize, String)> {
    let captures = heading_regex().captures(line)?;
    let level = captures.get(1)?.as_str().len();
    let title = captures.get(2)?.as_str().trim().to_string();
    Some((level, title))
}

fn build_chunk(
    source: &str,
    buffer: &[BufferedLine],
    headings: &[(usize, String)],
    start_line: usize,
    end_line: usize,
    chunk_index: usize,
) -> Option<Chunk> {
    let joined = buffer
        .iter()
        .map(|l| l.text)
        .collect::<Vec<_>>()
        .join("\n");
    let text = joined.trim();
    if text.is_empty() {
        return None;
    }

    let (code_lines, content_lines) = buffer
        .iter()
        .filter(|l| !l.text.trim().is_empty())
        .fold((0usize, 0usize), |(code, total), l| {
            (code + usize::from(l.in_code), total + 1)
        });
    let content_type = if code_lines * 2 > content_lines {
        ContentType::Code
    } else {
        ContentType::Text
    };

    Some(Chunk {
        text: text.to_string(),
        metadata: ChunkMetadata {
            source: source.to_string(),
            heading_path: headings.iter().map(|(_, title)| title.clone()).collect(),
            start_line,
            end_line,
            content_type,
            chunk_index,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunker_with(
        min_tokens: usize,
        max_tokens: usize,
        overlap_tokens: usize,
    ) -> MarkdownChunker {
        MarkdownChunker::new(ChunkingConfig {
            min_tokens,
            default_tokens: max_tokens / 2,
            max_tokens,
            overlap_tokens,
        })
    }

    #[test]
    fn test_headings_split_chunks() {
        let chunker = chunker_with(0, 1500, 50);
        let chunks = chunker.chunk("# A\nfoo\n# B\nbar", "doc.md");

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].metadata.heading_path, vec!["A"]);
        assert_eq!(chunks[1].metadata.heading_path, vec!["B"]);
        assert_eq!(chunks[0].text, "# A\nfoo");
        assert_eq!(chunks[0].metadata.chunk_index, 0);
        assert_eq!(chunks[1].metadata.chunk_index, 1);
    }

    #[test]
    fn test_nested_heading_path() {
        let chunker = chunker_with(0, 1500, 0);
        let text =
            "# Book\nintro\n## Part One\nbody one\n### Scene\nscene text\n## Part Two\nbody two";
        let chunks = chunker.chunk(text, "book.md");

        let paths: Vec<Vec<String>> = chunks
            .iter()
            .map(|c| c.metadata.heading_path.clone())
            .collect();
        assert_eq!(
            paths,
            vec![
                vec!["Book".to_string()],
                vec!["Book".to_string(), "Part One".to_string()],
                vec![
                    "Book".to_string(),
                    "Part One".to_string(),
                    "Scene".to_string()
                ],
                vec!["Book".to_string(), "Part Two".to_string()],
            ]
        );
    }

    #[test]
    fn test_yaml_frontmatter_chunk() {
        let chunker = chunker_with(0, 1500, 0);
        let text = "---\ntitle: Draft\ntags: [a]\n---\n# Start\nOnce upon a time";
        let chunks = chunker.chunk(text, "story.md");

        assert_eq!(chunks[0].metadata.content_type, ContentType::Frontmatter);
        assert_eq!(chunks[0].text, "title: Draft\ntags: [a]");
        assert_eq!(chunks[0].metadata.heading_path, vec!["Frontmatter"]);
        assert_eq!(chunks[0].metadata.end_line, 4);

        assert_eq!(chunks[1].metadata.chunk_index, 1);
        assert_eq!(chunks[1].metadata.start_line, 4);
        assert!(chunks[1].text.starts_with("# Start"));
    }

    #[test]
    fn test_toml_frontmatter_chunk() {
        let chunker = chunker_with(0, 1500, 0);
        let chunks = chunker.chunk("+++\ntitle = \"x\"\n+++\nbody", "a.md");
        assert_eq!(chunks[0].metadata.content_type, ContentType::Frontmatter);
        assert_eq!(chunks[1].text, "body");
    }

    #[test]
    fn test_unterminated_frontmatter_is_body() {
        let chunker = chunker_with(0, 1500, 0);
        let chunks = chunker.chunk("---\ntitle: Draft\nno closing fence", "a.md");

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].metadata.content_type, ContentType::Text);
        assert!(chunks[0].text.contains("title: Draft"));
    }

    #[test]
    fn test_small_chunks_dropped_but_tail_kept() {
        let chunker = chunker_with(10, 1500, 0);
        let text = "# A\ntiny\n# B\nalso tiny";
        let chunks = chunker.chunk(text, "a.md");

        // First section is under min_tokens; the tail always survives
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].metadata.heading_path, vec!["B"]);
        assert_eq!(chunks[0].metadata.chunk_index, 0);
    }

    #[test]
    fn test_max_tokens_splits_with_overlap() {
        // Every line is 10 chars -> 3 tokens
        let line = "abcdefghij";
        let text = vec![line; 20].join("\n");
        let chunker = chunker_with(0, 12, 3);
        let chunks = chunker.chunk(&text, "a.md");

        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.tokens() <= 12 + 3);
        }
        // The overlap window repeats the previous chunk's last line
        let second_start = chunks[1].metadata.start_line;
        assert!(second_start < chunks[0].metadata.end_line);
    }

    #[test]
    fn test_code_block_content_type() {
        let chunker = chunker_with(0, 1500, 0);
        let text = "# Setup\n```bash\n# not a heading\necho hi\n```";
        let chunks = chunker.chunk(text, "a.md");

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].metadata.heading_path, vec!["Setup"]);
        assert_eq!(chunks[0].metadata.content_type, ContentType::Code);
    }

    #[test]
    fn test_deterministic_output() {
        let chunker = MarkdownChunker::default();
        let text = "# Title\n".to_string() + &"Some prose sentence here. ".repeat(400);
        assert_eq!(chunker.chunk(&text, "a.md"), chunker.chunk(&text, "a.md"));
    }

    #[test]
    fn test_empty_document() {
        let chunker = MarkdownChunker::default();
        assert!(chunker.chunk("", "a.md").is_empty());
        assert!(chunker.chunk("\n\n  \n", "a.md").is_empty());
    }
}

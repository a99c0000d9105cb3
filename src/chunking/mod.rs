//! Structure-aware document chunking
//!
//! Documents are split into [`Chunk`]s along markdown structure (frontmatter,
//! headings, code fences) with a small overlap between neighbours. Each chunk
//! carries a [`ChunkMetadata`] describing where it came from; the metadata is
//! flattened to a JSON object only when it crosses the vector store boundary.

mod markdown;

pub use markdown::MarkdownChunker;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// Estimated tokens per character of English text
pub const TOKENS_PER_CHAR: f64 = 0.25;

/// Heading path stored for chunks that sit above the first heading
const ROOT_HEADING: &str = "Root";

/// Separator used when the heading path is flattened to a string
const HEADING_SEPARATOR: &str = " > ";

/// Estimate the language-model token cost of `text` as `ceil(chars * 0.25)`
pub fn estimate_tokens(text: &str) -> usize {
    (text.chars().count() as f64 * TOKENS_PER_CHAR).ceil() as usize
}

/// Kind of content a chunk holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Text,
    Code,
    Frontmatter,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Text => "text",
            ContentType::Code => "code",
            ContentType::Frontmatter => "frontmatter",
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(ContentType::Text),
            "code" => Ok(ContentType::Code),
            "frontmatter" => Ok(ContentType::Frontmatter),
            other => Err(format!("unknown content type: {}", other)),
        }
    }
}

/// Provenance of a chunk within its source document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// Path of the document the chunk was cut from
    pub source: String,

    /// Enclosing headings, outermost first (empty above the first heading)
    pub heading_path: Vec<String>,

    /// First document line covered (0-based)
    pub start_line: usize,

    /// One past the last document line covered
    pub end_line: usize,

    pub content_type: ContentType,

    /// Position of the chunk within its document
    pub chunk_index: usize,
}

impl ChunkMetadata {
    /// Metadata for a chunk whose source is unknown to the store
    pub fn unknown() -> Self {
        Self {
            source: "unknown".to_string(),
            heading_path: Vec::new(),
            start_line: 0,
            end_line: 0,
            content_type: ContentType::Text,
            chunk_index: 0,
        }
    }

    /// Flatten into the key/value form handed to the vector store
    pub fn to_store_map(&self) -> Map<String, Value> {
        let heading = if self.heading_path.is_empty() {
            ROOT_HEADING.to_string()
        } else {
            self.heading_path.join(HEADING_SEPARATOR)
        };

        let mut map = Map::new();
        map.insert("source".to_string(), Value::from(self.source.clone()));
        map.insert("heading_path".to_string(), Value::from(heading));
        map.insert("start_line".to_string(), Value::from(self.start_line));
        map.insert("end_line".to_string(), Value::from(self.end_line));
        map.insert(
            "content_type".to_string(),
            Value::from(self.content_type.as_str()),
        );
        map.insert("chunk_index".to_string(), Value::from(self.chunk_index));
        map
    }

    /// Rebuild metadata from the vector store's key/value form.
    ///
    /// Missing or mistyped keys fall back to defaults so a foreign row never
    /// aborts a query.
    pub fn from_store_map(map: &Map<String, Value>) -> Self {
        let get_usize = |key: &str| {
            map.get(key)
                .and_then(Value::as_u64)
                .map(|v| v as usize)
                .unwrap_or(0)
        };

        let heading_path = match map.get("heading_path") {
            Some(Value::String(s)) if s != ROOT_HEADING && !s.is_empty() => s
                .split(HEADING_SEPARATOR)
                .map(|part| part.to_string())
                .collect(),
            Some(Value::Array(parts)) => parts
                .iter()
                .filter_map(|p| p.as_str().map(str::to_string))
                .collect(),
            _ => Vec::new(),
        };

        Self {
            source: map
                .get("source")
                .and_then(Value::as_str)
                .unwrap_or("unknown")
                .to_string(),
            heading_path,
            start_line: get_usize("start_line"),
            end_line: get_usize("end_line"),
            content_type: map
                .get("content_type")
                .and_then(Value::as_str)
                .and_then(|s| s.parse().ok())
                .unwrap_or(ContentType::Text),
            chunk_index: get_usize("chunk_index"),
        }
    }
}

/// A contiguous slice of a document plus its provenance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub text: String,
    pub metadata: ChunkMetadata,
}

impl Chunk {
    /// Corpus-wide identifier: `"{source}#{chunk_index}"`
    pub fn id(&self) -> String {
        chunk_id(&self.metadata.source, self.metadata.chunk_index)
    }

    /// Estimated token cost of the chunk text
    pub fn tokens(&self) -> usize {
        estimate_tokens(&self.text)
    }
}

/// Build the identifier of chunk `index` of `source`
pub fn chunk_id(source: &str, index: usize) -> String {
    format!("{}#{}", source, index)
}

/// Recover the source path from a chunk identifier
pub fn source_of_id(id: &str) -> &str {
    id.rsplit_once('#').map(|(source, _)| source).unwrap_or(id)
}

/// Vector store collaborator contract and an in-memory reference store
///
/// The engine never computes embeddings itself. Anything that can upsert,
/// nearest-neighbour query, fetch and delete documents by id can back it.
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use thiserror::Error;

/// Flat key/value metadata stored next to each document
pub type Metadata = Map<String, Value>;

#[derive(Error, Debug)]
pub enum VectorStoreError {
    #[error("Mismatched batch: {ids} ids, {documents} documents, {metadatas} metadatas")]
    LengthMismatch {
        ids: usize,
        documents: usize,
        metadatas: usize,
    },

    #[error("Upsert failed: {0}")]
    UpsertError(String),

    #[error("Query failed: {0}")]
    QueryError(String),

    #[error("Get failed: {0}")]
    GetError(String),

    #[error("Delete failed: {0}")]
    DeleteError(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Nearest-neighbour results, one row per query text
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryResponse {
    pub ids: Vec<Vec<String>>,
    pub documents: Vec<Vec<String>>,
    /// Cosine distances in `[0, 2]`, ascending within a row
    pub distances: Vec<Vec<f64>>,
    pub metadatas: Vec<Vec<Metadata>>,
}

/// Equality filter on a single metadata key
#[derive(Debug, Clone, PartialEq)]
pub struct MetadataFilter {
    pub key: String,
    pub value: Value,
}

impl MetadataFilter {
    pub fn eq(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Match documents whose `source` is `path`
    pub fn source(path: &str) -> Self {
        Self::eq("source", path)
    }

    fn matches(&self, metadata: &Metadata) -> bool {
        metadata.get(&self.key) == Some(&self.value)
    }
}

/// Selection for [`VectorStore::get`]; an empty request selects everything
#[derive(Debug, Clone, Default)]
pub struct GetRequest {
    pub ids: Option<Vec<String>>,
    pub filter: Option<MetadataFilter>,
}

impl GetRequest {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn ids(ids: Vec<String>) -> Self {
        Self {
            ids: Some(ids),
            filter: None,
        }
    }

    pub fn filter(filter: MetadataFilter) -> Self {
        Self {
            ids: None,
            filter: Some(filter),
        }
    }
}

/// Documents fetched by id or filter, as parallel arrays
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GetResponse {
    pub ids: Vec<String>,
    pub documents: Vec<String>,
    pub metadatas: Vec<Metadata>,
}

impl GetResponse {
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// External store that owns document embeddings
pub trait VectorStore: Send + Sync {
    /// Insert or overwrite documents by id
    fn upsert(
        &mut self,
        ids: &[String],
        documents: &[String],
        metadatas: &[Metadata],
    ) -> Result<(), VectorStoreError>;

    /// Return up to `n_results` nearest documents for each query text
    fn query(&self, query_texts: &[String], n_results: usize)
        -> Result<QueryResponse, VectorStoreError>;

    /// Fetch stored documents
    fn get(&self, request: &GetRequest) -> Result<GetResponse, VectorStoreError>;

    /// Delete documents by id; unknown ids are ignored
    fn delete(&mut self, ids: &[String]) -> Result<(), VectorStoreError>;
}

/// Number of buckets in the hashed term vectors
const DEFAULT_DIMENSION: usize = 256;

#[derive(Debug, Clone)]
struct StoredDocument {
    document: String,
    metadata: Metadata,
    vector: Vec<f32>,
}

/// In-process vector store using feature-hashed bag-of-words vectors.
///
/// Terms are lowercased alphanumeric runs hashed with BLAKE3 into a fixed
/// number of buckets; vectors are L2-normalized and compared by cosine
/// distance. Iteration order is by id, so results are deterministic.
#[derive(Debug, Clone)]
pub struct InMemoryVectorStore {
    dimension: usize,
    documents: BTreeMap<String, StoredDocument>,
}

impl Default for InMemoryVectorStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::with_dimension(DEFAULT_DIMENSION)
    }

    pub fn with_dimension(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
            documents: BTreeMap::new(),
        }
    }

    /// Number of stored documents
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    fn embed(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        let lowered = text.to_lowercase();
        for term in lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let hash = blake3::hash(term.as_bytes());
            let bytes = hash.as_bytes();
            let bucket = u64::from_le_bytes([
                bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
            ]) as usize
                % self.dimension;
            vector[bucket] += 1.0;
        }

        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|x| *x /= norm);
        }
        vector
    }

    fn cosine_distance(a: &[f32], b: &[f32]) -> f64 {
        let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
        (1.0 - dot as f64).clamp(0.0, 2.0)
    }
}

impl VectorStore for InMemoryVectorStore {
    fn upsert(
        &mut self,
        ids: &[String],
        documents: &[String],
        metadatas: &[Metadata],
    ) -> Result<(), VectorStoreError> {
        if ids.len() != documents.len() || ids.len() != metadatas.len() {
            return Err(VectorStoreError::LengthMismatch {
                ids: ids.len(),
                documents: documents.len(),
                metadatas: metadatas.len(),
            });
        }

        for ((id, document), metadata) in ids.iter().zip(documents).zip(metadatas) {
            let vector = self.embed(document);
            self.documents.insert(
                id.clone(),
                StoredDocument {
                    document: document.clone(),
                    metadata: metadata.clone(),
                    vector,
                },
            );
        }

        Ok(())
    }

    fn query(
        &self,
        query_texts: &[String],
        n_results: usize,
    ) -> Result<QueryResponse, VectorStoreError> {
        let mut response = QueryResponse::default();

        for query in query_texts {
            let query_vector = self.embed(query);

            let mut scored: Vec<(&String, &StoredDocument, f64)> = self
                .documents
                .iter()
                .map(|(id, doc)| {
                    (id, doc, Self::cosine_distance(&query_vector, &doc.vector))
                })
                .collect();
            scored.sort_by(|a, b| {
                a.2.partial_cmp(&b.2)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| a.0.cmp(b.0))
            });
            scored.truncate(n_results);

            response
                .ids
                .push(scored.iter().map(|(id, _, _)| (*id).clone()).collect());
            response
                .documents
                .push(scored.iter().map(|(_, d, _)| d.document.clone()).collect());
            response
                .distances
                .push(scored.iter().map(|(_, _, dist)| *dist).collect());
            response
                .metadatas
                .push(scored.iter().map(|(_, d, _)| d.metadata.clone()).collect());
        }

        Ok(response)
    }

    fn get(&self, request: &GetRequest) -> Result<GetResponse, VectorStoreError> {
        let mut response = GetResponse::default();

        let selected: Vec<(&String, &StoredDocument)> = match &request.ids {
            Some(ids) => ids
                .iter()
                .filter_map(|id| self.documents.get_key_value(id))
                .collect(),
            None => self.documents.iter().collect(),
        };

        for (id, doc) in selected {
            if let Some(filter) = &request.filter {
                if !filter.matches(&doc.metadata) {
                    continue;
                }
            }
            response.ids.push(id.clone());
            response.documents.push(doc.document.clone());
            response.metadatas.push(doc.metadata.clone());
        }

        Ok(response)
    }

    fn delete(&mut self, ids: &[String]) -> Result<(), VectorStoreError> {
        for id in ids {
            self.documents.remove(id);
        }
        Ok(())
    }
}

/// In-memory BM25 keyword index
///
/// The index is always rebuilt from the complete corpus; there is no
/// incremental insert or delete. Per-document term frequency tables are kept
/// so scoring a query touches only the query's terms.
use ahash::{HashMap, HashMapExt};

/// Term frequency saturation
pub const DEFAULT_K1: f64 = 1.5;

/// Document length normalization
pub const DEFAULT_B: f64 = 0.75;

const STOP_WORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "but", "is", "in", "to", "of", "for", "on", "with", "at", "by",
];

/// Lowercase, split on whitespace, drop tokens of length <= 2 and stop words
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split_whitespace()
        .filter(|t| t.chars().count() > 2 && !STOP_WORDS.contains(t))
        .map(str::to_string)
        .collect()
}

#[derive(Debug, Clone, Default)]
struct DocumentStats {
    term_freqs: HashMap<String, u32>,
    length: usize,
}

/// BM25 ranker over a fixed list of documents
#[derive(Debug, Clone)]
pub struct KeywordIndex {
    k1: f64,
    b: f64,
    documents: Vec<DocumentStats>,
    idf: HashMap<String, f64>,
    avg_doc_length: f64,
}

impl Default for KeywordIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl KeywordIndex {
    pub fn new() -> Self {
        Self::with_params(DEFAULT_K1, DEFAULT_B)
    }

    pub fn with_params(k1: f64, b: f64) -> Self {
        Self {
            k1,
            b,
            documents: Vec::new(),
            idf: HashMap::new(),
            avg_doc_length: 0.0,
        }
    }

    /// Replace the indexed corpus with `documents`
    pub fn index<S: AsRef<str>>(&mut self, documents: &[S]) {
        self.documents = documents
            .iter()
            .map(|doc| {
                let tokens = tokenize(doc.as_ref());
                let mut term_freqs = HashMap::new();
                for token in &tokens {
                    *term_freqs.entry(token.clone()).or_insert(0) += 1;
                }
                DocumentStats {
                    term_freqs,
                    length: tokens.len(),
                }
            })
            .collect();

        let total_docs = self.documents.len();
        self.avg_doc_length = if total_docs == 0 {
            0.0
        } else {
            self.documents.iter().map(|d| d.length).sum::<usize>() as f64 / total_docs as f64
        };

        let mut doc_frequencies: HashMap<&str, usize> = HashMap::new();
        for doc in &self.documents {
            for term in doc.term_freqs.keys() {
                *doc_frequencies.entry(term.as_str()).or_insert(0) += 1;
            }
        }

        let n = total_docs as f64;
        self.idf = doc_frequencies
            .into_iter()
            .map(|(term, df)| {
                let df = df as f64;
                (term.to_string(), ((n - df + 0.5) / (df + 0.5) + 1.0).ln())
            })
            .collect();
    }

    /// Score every indexed document against `query`, in index order
    pub fn score(&self, query: &str) -> Vec<f64> {
        // Repeated query terms contribute once per occurrence
        let query_terms: Vec<(String, f64)> = tokenize(query)
            .into_iter()
            .filter_map(|term| {
                let idf = *self.idf.get(&term)?;
                Some((term, idf))
            })
            .collect();

        // Empty or sub-token corpora would otherwise divide by zero
        let avg_doc_length = self.avg_doc_length.max(1.0);

        self.documents
            .iter()
            .map(|doc| {
                let length_norm =
                    1.0 - self.b + self.b * doc.length as f64 / avg_doc_length;
                query_terms
                    .iter()
                    .filter_map(|(term, idf)| {
                        let tf = *doc.term_freqs.get(term)? as f64;
                        Some(idf * tf * (self.k1 + 1.0) / (tf + self.k1 * length_norm))
                    })
                    .sum()
            })
            .collect()
    }

    /// Inverse document frequency of `term`, if it occurs in the corpus
    pub fn idf(&self, term: &str) -> Option<f64> {
        self.idf.get(term).copied()
    }

    pub fn avg_doc_length(&self) -> f64 {
        self.avg_doc_length
    }

    /// Number of indexed documents
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    /// Check if index is empty
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

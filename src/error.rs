use crate::index::VectorStoreError;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced by the retrieval engine and its configuration layer
#[derive(Error, Debug)]
pub enum RagError {
    #[error("Configuration error: {0}")]
    Config(String),

    /// Every problem found while validating a configuration
    #[error("Invalid configuration: {}", join_errors(.errors))]
    ConfigValidation { errors: Vec<ValidationError> },

    #[error("No configuration file at {path}")]
    ConfigNotFound { path: PathBuf },

    /// A value from the environment could not be parsed
    #[error("Cannot use value for {path}: {message}")]
    InvalidConfigValue { path: String, message: String },

    #[error("{context}: {source}")]
    Io {
        source: std::io::Error,
        context: String,
    },

    #[error("Malformed configuration file: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Cannot serialize configuration: {0}")]
    TomlSerialization(#[from] toml::ser::Error),

    #[error("{context}: {source}")]
    Json {
        source: serde_json::Error,
        context: String,
    },

    /// The vector store rejected a read or write
    #[error("Vector store error: {0}")]
    VectorStore(#[from] VectorStoreError),

    /// Query rejected before reaching any index
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// A thread panicked while holding the engine lock
    #[error("Engine lock poisoned")]
    LockPoisoned,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// One rejected configuration key
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError {
    /// Dotted key, e.g. `context.reserve_percent`
    pub path: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

pub type Result<T> = std::result::Result<T, RagError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_errors_listed_in_message() {
        let err = RagError::ConfigValidation {
            errors: vec![
                ValidationError::new("cache.max_entries", "must be at least 1"),
                ValidationError::new("context.reserve_percent", "must be in (0, 1]"),
            ],
        };

        assert_eq!(
            err.to_string(),
            "Invalid configuration: cache.max_entries: must be at least 1; \
             context.reserve_percent: must be in (0, 1]"
        );
    }

    #[test]
    fn test_store_errors_convert() {
        let err: RagError = VectorStoreError::Unavailable("offline".to_string()).into();
        assert!(matches!(err, RagError::VectorStore(_)));
    }
}

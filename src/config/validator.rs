use crate::config::{RagConfig, SCHEMA_VERSION};
use crate::error::{RagError, Result, ValidationError};

/// Configuration validator
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration, collecting every problem before failing
    pub fn validate(config: &RagConfig) -> Result<()> {
        let mut errors = Vec::new();

        Self::validate_schema_version(config, &mut errors);
        Self::validate_chunking(config, &mut errors);
        Self::validate_cache(config, &mut errors);
        Self::validate_retrieval(config, &mut errors);
        Self::validate_context(config, &mut errors);
        Self::validate_indexing(config, &mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(RagError::ConfigValidation { errors })
        }
    }

    fn validate_schema_version(config: &RagConfig, errors: &mut Vec<ValidationError>) {
        let version = &config.meta.schema_version;
        if version != SCHEMA_VERSION {
            errors.push(ValidationError::new(
                "_meta.schema_version",
                format!("Unsupported schema version: {}", version),
            ));
        }
    }

    fn validate_chunking(config: &RagConfig, errors: &mut Vec<ValidationError>) {
        let chunking = &config.chunking;

        if chunking.max_tokens == 0 {
            errors.push(ValidationError::new(
                "chunking.max_tokens",
                "Max tokens must be greater than 0",
            ));
        }

        if chunking.min_tokens > chunking.default_tokens {
            errors.push(ValidationError::new(
                "chunking.min_tokens",
                format!(
                    "Min tokens ({}) cannot exceed default tokens ({})",
                    chunking.min_tokens, chunking.default_tokens
                ),
            ));
        }

        if chunking.default_tokens > chunking.max_tokens {
            errors.push(ValidationError::new(
                "chunking.default_tokens",
                format!(
                    "Default tokens ({}) cannot exceed max tokens ({})",
                    chunking.default_tokens, chunking.max_tokens
                ),
            ));
        }

        if chunking.overlap_tokens >= chunking.max_tokens {
            errors.push(ValidationError::new(
                "chunking.overlap_tokens",
                "Overlap must be smaller than max tokens",
            ));
        }
    }

    fn validate_cache(config: &RagConfig, errors: &mut Vec<ValidationError>) {
        if config.cache.max_entries == 0 {
            errors.push(ValidationError::new(
                "cache.max_entries",
                "Cache capacity must be greater than 0",
            ));
        }
    }

    fn validate_retrieval(config: &RagConfig, errors: &mut Vec<ValidationError>) {
        let retrieval = &config.retrieval;

        for (path, weight) in [
            ("retrieval.keyword_weight", retrieval.keyword_weight),
            ("retrieval.semantic_weight", retrieval.semantic_weight),
            ("retrieval.freshness_weight", retrieval.freshness_weight),
        ] {
            if !(0.0..=1.0).contains(&weight) {
                errors.push(ValidationError::new(
                    path,
                    format!("Weight must be between 0.0 and 1.0, got {}", weight),
                ));
            }
        }

        let sum = retrieval.keyword_weight + retrieval.semantic_weight;
        if (sum - 1.0).abs() > 1e-6 {
            errors.push(ValidationError::new(
                "retrieval.semantic_weight",
                format!("Keyword and semantic weights must sum to 1.0, got {}", sum),
            ));
        }

        let full_secs = retrieval.freshness_full_hours.saturating_mul(3600);
        let zero_secs = retrieval.freshness_zero_days.saturating_mul(24 * 3600);
        if full_secs >= zero_secs {
            errors.push(ValidationError::new(
                "retrieval.freshness_zero_days",
                "Freshness must reach zero after the full-freshness window",
            ));
        }
    }

    fn validate_context(config: &RagConfig, errors: &mut Vec<ValidationError>) {
        let reserve = config.context.reserve_percent;
        if reserve <= 0.0 || reserve > 1.0 {
            errors.push(ValidationError::new(
                "context.reserve_percent",
                format!("Reserve percent must be in (0.0, 1.0], got {}", reserve),
            ));
        }

        if config.context.context_window == 0 {
            errors.push(ValidationError::new(
                "context.context_window",
                "Context window must be greater than 0",
            ));
        }
    }

    fn validate_indexing(config: &RagConfig, errors: &mut Vec<ValidationError>) {
        if config.indexing.extensions.is_empty() {
            errors.push(ValidationError::new(
                "indexing.extensions",
                "At least one document extension is required",
            ));
        }

        for ext in &config.indexing.extensions {
            if ext.starts_with('.') || ext.is_empty() {
                errors.push(ValidationError::new(
                    "indexing.extensions",
                    format!("Extension '{}' must be non-empty and given without a dot", ext),
                ));
            }
        }
    }
}

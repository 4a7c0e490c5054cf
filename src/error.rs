//! Error types for memvault

use thiserror::Error;

/// Result type alias for memvault operations
pub type Result<T> = std::result::Result<T, MemvaultError>;

/// Main error type for memvault
#[derive(Error, Debug)]
pub enum MemvaultError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Entity not found: {0}")]
    NotFound(String),

    #[error("Operation cancelled: {0}")]
    Cancelled(String),

    #[error("Failed to parse {path}: {message}")]
    Parse { path: String, message: String },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Vector index error: {0}")]
    VectorIndex(String),

    #[error("Knowledge graph error: {0}")]
    Graph(String),

    #[error("Extraction error: {0}")]
    Extraction(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Frontmatter error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP request error: {0}")]
    #[cfg(feature = "openai")]
    Http(#[from] reqwest::Error),

    #[error("HTTP request error: {0}")]
    #[cfg(not(feature = "openai"))]
    Http(String),
}

impl MemvaultError {
    /// Failures of an enrichment collaborator. The pipeline logs these and
    /// continues with degraded data instead of aborting.
    pub fn is_collaborator_failure(&self) -> bool {
        matches!(
            self,
            MemvaultError::Embedding(_)
                | MemvaultError::VectorIndex(_)
                | MemvaultError::Graph(_)
                | MemvaultError::Extraction(_)
                | MemvaultError::Http(_)
        )
    }

    /// Stable error code for API consumers
    pub fn code(&self) -> &'static str {
        match self {
            MemvaultError::Validation(_) => "VALIDATION_ERROR",
            MemvaultError::NotFound(_) => "NOT_FOUND",
            MemvaultError::Cancelled(_) => "CANCELLED",
            MemvaultError::Parse { .. } => "PARSE_ERROR",
            MemvaultError::Storage(_) | MemvaultError::Io(_) => "STORAGE_ERROR",
            MemvaultError::Config(_) => "CONFIG_ERROR",
            MemvaultError::Serialization(_) | MemvaultError::Yaml(_) => "SERIALIZATION_ERROR",
            _ => "COLLABORATOR_ERROR",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(
            MemvaultError::Validation("x".into()).code(),
            "VALIDATION_ERROR"
        );
        assert_eq!(MemvaultError::NotFound("x".into()).code(), "NOT_FOUND");
        assert_eq!(
            MemvaultError::Graph("down".into()).code(),
            "COLLABORATOR_ERROR"
        );
    }

    #[test]
    fn test_collaborator_failures() {
        assert!(MemvaultError::Embedding("x".into()).is_collaborator_failure());
        assert!(MemvaultError::VectorIndex("x".into()).is_collaborator_failure());
        assert!(!MemvaultError::Storage("x".into()).is_collaborator_failure());
        assert!(!MemvaultError::Parse {
            path: "a.md".into(),
            message: "bad".into()
        }
        .is_collaborator_failure());
    }
}

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Content unavailable for '{id}': {reason}")]
    ContentUnavailable { id: String, reason: String },

    #[error("Embedding unavailable: {0}")]
    EmbeddingUnavailable(String),

    #[error("Index corruption detected: {0} (run a full rebuild with --reindex)")]
    IndexCorruption(String),

    #[error("Embedding model version mismatch: expected {expected}, found {found}")]
    ModelVersionMismatch { expected: String, found: String },

    #[error("Answer generation unavailable: {0}")]
    GenerationUnavailable(String),

    #[error("Content store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Index storage failed: {0}")]
    Storage(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Operation failed: {0}")]
    Operation(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Wraps any backend error (tantivy, lance, arrow) as a storage failure.
    pub fn storage(e: impl std::fmt::Display) -> Self {
        Self::Storage(e.to_string())
    }

    /// Short machine-readable name, used in build reports and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidConfig(_) => "invalid_config",
            Self::ContentUnavailable { .. } => "content_unavailable",
            Self::EmbeddingUnavailable(_) => "embedding_unavailable",
            Self::IndexCorruption(_) => "index_corruption",
            Self::ModelVersionMismatch { .. } => "model_version_mismatch",
            Self::GenerationUnavailable(_) => "generation_unavailable",
            Self::StoreUnavailable(_) => "store_unavailable",
            Self::Storage(_) | Self::Io(_) | Self::Json(_) => "storage",
            Self::InvalidQuery(_) => "invalid_query",
            Self::NotFound(_) => "not_found",
            Self::Operation(_) => "operation",
        }
    }

    /// Failures scoped to a single document; a build records them and moves on.
    pub fn is_per_document(&self) -> bool {
        matches!(self, Self::ContentUnavailable { .. } | Self::EmbeddingUnavailable(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

// B-Roll Error Types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BrollError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Vector index unavailable: {0}")]
    VectorIndexUnavailable(String),

    #[error("No catalog found at {0}. Use 'broll init {0}' to create one.")]
    CatalogNotFound(String),

    #[error("Catalog already exists at {0}")]
    CatalogExists(String),

    #[error("Another processing run holds the lock at {0}")]
    RunLocked(String),

    #[error("[scan] {path}: {message}")]
    Scan { path: String, message: String },

    #[error("[{stage}] {path}: {message}")]
    Extraction {
        path: String,
        stage: String,
        message: String,
    },

    #[error("[{stage}] model error: {message}")]
    Model { stage: String, message: String },

    #[error("[{stage}] model request timed out")]
    ModelTimeout { stage: String },

    #[error("Invalid query: {0}")]
    Query(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("{0}")]
    Other(String),
}

impl BrollError {
    pub fn scan(path: impl Into<String>, message: impl Into<String>) -> Self {
        BrollError::Scan {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn extraction(path: impl Into<String>, stage: &str, message: impl Into<String>) -> Self {
        BrollError::Extraction {
            path: path.into(),
            stage: stage.to_string(),
            message: message.into(),
        }
    }

    pub fn model(stage: &str, message: impl Into<String>) -> Self {
        BrollError::Model {
            stage: stage.to_string(),
            message: message.into(),
        }
    }

    /// Errors that belong to a single file. The pipeline records them on the
    /// row and moves on to the next candidate.
    pub fn is_per_item(&self) -> bool {
        matches!(
            self,
            BrollError::Scan { .. }
                | BrollError::Extraction { .. }
                | BrollError::Model { .. }
                | BrollError::ModelTimeout { .. }
        )
    }

    pub fn is_model(&self) -> bool {
        matches!(self, BrollError::Model { .. } | BrollError::ModelTimeout { .. })
    }

    /// Only timeouts are retried; explicit error responses are not.
    pub fn is_retryable(&self) -> bool {
        matches!(self, BrollError::ModelTimeout { .. })
    }
}

impl From<anyhow::Error> for BrollError {
    fn from(err: anyhow::Error) -> Self {
        BrollError::Other(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, BrollError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_per_item_classification() {
        assert!(BrollError::scan("a.mp4", "denied").is_per_item());
        assert!(BrollError::extraction("a.mp4", "frames", "no frames").is_per_item());
        assert!(BrollError::model("vision", "bad json").is_per_item());
        assert!(BrollError::ModelTimeout { stage: "embed".into() }.is_per_item());
        assert!(!BrollError::Store("disk full".into()).is_per_item());
        assert!(!BrollError::Query("unknown mode".into()).is_per_item());
    }

    #[test]
    fn test_messages_name_file_and_stage() {
        let err = BrollError::extraction("trips/clip.mp4", "frames", "ffmpeg exited 1");
        assert_eq!(err.to_string(), "[frames] trips/clip.mp4: ffmpeg exited 1");
    }

    #[test]
    fn test_only_timeouts_retry() {
        assert!(BrollError::ModelTimeout { stage: "vision".into() }.is_retryable());
        assert!(!BrollError::model("vision", "500").is_retryable());
    }
}

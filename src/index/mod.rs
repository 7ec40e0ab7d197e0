//! Vector index backends.
//!
//! Both backends are additive: every upsert appends new vectors and nothing already persisted is
//! rewritten or deduplicated.

pub mod local;
pub mod payload;
pub mod qdrant;

use crate::config::{IndexBackend, IndexSettings};
use crate::processing::IndexedVector;
use async_trait::async_trait;
use reqwest::StatusCode;
use std::path::PathBuf;
use thiserror::Error;

pub use local::{LocalIndex, Manifest, StoredVector};
pub use payload::compute_chunk_hash;
pub use qdrant::QdrantIndex;

/// Errors returned while persisting vectors.
#[derive(Debug, Error)]
pub enum IndexError {
    /// Filesystem operation on the index directory failed.
    #[error("Index I/O failed for {path}: {source}")]
    Io {
        /// Path being read or written.
        path: PathBuf,
        /// Underlying filesystem error.
        #[source]
        source: std::io::Error,
    },
    /// Record or manifest could not be encoded or decoded.
    #[error("Index serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
    /// Vector length differs from the index dimension.
    #[error("Vector dimension mismatch: index expects {expected}, got {actual}")]
    DimensionMismatch {
        /// Dimension recorded by the index.
        expected: usize,
        /// Dimension of the offending vector.
        actual: usize,
    },
    /// Base URL failed to parse or normalize.
    #[error("Invalid Qdrant URL: {0}")]
    InvalidUrl(String),
    /// HTTP layer failed before receiving a response.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// Qdrant responded with an unexpected status code.
    #[error("Unexpected Qdrant response ({status}): {body}")]
    UnexpectedStatus {
        /// HTTP status returned from Qdrant.
        status: StatusCode,
        /// Body payload associated with the failing response.
        body: String,
    },
}

/// Whether [`VectorIndex::prepare`] found existing data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexState {
    /// A new, empty index was created.
    Created,
    /// An index already existed; new vectors are appended.
    Existing {
        /// Vectors already stored, when the backend reports it.
        vectors: Option<usize>,
    },
}

/// Summary describing how the index applied a write.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexSummary {
    /// Number of new vectors appended.
    pub inserted: usize,
}

/// Persistent store of embedded chunks.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Open or create the index for vectors of `dimension`.
    async fn prepare(&self, dimension: usize) -> Result<IndexState, IndexError>;

    /// Append `items` to the index.
    async fn upsert(&self, items: Vec<IndexedVector>) -> Result<IndexSummary, IndexError>;

    /// Human-readable location of the index for logs.
    fn describe(&self) -> String;
}

/// Build the index backend selected by `settings`.
pub fn build_index(settings: &IndexSettings) -> Result<Box<dyn VectorIndex>, IndexError> {
    match settings.backend {
        IndexBackend::Local => Ok(Box::new(LocalIndex::new(settings.index_dir.clone()))),
        IndexBackend::Qdrant => Ok(Box::new(QdrantIndex::new(
            &settings.qdrant_url,
            &settings.qdrant_collection,
            settings.qdrant_api_key.clone(),
        )?)),
    }
}

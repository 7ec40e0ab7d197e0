//! Core data types and error definitions for the ingestion pipeline.

use crate::{
    archive::FetchError, config::ConfigError, embedding::EmbeddingClientError, index::IndexError,
    loader::DocumentMetadata,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Provenance of a chunk: its document's metadata plus its position in that document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// Metadata inherited from the source document.
    #[serde(flatten)]
    pub document: DocumentMetadata,
    /// Zero-based position of the chunk within its document.
    pub chunk_index: usize,
}

/// Bounded, overlapping span of a document's text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Chunk text; never longer than the configured chunk size in characters.
    pub text: String,
    /// Provenance of the chunk.
    pub metadata: ChunkMetadata,
}

/// Embedded chunk ready to be written to a vector index.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedVector {
    /// Unit-normalized embedding.
    pub vector: Vec<f32>,
    /// Chunk text.
    pub text: String,
    /// Chunk provenance.
    pub metadata: ChunkMetadata,
    /// SHA-256 of `text`, stored for provenance.
    pub chunk_hash: String,
}

/// Errors that terminate a pipeline run.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Configuration was rejected before any stage ran.
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),
    /// Archive client could not be constructed.
    #[error("Failed to initialize the filing archive client: {0}")]
    Archive(#[from] FetchError),
    /// Embedding provider failed to produce vectors for a batch.
    #[error("Failed to generate embeddings: {0}")]
    Embedding(#[from] EmbeddingClientError),
    /// Vector index rejected a write.
    #[error("Failed to persist vectors: {0}")]
    Index(#[from] IndexError),
}

/// Counters reported by a completed run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IngestSummary {
    /// Fetches attempted during the download stage (zero when skipped).
    pub downloads_attempted: usize,
    /// Fetches that failed during the download stage.
    pub downloads_failed: usize,
    /// Documents parsed successfully.
    pub documents_loaded: usize,
    /// Matching files skipped by the loader.
    pub documents_skipped: usize,
    /// Chunks produced by the splitter.
    pub chunks: usize,
    /// Vectors written to the index.
    pub vectors_indexed: usize,
    /// Embedding calls issued.
    pub batches: usize,
}

/// Terminal state of a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineOutcome {
    /// The loader found nothing to index; no embedding or index calls were made.
    NoDocuments {
        /// Matching files that were skipped while loading.
        skipped: usize,
    },
    /// All chunks were embedded and persisted.
    Completed(IngestSummary),
}

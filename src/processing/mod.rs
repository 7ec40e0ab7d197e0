//! Document processing pipeline: chunking, embedding, and index orchestration.

pub mod chunking;
mod pipeline;
pub mod types;

pub use chunking::Chunker;
pub use pipeline::Pipeline;
pub use types::{
    Chunk, ChunkMetadata, IndexedVector, IngestSummary, PipelineError, PipelineOutcome,
};

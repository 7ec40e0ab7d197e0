#![deny(missing_docs)]

//! Core library for the SEC filing indexer: download 10-K/10-Q filings, extract their text,
//! split it into overlapping chunks, embed the chunks, and persist the vectors.

/// EDGAR archive access and the download stage.
pub mod archive;
/// Environment-driven configuration management.
pub mod config;
/// Embedding client abstraction and adapters.
pub mod embedding;
/// Vector index backends.
pub mod index;
/// Content store scanning and HTML text extraction.
pub mod loader;
/// Structured logging and tracing setup.
pub mod logging;
/// Chunking and the end-to-end ingestion pipeline.
pub mod processing;

//! Document types produced by the loader.

use crate::archive::FILINGS_SUBDIR;
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};
use thiserror::Error;

/// Raw markup read from the content store.
#[derive(Debug, Clone)]
pub struct RawDocument {
    /// File the markup was read from.
    pub source_path: PathBuf,
    /// Undecoded file contents.
    pub raw_markup: Vec<u8>,
}

/// Provenance carried by every document and, later, every chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    /// Path of the source file.
    pub source_path: String,
    /// Ticker when the path follows the archive layout.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ticker: Option<String>,
    /// Filing form when the path follows the archive layout.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filing_type: Option<String>,
    /// EDGAR accession number when the path follows the archive layout.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accession_number: Option<String>,
}

impl DocumentMetadata {
    /// Build metadata for `path`, reading filing provenance from the archive layout
    /// (`…/sec-edgar-filings/<TICKER>/<FORM>/<ACCESSION>/<file>`) when present.
    pub fn from_path(path: &Path) -> Self {
        let components: Vec<&str> = path
            .components()
            .filter_map(|component| match component {
                Component::Normal(part) => part.to_str(),
                _ => None,
            })
            .collect();

        // Three directories plus a file name must follow the anchor.
        let provenance = components
            .iter()
            .rposition(|part| *part == FILINGS_SUBDIR)
            .filter(|anchor| components.len() > anchor + 4)
            .map(|anchor| &components[anchor + 1..anchor + 4]);

        Self {
            source_path: path.display().to_string(),
            ticker: provenance.map(|parts| parts[0].to_string()),
            filing_type: provenance.map(|parts| parts[1].to_string()),
            accession_number: provenance.map(|parts| parts[2].to_string()),
        }
    }
}

/// Plain-text document ready for chunking. The text is never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedDocument {
    /// Markup-stripped, whitespace-normalized content.
    pub text: String,
    /// Provenance of the document.
    pub metadata: DocumentMetadata,
}

/// Per-file failures. Each one skips the file and never aborts the load.
#[derive(Debug, Error)]
pub enum ParseError {
    /// The file could not be read.
    #[error("Failed to read {path}: {source}")]
    Read {
        /// File that failed.
        path: PathBuf,
        /// Underlying filesystem error.
        #[source]
        source: std::io::Error,
    },
    /// The markup yielded no visible text.
    #[error("No extractable text in {0}")]
    Empty(PathBuf),
    /// The parsing worker panicked or was cancelled.
    #[error("Parser worker failed for {path}: {message}")]
    Worker {
        /// File being parsed.
        path: PathBuf,
        /// Join error description.
        message: String,
    },
}

/// Result of a load stage.
#[derive(Debug, Default)]
pub struct LoadReport {
    /// Parsed documents ordered by source path.
    pub documents: Vec<LoadedDocument>,
    /// Files that matched but were skipped.
    pub skipped: Vec<ParseError>,
}

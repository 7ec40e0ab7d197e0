//! Content-store scanning and markup parsing.
//!
//! The loader walks the content store once, matching every configured suffix in the same pass, and
//! parses matched files on a bounded pool of blocking workers. Results are buffered in submission
//! order and submissions are sorted by path, so the output order is independent of which worker
//! finishes first.

pub mod html;
pub mod types;

use crate::archive::FILINGS_SUBDIR;
use futures_util::stream::{self, StreamExt};
use std::collections::BTreeSet;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

pub use types::{DocumentMetadata, LoadReport, LoadedDocument, ParseError, RawDocument};

/// Parses filings under a content-store root into [`LoadedDocument`]s.
#[derive(Debug, Clone)]
pub struct DocumentLoader {
    extensions: BTreeSet<String>,
    concurrency: NonZeroUsize,
}

impl DocumentLoader {
    /// Build a loader for the given file suffixes (`"html"`, `".HTM"`, … are all accepted).
    pub fn new<S: AsRef<str>>(extensions: &[S], concurrency: NonZeroUsize) -> Self {
        let extensions = extensions
            .iter()
            .map(|ext| ext.as_ref().trim().trim_start_matches('.').to_lowercase())
            .filter(|ext| !ext.is_empty())
            .collect();
        Self {
            extensions,
            concurrency,
        }
    }

    /// Load every matching document under `root`.
    ///
    /// A missing root or zero matches yields an empty report; per-file failures are recorded in
    /// [`LoadReport::skipped`].
    pub async fn load(&self, root: &Path) -> LoadReport {
        let scan_root = resolve_scan_root(root);
        if !scan_root.is_dir() {
            tracing::warn!(root = %scan_root.display(), "Content store does not exist");
            return LoadReport::default();
        }

        let paths = self.discover(&scan_root);
        tracing::info!(
            root = %scan_root.display(),
            files = paths.len(),
            extensions = ?self.extensions,
            "Discovered filing documents"
        );

        let results: Vec<Result<LoadedDocument, ParseError>> = stream::iter(paths)
            .map(|path| async move {
                let worker_path = path.clone();
                tokio::task::spawn_blocking(move || parse_file(&worker_path))
                    .await
                    .unwrap_or_else(|error| {
                        Err(ParseError::Worker {
                            path,
                            message: error.to_string(),
                        })
                    })
            })
            .buffered(self.concurrency.get())
            .collect()
            .await;

        let mut report = LoadReport::default();
        for result in results {
            match result {
                Ok(document) => report.documents.push(document),
                Err(error) => {
                    tracing::warn!(error = %error, "Skipping document");
                    report.skipped.push(error);
                }
            }
        }

        tracing::info!(
            documents = report.documents.len(),
            skipped = report.skipped.len(),
            "Loaded documents"
        );
        report
    }

    fn discover(&self, root: &Path) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = WalkDir::new(root)
            .follow_links(true)
            .into_iter()
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(error) => {
                    tracing::warn!(error = %error, "Failed to read directory entry");
                    None
                }
            })
            .filter(|entry| entry.file_type().is_file())
            .map(walkdir::DirEntry::into_path)
            .filter(|path| self.matches(path))
            .collect();
        paths.sort();
        paths.dedup();
        paths
    }

    fn matches(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| self.extensions.contains(&ext.to_lowercase()))
    }
}

/// Prefer the archive's nested layout when present, otherwise scan `root` itself.
pub fn resolve_scan_root(root: &Path) -> PathBuf {
    let nested = root.join(FILINGS_SUBDIR);
    if nested.is_dir() {
        nested
    } else {
        root.to_path_buf()
    }
}

/// Read a file from the content store.
pub fn read_raw(path: &Path) -> Result<RawDocument, ParseError> {
    let raw_markup = std::fs::read(path).map_err(|source| ParseError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(RawDocument {
        source_path: path.to_path_buf(),
        raw_markup,
    })
}

/// Turn raw markup into a [`LoadedDocument`], rejecting documents without text.
pub fn parse_raw(raw: RawDocument) -> Result<LoadedDocument, ParseError> {
    let markup = String::from_utf8_lossy(&raw.raw_markup);
    let text = html::extract_text(&markup);
    if text.is_empty() {
        return Err(ParseError::Empty(raw.source_path));
    }
    Ok(LoadedDocument {
        text,
        metadata: DocumentMetadata::from_path(&raw.source_path),
    })
}

fn parse_file(path: &Path) -> Result<LoadedDocument, ParseError> {
    parse_raw(read_raw(path)?)
}

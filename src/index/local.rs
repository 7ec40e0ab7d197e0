//! Append-only on-disk vector store.
//!
//! Layout of the index directory:
//!
//! - `manifest.json`: format version, dimension, total vector count, and the segment list.
//! - `segment-<nanos>-<id>.jsonl`: one JSON record per vector, written by a single run.
//!
//! Every `LocalIndex` instance writes to its own fresh segment, so re-running ingestion never
//! touches earlier segments. The manifest is replaced atomically (temp file + rename) after each
//! upsert; records appended after the last manifest write are not counted.

use crate::index::payload::{current_timestamp_rfc3339, generate_vector_id};
use crate::index::{IndexError, IndexState, IndexSummary, VectorIndex};
use crate::processing::{ChunkMetadata, IndexedVector};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use time::OffsetDateTime;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

const MANIFEST_FILE: &str = "manifest.json";
const FORMAT_VERSION: u32 = 1;

/// Index metadata persisted in `manifest.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    /// On-disk format revision.
    pub format_version: u32,
    /// Vector dimension shared by all segments.
    pub dimension: usize,
    /// Total vectors across all segments.
    pub vector_count: usize,
    /// Creation time of the index.
    pub created_at: String,
    /// Time of the last manifest write.
    pub updated_at: String,
    /// Segments in creation order.
    pub segments: Vec<SegmentEntry>,
}

/// One segment file listed in the manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentEntry {
    /// File name relative to the index directory.
    pub file: String,
    /// Vectors stored in the segment.
    pub vectors: usize,
    /// Creation time of the segment.
    pub created_at: String,
}

/// One persisted vector record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredVector {
    /// Random identifier.
    pub id: String,
    /// Unit-normalized embedding.
    pub vector: Vec<f32>,
    /// Chunk text.
    pub text: String,
    /// SHA-256 of the text.
    pub chunk_hash: String,
    /// Chunk provenance.
    pub metadata: ChunkMetadata,
    /// Time the record was written.
    pub indexed_at: String,
}

struct OpenIndex {
    manifest: Manifest,
    segment: usize,
}

/// Append-only vector store rooted at a directory.
pub struct LocalIndex {
    dir: PathBuf,
    state: Mutex<Option<OpenIndex>>,
}

impl LocalIndex {
    /// Index rooted at `dir`; nothing is touched until [`VectorIndex::prepare`] or an upsert.
    pub fn new(dir: PathBuf) -> Self {
        Self {
            dir,
            state: Mutex::new(None),
        }
    }

    /// Read the manifest, returning `None` when the index does not exist yet.
    pub async fn read_manifest(&self) -> Result<Option<Manifest>, IndexError> {
        let path = self.dir.join(MANIFEST_FILE);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(IndexError::Io { path, source }),
        }
    }

    /// Read every record listed in the manifest, in segment order.
    ///
    /// Segments that never received a vector are skipped without being opened.
    pub async fn read_vectors(&self) -> Result<Vec<StoredVector>, IndexError> {
        let Some(manifest) = self.read_manifest().await? else {
            return Ok(Vec::new());
        };

        let mut records = Vec::with_capacity(manifest.vector_count);
        for segment in manifest.segments.iter().filter(|segment| segment.vectors > 0) {
            let path = self.dir.join(&segment.file);
            let contents = tokio::fs::read_to_string(&path)
                .await
                .map_err(|source| IndexError::Io {
                    path: path.clone(),
                    source,
                })?;
            for line in contents.lines().take(segment.vectors) {
                records.push(serde_json::from_str(line)?);
            }
        }
        Ok(records)
    }

    async fn open(
        &self,
        state: &mut Option<OpenIndex>,
        dimension: usize,
    ) -> Result<IndexState, IndexError> {
        if let Some(open) = state.as_ref() {
            check_dimension(open.manifest.dimension, dimension)?;
            return Ok(IndexState::Existing {
                vectors: Some(open.manifest.vector_count),
            });
        }

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|source| IndexError::Io {
                path: self.dir.clone(),
                source,
            })?;

        let now = current_timestamp_rfc3339();
        let (mut manifest, index_state) = match self.read_manifest().await? {
            Some(manifest) => {
                check_dimension(manifest.dimension, dimension)?;
                let vectors = manifest.vector_count;
                (manifest, IndexState::Existing { vectors: Some(vectors) })
            }
            None => (
                Manifest {
                    format_version: FORMAT_VERSION,
                    dimension,
                    vector_count: 0,
                    created_at: now.clone(),
                    updated_at: now.clone(),
                    segments: Vec::new(),
                },
                IndexState::Created,
            ),
        };

        manifest.segments.push(SegmentEntry {
            file: segment_file_name(),
            vectors: 0,
            created_at: now,
        });
        let segment = manifest.segments.len() - 1;
        // The segment file must exist before the manifest lists it.
        let segment_path = self.dir.join(&manifest.segments[segment].file);
        self.append(&segment_path, &[]).await?;
        self.write_manifest(&manifest).await?;

        tracing::debug!(
            dir = %self.dir.display(),
            segment = %manifest.segments[segment].file,
            existing = manifest.vector_count,
            "Opened local index"
        );
        *state = Some(OpenIndex { manifest, segment });
        Ok(index_state)
    }

    async fn write_manifest(&self, manifest: &Manifest) -> Result<(), IndexError> {
        let path = self.dir.join(MANIFEST_FILE);
        let temp = self.dir.join(format!("{MANIFEST_FILE}.tmp"));
        let bytes = serde_json::to_vec_pretty(manifest)?;
        tokio::fs::write(&temp, bytes)
            .await
            .map_err(|source| IndexError::Io {
                path: temp.clone(),
                source,
            })?;
        tokio::fs::rename(&temp, &path)
            .await
            .map_err(|source| IndexError::Io { path, source })
    }

    async fn append(&self, path: &Path, lines: &[u8]) -> Result<(), IndexError> {
        let io_error = |source| IndexError::Io {
            path: path.to_path_buf(),
            source,
        };
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await
            .map_err(io_error)?;
        file.write_all(lines).await.map_err(io_error)?;
        file.sync_data().await.map_err(io_error)
    }
}

#[async_trait]
impl VectorIndex for LocalIndex {
    async fn prepare(&self, dimension: usize) -> Result<IndexState, IndexError> {
        let mut state = self.state.lock().await;
        self.open(&mut state, dimension).await
    }

    async fn upsert(&self, items: Vec<IndexedVector>) -> Result<IndexSummary, IndexError> {
        let Some(first) = items.first() else {
            return Ok(IndexSummary::default());
        };

        let mut state = self.state.lock().await;
        self.open(&mut state, first.vector.len()).await?;
        let Some(open) = state.as_mut() else {
            return Ok(IndexSummary::default());
        };

        let now = current_timestamp_rfc3339();
        let mut lines = Vec::new();
        for item in &items {
            check_dimension(open.manifest.dimension, item.vector.len())?;
            let record = StoredVector {
                id: generate_vector_id(),
                vector: item.vector.clone(),
                text: item.text.clone(),
                chunk_hash: item.chunk_hash.clone(),
                metadata: item.metadata.clone(),
                indexed_at: now.clone(),
            };
            serde_json::to_writer(&mut lines, &record)?;
            lines.push(b'\n');
        }

        let segment_path = self.dir.join(&open.manifest.segments[open.segment].file);
        self.append(&segment_path, &lines).await?;

        let inserted = items.len();
        open.manifest.segments[open.segment].vectors += inserted;
        open.manifest.vector_count += inserted;
        open.manifest.updated_at = now;
        self.write_manifest(&open.manifest).await?;

        tracing::debug!(
            segment = %segment_path.display(),
            inserted,
            total = open.manifest.vector_count,
            "Appended vectors"
        );
        Ok(IndexSummary { inserted })
    }

    fn describe(&self) -> String {
        format!("local index at {}", self.dir.display())
    }
}

fn check_dimension(expected: usize, actual: usize) -> Result<(), IndexError> {
    if expected == actual {
        Ok(())
    } else {
        Err(IndexError::DimensionMismatch { expected, actual })
    }
}

fn segment_file_name() -> String {
    let nanos = OffsetDateTime::now_utc().unix_timestamp_nanos();
    let id = uuid::Uuid::new_v4().simple().to_string();
    format!("segment-{nanos:020}-{}.jsonl", &id[..8])
}

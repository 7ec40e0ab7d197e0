//! Character-window chunking with a recursive separator ladder.
//!
//! Each window starts at character `start` and may grow to `start + chunk_size`. When the rest of
//! the document fits, it becomes the final chunk. Otherwise the window is cut after the last
//! occurrence of the coarsest separator (`"\n\n"` before `"\n"` before `" "`) that lies past the
//! overlap region; when no separator qualifies the next, finer one is tried, and the empty
//! separator always cuts at exactly `chunk_size` characters.
//!
//! The next window begins `overlap` characters before the previous cut, so adjacent chunks share
//! exactly `overlap` characters. Because every cut lies strictly past `start + overlap`, each
//! window advances and splitting terminates.
//!
//! Lengths are measured in Unicode scalar values, never bytes.

use crate::config::{ChunkingSettings, ConfigError};
use crate::loader::LoadedDocument;

use super::types::{Chunk, ChunkMetadata};

/// Splits documents into overlapping chunks according to [`ChunkingSettings`].
#[derive(Debug, Clone)]
pub struct Chunker {
    settings: ChunkingSettings,
}

impl Chunker {
    /// Validate the settings and build a chunker.
    pub fn new(settings: ChunkingSettings) -> Result<Self, ConfigError> {
        settings.validate()?;
        Ok(Self { settings })
    }

    /// Settings the chunker was built with.
    pub fn settings(&self) -> &ChunkingSettings {
        &self.settings
    }

    /// Split every document, tagging chunks with their document metadata and index.
    pub fn split(&self, documents: Vec<LoadedDocument>) -> Vec<Chunk> {
        let mut chunks = Vec::new();
        for document in documents {
            let LoadedDocument { text, metadata } = document;
            let pieces = self.split_text(&text);
            tracing::debug!(
                source = %metadata.source_path,
                characters = text.chars().count(),
                chunks = pieces.len(),
                "Split document"
            );
            chunks.extend(
                pieces
                    .into_iter()
                    .enumerate()
                    .map(|(chunk_index, text)| Chunk {
                        text,
                        metadata: ChunkMetadata {
                            document: metadata.clone(),
                            chunk_index,
                        },
                    }),
            );
        }
        chunks
    }

    /// Split raw text into overlapping pieces. Empty text yields no pieces.
    pub fn split_text(&self, text: &str) -> Vec<String> {
        let offsets: Vec<usize> = text
            .char_indices()
            .map(|(offset, _)| offset)
            .chain(std::iter::once(text.len()))
            .collect();
        let total = offsets.len() - 1;
        if total == 0 {
            return Vec::new();
        }

        let ChunkingSettings {
            chunk_size,
            overlap,
            ..
        } = self.settings;
        let mut pieces = Vec::with_capacity(total / (chunk_size - overlap) + 1);
        let mut start = 0;

        loop {
            let limit = start + chunk_size;
            if limit >= total {
                pieces.push(text[offsets[start]..].to_string());
                break;
            }

            let end = self.find_cut(text, &offsets, start, limit);
            pieces.push(text[offsets[start]..offsets[end]].to_string());
            start = end - overlap;
        }

        pieces
    }

    /// Pick the cut position (a character index in `(start + overlap, limit]`).
    fn find_cut(&self, text: &str, offsets: &[usize], start: usize, limit: usize) -> usize {
        let window_start = offsets[start];
        let window = &text[window_start..offsets[limit]];
        let floor = start + self.settings.overlap;

        for separator in &self.settings.separators {
            if separator.is_empty() {
                return limit;
            }
            if let Some(position) = window.rfind(separator.as_str()) {
                let cut_byte = window_start + position + separator.len();
                let cut = offsets.partition_point(|&offset| offset < cut_byte);
                if cut > floor {
                    return cut;
                }
            }
        }

        limit
    }
}

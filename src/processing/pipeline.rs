//! End-to-end ingestion run: download, load, chunk, embed, and persist.

use crate::{
    archive::{ArchiveClient, EdgarSource},
    config::{Config, ConfigError},
    embedding::{EmbeddingClient, EmbeddingClientError, build_embedding_client},
    index::{IndexState, VectorIndex, build_index, compute_chunk_hash},
    loader::DocumentLoader,
    processing::{
        chunking::Chunker,
        types::{Chunk, IndexedVector, IngestSummary, PipelineError, PipelineOutcome},
    },
};

/// Runs the ingestion stages in order over one immutable [`Config`].
///
/// Every stage receives its settings from the configuration passed in at construction; nothing
/// reads the environment after that point.
pub struct Pipeline {
    config: Config,
    archive: Option<ArchiveClient>,
    loader: DocumentLoader,
    chunker: Chunker,
    embedding_client: Box<dyn EmbeddingClient + Send + Sync>,
    index: Box<dyn VectorIndex>,
}

impl Pipeline {
    /// Validate `config` and build the EDGAR client, embedder, and index it selects.
    ///
    /// The archive client is only built when the download stage is enabled.
    pub fn from_config(config: Config) -> Result<Self, PipelineError> {
        config.validate()?;

        let archive = if config.run_download {
            let contact = config
                .archive
                .contact
                .as_ref()
                .ok_or(ConfigError::MissingContact)?;
            let source = EdgarSource::new(contact, &config.archive)?;
            Some(ArchiveClient::new(Box::new(source)))
        } else {
            None
        };
        let embedding_client = build_embedding_client(&config.embedding)?;
        let index = build_index(&config.index)?;
        tracing::info!(index = %index.describe(), "Vector index selected");

        Self::with_components(config, archive, embedding_client, index)
    }

    /// Validate `config` and assemble a pipeline from explicit components.
    ///
    /// `archive` is consulted only when `config.run_download` is set.
    pub fn with_components(
        config: Config,
        archive: Option<ArchiveClient>,
        embedding_client: Box<dyn EmbeddingClient + Send + Sync>,
        index: Box<dyn VectorIndex>,
    ) -> Result<Self, PipelineError> {
        config.validate()?;
        let chunker = Chunker::new(config.chunking.clone())?;
        let loader = DocumentLoader::new(config.file_extensions.as_slice(), config.loader_concurrency);
        let archive = archive.filter(|_| config.run_download);

        Ok(Self {
            config,
            archive,
            loader,
            chunker,
            embedding_client,
            index,
        })
    }

    /// Configuration the pipeline was built with.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Execute one ingestion run.
    ///
    /// Download failures are logged and never abort the run. An empty corpus ends the run with
    /// [`PipelineOutcome::NoDocuments`] before any embedding or index call. Embedding and index
    /// failures abort the run; batches persisted before the failure stay in the index.
    pub async fn run(&self) -> Result<PipelineOutcome, PipelineError> {
        let mut summary = IngestSummary::default();

        if let Some(archive) = &self.archive {
            let settings = &self.config.archive;
            let report = archive
                .download(
                    &settings.tickers,
                    &settings.filing_types,
                    settings.limit_per_type,
                    &self.config.sec_dir,
                )
                .await;
            summary.downloads_attempted = report.attempted();
            summary.downloads_failed = report.failed();
        } else {
            tracing::info!("Download stage disabled; indexing existing filings");
        }

        let report = self.loader.load(&self.config.sec_dir).await;
        summary.documents_loaded = report.documents.len();
        summary.documents_skipped = report.skipped.len();
        if report.documents.is_empty() {
            tracing::warn!(
                root = %self.config.sec_dir.display(),
                skipped = summary.documents_skipped,
                "No documents found; nothing to index"
            );
            return Ok(PipelineOutcome::NoDocuments {
                skipped: summary.documents_skipped,
            });
        }

        let pending = self.chunker.split(report.documents);
        summary.chunks = pending.len();
        tracing::info!(
            documents = summary.documents_loaded,
            chunks = summary.chunks,
            chunk_size = self.chunker.settings().chunk_size,
            overlap = self.chunker.settings().overlap,
            "Split documents into chunks"
        );

        let dimension = self.config.embedding.dimension;
        match self.index.prepare(dimension).await? {
            IndexState::Created => {
                tracing::info!(index = %self.index.describe(), dimension, "Created vector index");
            }
            IndexState::Existing { vectors } => tracing::info!(
                index = %self.index.describe(),
                existing = ?vectors,
                "Appending to existing vector index"
            ),
        }

        for batch in pending.chunks(self.config.embedding.batch_size) {
            let items = self.embed_batch(batch).await?;
            summary.batches += 1;
            let written = self.index.upsert(items).await?;
            summary.vectors_indexed += written.inserted;
            tracing::debug!(
                batch = summary.batches,
                inserted = written.inserted,
                total = summary.vectors_indexed,
                "Persisted batch"
            );
        }

        tracing::info!(
            downloads_attempted = summary.downloads_attempted,
            downloads_failed = summary.downloads_failed,
            documents = summary.documents_loaded,
            skipped = summary.documents_skipped,
            chunks = summary.chunks,
            vectors = summary.vectors_indexed,
            batches = summary.batches,
            index = %self.index.describe(),
            "Ingestion complete"
        );
        Ok(PipelineOutcome::Completed(summary))
    }

    async fn embed_batch(&self, batch: &[Chunk]) -> Result<Vec<IndexedVector>, PipelineError> {
        let texts: Vec<String> = batch.iter().map(|chunk| chunk.text.clone()).collect();
        let vectors = self.embedding_client.generate_embeddings(texts).await?;

        if vectors.len() != batch.len() {
            return Err(EmbeddingClientError::CountMismatch {
                expected: batch.len(),
                actual: vectors.len(),
            }
            .into());
        }
        let expected = self.config.embedding.dimension;
        if let Some(vector) = vectors.iter().find(|vector| vector.len() != expected) {
            return Err(EmbeddingClientError::DimensionMismatch {
                expected,
                actual: vector.len(),
            }
            .into());
        }

        Ok(batch
            .iter()
            .zip(vectors)
            .map(|(chunk, vector)| IndexedVector {
                vector,
                text: chunk.text.clone(),
                metadata: chunk.metadata.clone(),
                chunk_hash: compute_chunk_hash(&chunk.text),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::{FetchError, FilingRequest, FilingSource, edgar::filing_directory};
    use crate::config::tests::sample_config;
    use crate::embedding::HashingEmbeddingClient;
    use crate::index::{IndexError, IndexSummary, LocalIndex};
    use async_trait::async_trait;
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct CountingEmbedder {
        calls: Arc<AtomicUsize>,
        drop_last: bool,
        fail_on_call: Option<usize>,
    }

    #[async_trait]
    impl EmbeddingClient for CountingEmbedder {
        async fn generate_embeddings(
            &self,
            texts: Vec<String>,
        ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if self.fail_on_call == Some(call) {
                return Err(EmbeddingClientError::ProviderUnavailable(
                    "connection refused".into(),
                ));
            }
            let mut vectors = HashingEmbeddingClient::new(16)
                .generate_embeddings(texts)
                .await?;
            if self.drop_last {
                vectors.pop();
            }
            Ok(vectors)
        }
    }

    #[derive(Clone, Default)]
    struct RecordingIndex {
        prepared: Arc<Mutex<Vec<usize>>>,
        items: Arc<Mutex<Vec<IndexedVector>>>,
        upserts: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl VectorIndex for RecordingIndex {
        async fn prepare(&self, dimension: usize) -> Result<IndexState, IndexError> {
            self.prepared.lock().unwrap().push(dimension);
            Ok(IndexState::Created)
        }

        async fn upsert(&self, items: Vec<IndexedVector>) -> Result<IndexSummary, IndexError> {
            self.upserts.fetch_add(1, Ordering::SeqCst);
            let inserted = items.len();
            self.items.lock().unwrap().extend(items);
            Ok(IndexSummary { inserted })
        }

        fn describe(&self) -> String {
            "recording index".into()
        }
    }

    struct StaticSource;

    #[async_trait]
    impl FilingSource for StaticSource {
        async fn fetch(
            &self,
            request: &FilingRequest,
            destination: &Path,
        ) -> Result<Vec<PathBuf>, FetchError> {
            if request.filing_type.form() == "10-Q" {
                return Err(FetchError::UnknownTicker(request.ticker.clone()));
            }
            let dir = filing_directory(
                destination,
                &request.ticker,
                request.filing_type.form(),
                "0000320193-24-000123",
            );
            std::fs::create_dir_all(&dir).unwrap();
            let path = dir.join("primary-document.html");
            std::fs::write(
                &path,
                "<html><body><p>Net sales increased during fiscal 2024.</p></body></html>",
            )
            .unwrap();
            Ok(vec![path])
        }
    }

    fn write_filing(root: &Path, name: &str, body: &str) {
        std::fs::create_dir_all(root).unwrap();
        std::fs::write(root.join(name), format!("<html><body>{body}</body></html>")).unwrap();
    }

    fn paragraph(sentence: &str, repeat: usize) -> String {
        format!("<p>{}</p>", vec![sentence; repeat].join(" "))
    }

    #[tokio::test]
    async fn empty_corpus_never_calls_embedder_or_index() {
        let dir = tempfile::tempdir().unwrap();
        let embedder = CountingEmbedder::default();
        let index = RecordingIndex::default();
        let pipeline = Pipeline::with_components(
            sample_config(dir.path()),
            None,
            Box::new(embedder.clone()),
            Box::new(index.clone()),
        )
        .unwrap();

        let outcome = pipeline.run().await.unwrap();

        assert_eq!(outcome, PipelineOutcome::NoDocuments { skipped: 0 });
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
        assert!(index.prepared.lock().unwrap().is_empty());
        assert_eq!(index.upserts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn documents_without_text_count_as_no_documents() {
        let dir = tempfile::tempdir().unwrap();
        let config = sample_config(dir.path());
        write_filing(&config.sec_dir, "blank.html", "<script>var x = 1;</script>");
        let embedder = CountingEmbedder::default();
        let pipeline = Pipeline::with_components(
            config,
            None,
            Box::new(embedder.clone()),
            Box::new(RecordingIndex::default()),
        )
        .unwrap();

        let outcome = pipeline.run().await.unwrap();

        assert_eq!(outcome, PipelineOutcome::NoDocuments { skipped: 1 });
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn every_chunk_is_embedded_and_indexed_in_batches() {
        let dir = tempfile::tempdir().unwrap();
        let config = sample_config(dir.path());
        write_filing(
            &config.sec_dir,
            "aapl.html",
            &paragraph("Revenue grew across all segments.", 6),
        );
        write_filing(
            &config.sec_dir,
            "msft.htm",
            &paragraph("Cloud services drove operating income.", 4),
        );
        write_filing(&config.sec_dir, "notes.txt", "ignored");

        let embedder = CountingEmbedder::default();
        let index = RecordingIndex::default();
        let pipeline = Pipeline::with_components(
            config,
            None,
            Box::new(embedder.clone()),
            Box::new(index.clone()),
        )
        .unwrap();

        let PipelineOutcome::Completed(summary) = pipeline.run().await.unwrap() else {
            panic!("expected a completed run");
        };

        assert_eq!(summary.documents_loaded, 2);
        assert!(summary.chunks > 4);
        assert_eq!(summary.vectors_indexed, summary.chunks);
        assert_eq!(summary.batches, summary.chunks.div_ceil(4));
        assert_eq!(embedder.calls.load(Ordering::SeqCst), summary.batches);
        assert_eq!(index.upserts.load(Ordering::SeqCst), summary.batches);
        assert_eq!(*index.prepared.lock().unwrap(), vec![16]);

        let items = index.items.lock().unwrap();
        assert_eq!(items.len(), summary.chunks);
        assert!(items.iter().all(|item| item.text.chars().count() <= 40));
        assert!(items.iter().all(|item| item.vector.len() == 16));
        assert!(
            items
                .iter()
                .all(|item| item.chunk_hash == compute_chunk_hash(&item.text))
        );
        assert_eq!(items[0].metadata.chunk_index, 0);
        let second_document = items
            .iter()
            .position(|item| item.metadata.document.source_path.ends_with("msft.htm"))
            .unwrap();
        assert_eq!(items[second_document].metadata.chunk_index, 0);
    }

    #[tokio::test]
    async fn short_embedding_response_aborts_the_run() {
        let dir = tempfile::tempdir().unwrap();
        let config = sample_config(dir.path());
        write_filing(&config.sec_dir, "tsla.html", "<p>Deliveries rose.</p>");
        let index = RecordingIndex::default();
        let pipeline = Pipeline::with_components(
            config,
            None,
            Box::new(CountingEmbedder {
                drop_last: true,
                ..CountingEmbedder::default()
            }),
            Box::new(index.clone()),
        )
        .unwrap();

        let error = pipeline.run().await.unwrap_err();

        assert!(matches!(
            error,
            PipelineError::Embedding(EmbeddingClientError::CountMismatch {
                expected: 1,
                actual: 0
            })
        ));
        assert_eq!(index.upserts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn batches_persisted_before_a_failure_survive_and_next_run_appends() {
        let dir = tempfile::tempdir().unwrap();
        let config = sample_config(dir.path());
        write_filing(
            &config.sec_dir,
            "aapl.html",
            &paragraph("Revenue grew across all segments.", 8),
        );
        let index_dir = config.index.index_dir.clone();

        let failing = Pipeline::with_components(
            config.clone(),
            None,
            Box::new(CountingEmbedder {
                fail_on_call: Some(2),
                ..CountingEmbedder::default()
            }),
            Box::new(LocalIndex::new(index_dir.clone())),
        )
        .unwrap();
        let error = failing.run().await.unwrap_err();
        assert!(matches!(
            error,
            PipelineError::Embedding(EmbeddingClientError::ProviderUnavailable(_))
        ));

        let reader = LocalIndex::new(index_dir.clone());
        let survivors = reader.read_vectors().await.unwrap();
        assert_eq!(survivors.len(), 4);
        assert_eq!(
            survivors
                .iter()
                .map(|record| record.metadata.chunk_index)
                .collect::<Vec<_>>(),
            vec![0, 1, 2, 3]
        );

        let retry = Pipeline::with_components(
            config,
            None,
            Box::new(CountingEmbedder::default()),
            Box::new(LocalIndex::new(index_dir)),
        )
        .unwrap();
        let PipelineOutcome::Completed(summary) = retry.run().await.unwrap() else {
            panic!("expected a completed run");
        };

        let records = reader.read_vectors().await.unwrap();
        assert_eq!(records.len(), 4 + summary.vectors_indexed);
        assert_eq!(records[..4], survivors[..]);
        let manifest = reader.read_manifest().await.unwrap().unwrap();
        assert_eq!(manifest.vector_count, records.len());
        assert_eq!(manifest.segments.len(), 2);
    }

    #[tokio::test]
    async fn download_failures_do_not_stop_indexing() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = sample_config(dir.path());
        config.run_download = true;
        let index = RecordingIndex::default();
        let pipeline = Pipeline::with_components(
            config,
            Some(ArchiveClient::new(Box::new(StaticSource))),
            Box::new(CountingEmbedder::default()),
            Box::new(index.clone()),
        )
        .unwrap();

        let PipelineOutcome::Completed(summary) = pipeline.run().await.unwrap() else {
            panic!("expected a completed run");
        };

        assert_eq!(summary.downloads_attempted, 2);
        assert_eq!(summary.downloads_failed, 1);
        assert_eq!(summary.documents_loaded, 1);
        let items = index.items.lock().unwrap();
        assert_eq!(items[0].metadata.document.ticker.as_deref(), Some("AAPL"));
        assert_eq!(items[0].metadata.document.filing_type.as_deref(), Some("10-K"));
    }

    #[test]
    fn zero_batch_size_is_rejected_at_construction() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = sample_config(dir.path());
        config.embedding.batch_size = 0;

        let error = Pipeline::with_components(
            config,
            None,
            Box::new(CountingEmbedder::default()),
            Box::new(RecordingIndex::default()),
        )
        .err()
        .unwrap();
        assert!(matches!(
            error,
            PipelineError::Config(ConfigError::InvalidValue(ref key)) if key == "EMBEDDING_BATCH_SIZE"
        ));
    }

    #[test]
    fn from_config_requires_contact_when_downloading() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = sample_config(dir.path());
        config.run_download = true;
        config.archive.contact = None;

        let error = Pipeline::from_config(config).err().unwrap();
        assert!(matches!(
            error,
            PipelineError::Config(ConfigError::MissingContact)
        ));
    }
}

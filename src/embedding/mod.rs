//! Embedding providers producing unit-normalized vectors.

use crate::config::{EmbeddingProvider, EmbeddingSettings};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;

/// Errors raised by embedding providers.
#[derive(Debug, Error)]
pub enum EmbeddingClientError {
    /// Provider was unable to produce embeddings for the supplied input.
    #[error("Failed to generate embeddings: {0}")]
    GenerationFailed(String),
    /// Provider could not be reached.
    #[error("Embedding provider unavailable: {0}")]
    ProviderUnavailable(String),
    /// Provider returned a different number of vectors than inputs.
    #[error("Expected {expected} embeddings, received {actual}")]
    CountMismatch {
        /// Number of input texts.
        expected: usize,
        /// Number of vectors returned.
        actual: usize,
    },
    /// Returned vector length does not match the configured dimension.
    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Configured dimension.
        expected: usize,
        /// Dimension produced by the provider.
        actual: usize,
    },
}

/// Interface implemented by embedding backends.
///
/// Implementations must be deterministic for identical input and return unit-length vectors, one
/// per input text, in input order.
#[async_trait]
pub trait EmbeddingClient {
    /// Produce an embedding vector for each supplied chunk of text.
    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError>;
}

/// Scale `vector` to unit L2 norm in place. Zero vectors are left untouched.
pub fn normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
    if norm > 0.0 {
        for value in vector.iter_mut() {
            *value /= norm;
        }
    }
}

/// Deterministic byte-hashing embedder for offline runs and tests.
pub struct HashingEmbeddingClient {
    dimension: usize,
}

impl HashingEmbeddingClient {
    /// Construct a hashing client producing `dimension`-length vectors.
    pub const fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    fn encode(&self, text: &str) -> Vec<f32> {
        let mut embedding = vec![0.0_f32; self.dimension];

        if text.is_empty() {
            return embedding;
        }

        for (idx, byte) in text.bytes().enumerate() {
            let position = (idx + usize::from(byte)) % self.dimension;
            embedding[position] += f32::from(byte) / 255.0;
        }

        normalize(&mut embedding);
        embedding
    }
}

#[async_trait]
impl EmbeddingClient for HashingEmbeddingClient {
    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
        if self.dimension == 0 {
            return Err(EmbeddingClientError::GenerationFailed(
                "embedding dimension must be greater than zero".to_string(),
            ));
        }

        Ok(texts.iter().map(|text| self.encode(text)).collect())
    }
}

/// Embedding client backed by a local Ollama runtime (`/api/embed`).
pub struct OllamaEmbeddingClient {
    http: Client,
    base_url: String,
    model: String,
}

impl OllamaEmbeddingClient {
    /// Construct a client for `model` served at `base_url`.
    pub fn new(base_url: &str, model: &str) -> Result<Self, EmbeddingClientError> {
        let http = Client::builder()
            .user_agent("filing-indexer/embed")
            .build()
            .map_err(|error| EmbeddingClientError::ProviderUnavailable(error.to_string()))?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/api/embed", self.base_url)
    }
}

#[derive(Debug, Deserialize)]
struct OllamaEmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

#[async_trait]
impl EmbeddingClient for OllamaEmbeddingClient {
    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        tracing::debug!(model = %self.model, inputs = texts.len(), "Requesting embeddings");
        let response = self
            .http
            .post(self.endpoint())
            .json(&json!({ "model": self.model, "input": texts }))
            .send()
            .await
            .map_err(|error| {
                EmbeddingClientError::ProviderUnavailable(format!(
                    "failed to reach Ollama at {}: {error}",
                    self.base_url
                ))
            })?;

        if response.status() == StatusCode::NOT_FOUND {
            let body = response.text().await.unwrap_or_default();
            return Err(EmbeddingClientError::ProviderUnavailable(format!(
                "Ollama endpoint {} returned 404: {body}",
                self.endpoint()
            )));
        }

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(EmbeddingClientError::GenerationFailed(format!(
                "Ollama returned {status}: {body}"
            )));
        }

        let body: OllamaEmbedResponse = response.json().await.map_err(|error| {
            EmbeddingClientError::GenerationFailed(format!(
                "failed to decode Ollama response: {error}"
            ))
        })?;

        let mut embeddings = body.embeddings;
        for vector in &mut embeddings {
            normalize(vector);
        }
        Ok(embeddings)
    }
}

/// Build an embedding client suitable for the given settings.
pub fn build_embedding_client(
    settings: &EmbeddingSettings,
) -> Result<Box<dyn EmbeddingClient + Send + Sync>, EmbeddingClientError> {
    tracing::info!(
        provider = ?settings.provider,
        model = %settings.model,
        dimension = settings.dimension,
        "Initializing embedding client"
    );
    match settings.provider {
        EmbeddingProvider::Ollama => Ok(Box::new(OllamaEmbeddingClient::new(
            &settings.ollama_url,
            &settings.model,
        )?)),
        EmbeddingProvider::Hash => Ok(Box::new(HashingEmbeddingClient::new(settings.dimension))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{Method::POST, MockServer};

    fn norm(vector: &[f32]) -> f32 {
        vector.iter().map(|v| v * v).sum::<f32>().sqrt()
    }

    #[tokio::test]
    async fn hashing_client_is_deterministic_and_normalized() {
        let client = HashingEmbeddingClient::new(32);
        let texts = vec!["Total net sales".to_string(), "Risk factors".to_string()];
        let first = client.generate_embeddings(texts.clone()).await.unwrap();
        let second = client.generate_embeddings(texts).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(first.len(), 2);
        for vector in &first {
            assert_eq!(vector.len(), 32);
            assert!((norm(vector) - 1.0).abs() < 1e-5);
        }
        assert_ne!(first[0], first[1]);
    }

    #[tokio::test]
    async fn hashing_client_rejects_zero_dimension() {
        let error = HashingEmbeddingClient::new(0)
            .generate_embeddings(vec!["x".into()])
            .await
            .unwrap_err();
        assert!(matches!(error, EmbeddingClientError::GenerationFailed(_)));
    }

    #[tokio::test]
    async fn ollama_client_normalizes_vectors() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/api/embed")
                    .json_body(json!({ "model": "nomic-embed-text", "input": ["a", "b"] }));
                then.status(200).json_body(json!({
                    "model": "nomic-embed-text",
                    "embeddings": [[3.0, 4.0], [0.0, 2.0]]
                }));
            })
            .await;

        let client = OllamaEmbeddingClient::new(&server.base_url(), "nomic-embed-text").unwrap();
        let vectors = client
            .generate_embeddings(vec!["a".into(), "b".into()])
            .await
            .expect("embeddings");

        mock.assert_async().await;
        assert_eq!(vectors, vec![vec![0.6, 0.8], vec![0.0, 1.0]]);
    }

    #[tokio::test]
    async fn ollama_client_surfaces_error_status() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/embed");
                then.status(500).body("model crashed");
            })
            .await;

        let client = OllamaEmbeddingClient::new(&server.base_url(), "nomic-embed-text").unwrap();
        let error = client
            .generate_embeddings(vec!["a".into()])
            .await
            .unwrap_err();
        assert!(
            matches!(error, EmbeddingClientError::GenerationFailed(message) if message.contains("500"))
        );
    }
}

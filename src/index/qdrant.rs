//! HTTP client wrapper persisting vectors into a Qdrant collection.

use crate::index::payload::{build_payload, current_timestamp_rfc3339, generate_vector_id};
use crate::index::{IndexError, IndexState, IndexSummary, VectorIndex};
use crate::processing::IndexedVector;
use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode, Url};
use serde::Deserialize;
use serde_json::json;

/// Lightweight HTTP client for a single Qdrant collection.
pub struct QdrantIndex {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    collection: String,
}

impl QdrantIndex {
    /// Construct a client for `collection` on the Qdrant instance at `url`.
    pub fn new(url: &str, collection: &str, api_key: Option<String>) -> Result<Self, IndexError> {
        let client = Client::builder().user_agent("filing-indexer/0.1").build()?;
        let base_url = normalize_base_url(url).map_err(IndexError::InvalidUrl)?;
        tracing::debug!(
            url = %base_url,
            collection,
            has_api_key = api_key.as_deref().is_some_and(|value| !value.is_empty()),
            "Initialized Qdrant HTTP client"
        );

        Ok(Self {
            client,
            base_url,
            api_key,
            collection: collection.to_string(),
        })
    }

    async fn existing_collection(&self) -> Result<Option<CollectionInfo>, IndexError> {
        let response = self
            .request(Method::GET, &format!("collections/{}", self.collection))
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => {
                let info: CollectionInfoResponse = response.json().await?;
                Ok(Some(info.result))
            }
            StatusCode::NOT_FOUND => Ok(None),
            status => {
                let body = response.text().await.unwrap_or_default();
                let error = IndexError::UnexpectedStatus { status, body };
                tracing::error!(collection = %self.collection, error = %error, "Collection existence check failed");
                Err(error)
            }
        }
    }

    async fn create_collection(&self, vector_size: usize) -> Result<(), IndexError> {
        let body = json!({
            "vectors": {
                "size": vector_size,
                "distance": "Cosine"
            }
        });

        let response = self
            .request(Method::PUT, &format!("collections/{}", self.collection))
            .json(&body)
            .send()
            .await?;

        self.ensure_success(response, || {
            tracing::info!(collection = %self.collection, vector_size, "Collection created");
        })
        .await
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let url = format_endpoint(&self.base_url, path);
        let mut req = self.client.request(method, url);
        if let Some(api_key) = &self.api_key
            && !api_key.is_empty()
        {
            req = req.header("api-key", api_key);
        }
        req
    }

    async fn ensure_success<F>(
        &self,
        response: reqwest::Response,
        on_success: F,
    ) -> Result<(), IndexError>
    where
        F: FnOnce(),
    {
        if response.status().is_success() {
            on_success();
            Ok(())
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let error = IndexError::UnexpectedStatus { status, body };
            tracing::error!(error = %error, "Qdrant request failed");
            Err(error)
        }
    }
}

#[async_trait]
impl VectorIndex for QdrantIndex {
    async fn prepare(&self, dimension: usize) -> Result<IndexState, IndexError> {
        if let Some(info) = self.existing_collection().await? {
            if let Some(expected) = info.vector_size()
                && expected != dimension
            {
                return Err(IndexError::DimensionMismatch {
                    expected,
                    actual: dimension,
                });
            }
            return Ok(IndexState::Existing {
                vectors: Some(info.points_count.unwrap_or(0)),
            });
        }
        self.create_collection(dimension).await?;
        Ok(IndexState::Created)
    }

    async fn upsert(&self, items: Vec<IndexedVector>) -> Result<IndexSummary, IndexError> {
        if items.is_empty() {
            return Ok(IndexSummary::default());
        }

        let now = current_timestamp_rfc3339();
        let points: Vec<_> = items
            .iter()
            .map(|item| {
                json!({
                    "id": generate_vector_id(),
                    "vector": item.vector,
                    "payload": build_payload(item, &now),
                })
            })
            .collect();

        let point_count = points.len();
        let response = self
            .request(
                Method::PUT,
                &format!("collections/{}/points", self.collection),
            )
            .query(&[("wait", true)])
            .json(&json!({ "points": points }))
            .send()
            .await?;

        self.ensure_success(response, || {
            tracing::debug!(
                collection = %self.collection,
                points = point_count,
                "Points indexed"
            );
        })
        .await?;

        Ok(IndexSummary {
            inserted: point_count,
        })
    }

    fn describe(&self) -> String {
        format!("qdrant collection {} at {}", self.collection, self.base_url)
    }
}

fn normalize_base_url(url: &str) -> Result<String, String> {
    let mut parsed = Url::parse(url).map_err(|err| err.to_string())?;
    let path = parsed.path().trim_end_matches('/').to_string();
    parsed.set_path(&path);
    Ok(parsed.to_string())
}

fn format_endpoint(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    format!("{base}/{path}")
}

#[derive(Deserialize)]
struct CollectionInfoResponse {
    result: CollectionInfo,
}

#[derive(Deserialize)]
struct CollectionInfo {
    #[serde(default)]
    points_count: Option<usize>,
    #[serde(default)]
    config: Option<CollectionConfig>,
}

impl CollectionInfo {
    /// Size of the collection's unnamed vector; `None` for named-vector collections.
    fn vector_size(&self) -> Option<usize> {
        self.config
            .as_ref()?
            .params
            .vectors
            .get("size")?
            .as_u64()
            .and_then(|size| usize::try_from(size).ok())
    }
}

#[derive(Deserialize)]
struct CollectionConfig {
    params: CollectionParams,
}

#[derive(Deserialize)]
struct CollectionParams {
    #[serde(default)]
    vectors: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::compute_chunk_hash;
    use crate::loader::DocumentMetadata;
    use crate::processing::ChunkMetadata;
    use httpmock::{Method::GET, Method::PUT, MockServer};
    use std::path::Path;

    fn item() -> IndexedVector {
        IndexedVector {
            vector: vec![0.6, 0.8],
            text: "Automotive revenues".into(),
            metadata: ChunkMetadata {
                document: DocumentMetadata::from_path(Path::new(
                    "sec-edgar-filings/TSLA/10-Q/0001628280-24-043486/primary-document.htm",
                )),
                chunk_index: 0,
            },
            chunk_hash: compute_chunk_hash("Automotive revenues"),
        }
    }

    #[test]
    fn base_url_is_normalized() {
        assert_eq!(
            normalize_base_url("http://localhost:6333/").unwrap(),
            "http://localhost:6333/"
        );
        assert_eq!(
            format_endpoint("http://localhost:6333/", "/collections"),
            "http://localhost:6333/collections"
        );
        assert!(normalize_base_url("not a url").is_err());
    }

    #[tokio::test]
    async fn prepare_creates_missing_collection() {
        let server = MockServer::start_async().await;
        let lookup = server
            .mock_async(|when, then| {
                when.method(GET).path("/collections/sec-filings");
                then.status(404).json_body(json!({ "status": { "error": "Not found" } }));
            })
            .await;
        let create = server
            .mock_async(|when, then| {
                when.method(PUT)
                    .path("/collections/sec-filings")
                    .json_body(json!({ "vectors": { "size": 2, "distance": "Cosine" } }));
                then.status(200).json_body(json!({ "result": true, "status": "ok" }));
            })
            .await;

        let index = QdrantIndex::new(&server.base_url(), "sec-filings", None).unwrap();
        assert_eq!(index.prepare(2).await.unwrap(), IndexState::Created);
        lookup.assert_async().await;
        create.assert_async().await;
    }

    #[tokio::test]
    async fn prepare_reports_existing_collection() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/collections/sec-filings");
                then.status(200).json_body(json!({
                    "result": {
                        "status": "green",
                        "points_count": 42,
                        "config": { "params": { "vectors": { "size": 2, "distance": "Cosine" } } }
                    },
                    "status": "ok"
                }));
            })
            .await;

        let index = QdrantIndex::new(&server.base_url(), "sec-filings", None).unwrap();
        assert_eq!(
            index.prepare(2).await.unwrap(),
            IndexState::Existing { vectors: Some(42) }
        );
    }

    #[tokio::test]
    async fn prepare_rejects_collection_with_other_vector_size() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/collections/sec-filings");
                then.status(200).json_body(json!({
                    "result": {
                        "status": "green",
                        "points_count": 10,
                        "config": { "params": { "vectors": { "size": 384, "distance": "Cosine" } } }
                    },
                    "status": "ok"
                }));
            })
            .await;
        let create = server
            .mock_async(|when, then| {
                when.method(PUT).path("/collections/sec-filings");
                then.status(200).json_body(json!({ "result": true }));
            })
            .await;

        let index = QdrantIndex::new(&server.base_url(), "sec-filings", None).unwrap();
        let error = index.prepare(768).await.unwrap_err();

        assert!(matches!(
            error,
            IndexError::DimensionMismatch {
                expected: 384,
                actual: 768
            }
        ));
        assert_eq!(create.hits_async().await, 0);
    }

    #[tokio::test]
    async fn upsert_sends_points_with_provenance() {
        let server = MockServer::start_async().await;
        let upsert = server
            .mock_async(|when, then| {
                when.method(PUT)
                    .path("/collections/sec-filings/points")
                    .query_param("wait", "true")
                    .header("api-key", "secret")
                    .body_contains("\"ticker\":\"TSLA\"")
                    .body_contains("\"chunk_index\":0");
                then.status(200).json_body(json!({ "result": { "status": "completed" } }));
            })
            .await;

        let index =
            QdrantIndex::new(&server.base_url(), "sec-filings", Some("secret".into())).unwrap();
        let summary = index.upsert(vec![item()]).await.unwrap();

        upsert.assert_async().await;
        assert_eq!(summary.inserted, 1);
    }

    #[tokio::test]
    async fn upsert_failure_is_surfaced() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(PUT).path("/collections/sec-filings/points");
                then.status(400).body("wrong vector size");
            })
            .await;

        let index = QdrantIndex::new(&server.base_url(), "sec-filings", None).unwrap();
        let error = index.upsert(vec![item()]).await.unwrap_err();
        assert!(matches!(
            error,
            IndexError::UnexpectedStatus { status, .. } if status == StatusCode::BAD_REQUEST
        ));
    }
}

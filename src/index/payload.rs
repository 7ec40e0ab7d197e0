//! Helpers for hashing chunks and building stored payloads.

use crate::processing::IndexedVector;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use time::OffsetDateTime;
use uuid::Uuid;

/// Compute a deterministic SHA-256 hash for the chunk text.
pub fn compute_chunk_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let digest = hasher.finalize();
    hex::encode(digest)
}

/// Current timestamp formatted for payload storage.
pub(crate) fn current_timestamp_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}

/// Construct a fresh identifier for a stored vector.
pub(crate) fn generate_vector_id() -> String {
    Uuid::new_v4().to_string()
}

/// Build the payload object stored alongside each indexed chunk.
pub(crate) fn build_payload(item: &IndexedVector, indexed_at: &str) -> Value {
    let metadata = &item.metadata;
    let mut payload = Map::new();
    payload.insert("text".into(), Value::String(item.text.clone()));
    payload.insert(
        "source_path".into(),
        Value::String(metadata.document.source_path.clone()),
    );
    payload.insert("chunk_index".into(), Value::from(metadata.chunk_index));
    payload.insert("chunk_hash".into(), Value::String(item.chunk_hash.clone()));
    payload.insert("indexed_at".into(), Value::String(indexed_at.to_string()));

    let optional = [
        ("ticker", &metadata.document.ticker),
        ("filing_type", &metadata.document.filing_type),
        ("accession_number", &metadata.document.accession_number),
    ];
    for (key, value) in optional {
        if let Some(value) = value.as_ref().filter(|value| !value.is_empty()) {
            payload.insert(key.into(), Value::String(value.clone()));
        }
    }

    Value::Object(payload)
}

use crate::embeddings::{CharacterNgramEmbedder, Embedder};
use crate::traits::ChunkStore;
use crate::{ChunkMetadata, ChunkRecord, Neighbor, StoreError, StoredChunk};
use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use uuid::Uuid;

const BACKEND: &str = "qdrant";

const SCROLL_PAGE_SIZE: usize = 256;

/// Chunk store over the Qdrant REST API. Collections use Euclidean distance
/// and vectors come from the local embedder.
///
/// Every point carries a `sequence` number in its payload so that `get_all`
/// returns records in write order, as the in-memory store does.
pub struct QdrantChunkStore<E = CharacterNgramEmbedder> {
    endpoint: String,
    client: Client,
    embedder: E,
    next_sequence: HashMap<String, u64>,
}

impl QdrantChunkStore<CharacterNgramEmbedder> {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self::with_embedder(endpoint, CharacterNgramEmbedder::default())
    }
}

impl<E> QdrantChunkStore<E>
where
    E: Embedder,
{
    pub fn with_embedder(endpoint: impl Into<String>, embedder: E) -> Self {
        Self {
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            client: Client::new(),
            embedder,
            next_sequence: HashMap::new(),
        }
    }

    fn collection_url(&self, name: &str) -> String {
        format!("{}/collections/{}", self.endpoint, name)
    }

    fn check_dimensions(&self, embedding: &[f32]) -> Result<(), StoreError> {
        if embedding.len() != self.embedder.dimensions() {
            return Err(StoreError::DimensionMismatch {
                expected: self.embedder.dimensions(),
                actual: embedding.len(),
            });
        }
        Ok(())
    }

    async fn scroll_page(
        &self,
        collection: &str,
        offset: Option<Value>,
    ) -> Result<(Vec<Value>, Option<Value>), StoreError> {
        let mut body = json!({
            "limit": SCROLL_PAGE_SIZE,
            "with_payload": true,
            "with_vector": true,
        });
        if let Some(offset) = offset {
            body["offset"] = offset;
        }

        let response = self
            .client
            .post(format!("{}/points/scroll", self.collection_url(collection)))
            .json(&body)
            .send()
            .await?;
        let parsed = json_or_error(response, collection).await?;

        let points = parsed
            .pointer("/result/points")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        let next = parsed
            .pointer("/result/next_page_offset")
            .filter(|value| !value.is_null())
            .cloned();
        Ok((points, next))
    }
}

/// Qdrant ids must be integers or UUIDs; derive a stable UUID from the
/// record id and keep the record id in the payload.
pub fn point_id(record_id: &str) -> Uuid {
    let digest = Sha256::digest(record_id.as_bytes());
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&digest[..16]);
    Uuid::from_bytes(bytes)
}

fn point_payload(record: &ChunkRecord, sequence: u64) -> Value {
    json!({
        "sequence": sequence,
        "record_id": record.id,
        "text": record.text,
        "source": record.metadata.source,
        "page": record.metadata.page,
        "chunk_position": record.metadata.chunk_position,
        "tags": record.metadata.tags,
    })
}

fn parse_payload(point: &Value) -> Result<(String, String, ChunkMetadata), StoreError> {
    let payload = point
        .get("payload")
        .ok_or_else(|| malformed("point without payload"))?;
    let text_field = |name: &str| {
        payload
            .get(name)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };
    let number_field = |name: &str| {
        payload
            .get(name)
            .and_then(Value::as_u64)
            .and_then(|value| u32::try_from(value).ok())
            .unwrap_or_default()
    };

    let metadata = ChunkMetadata {
        source: text_field("source"),
        page: number_field("page"),
        chunk_position: number_field("chunk_position"),
        tags: text_field("tags"),
    };
    Ok((text_field("record_id"), text_field("text"), metadata))
}

fn parse_sequence(point: &Value) -> u64 {
    point
        .pointer("/payload/sequence")
        .and_then(Value::as_u64)
        .unwrap_or_default()
}

/// Stable, so points written in one batch without a sequence keep scroll order.
fn into_write_order(mut sequenced: Vec<(u64, StoredChunk)>) -> Vec<StoredChunk> {
    sequenced.sort_by_key(|(sequence, _)| *sequence);
    sequenced.into_iter().map(|(_, chunk)| chunk).collect()
}

fn parse_vector(point: &Value) -> Result<Vec<f32>, StoreError> {
    point
        .get("vector")
        .and_then(Value::as_array)
        .ok_or_else(|| malformed("point without vector"))?
        .iter()
        .map(|value| {
            value
                .as_f64()
                .map(|number| number as f32)
                .ok_or_else(|| malformed("non-numeric vector component"))
        })
        .collect()
}

fn malformed(details: &str) -> StoreError {
    StoreError::BackendResponse {
        backend: BACKEND.to_string(),
        details: details.to_string(),
    }
}

async fn ensure_success(response: Response, collection: &str) -> Result<Response, StoreError> {
    let status = response.status();
    if status == StatusCode::NOT_FOUND {
        return Err(StoreError::MissingCollection(collection.to_string()));
    }
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(StoreError::BackendResponse {
            backend: BACKEND.to_string(),
            details: format!("{status}: {body}"),
        });
    }
    Ok(response)
}

async fn json_or_error(response: Response, collection: &str) -> Result<Value, StoreError> {
    Ok(ensure_success(response, collection).await?.json().await?)
}

#[async_trait]
impl<E> ChunkStore for QdrantChunkStore<E>
where
    E: Embedder,
{
    async fn delete_collection(&mut self, name: &str) -> Result<(), StoreError> {
        let response = self.client.delete(self.collection_url(name)).send().await?;
        self.next_sequence.remove(name);
        match ensure_success(response, name).await {
            Ok(_) | Err(StoreError::MissingCollection(_)) => Ok(()),
            Err(error) => Err(error),
        }
    }

    async fn create_collection(&mut self, name: &str) -> Result<(), StoreError> {
        let existing = self.client.get(self.collection_url(name)).send().await?;
        if existing.status().is_success() {
            let written = self.count(name).await? as u64;
            self.next_sequence.insert(name.to_string(), written);
            return Ok(());
        }
        if existing.status() != StatusCode::NOT_FOUND {
            return Err(StoreError::BackendResponse {
                backend: BACKEND.to_string(),
                details: existing.status().to_string(),
            });
        }

        let response = self
            .client
            .put(self.collection_url(name))
            .json(&json!({
                "vectors": {
                    "size": self.embedder.dimensions(),
                    "distance": "Euclid",
                }
            }))
            .send()
            .await?;
        ensure_success(response, name).await?;
        self.next_sequence.insert(name.to_string(), 0);
        Ok(())
    }

    async fn put(&mut self, collection: &str, records: &[ChunkRecord]) -> Result<(), StoreError> {
        if records.is_empty() {
            return Ok(());
        }

        let first_sequence = self.next_sequence.get(collection).copied().unwrap_or_default();
        let points = records
            .iter()
            .zip(first_sequence..)
            .map(|(record, sequence)| {
                let vector = match &record.embedding {
                    Some(embedding) => embedding.clone(),
                    None => self.embedder.embed(&record.text),
                };
                self.check_dimensions(&vector)?;
                Ok(json!({
                    "id": point_id(&record.id).to_string(),
                    "vector": vector,
                    "payload": point_payload(record, sequence),
                }))
            })
            .collect::<Result<Vec<_>, StoreError>>()?;

        let response = self
            .client
            .put(format!("{}/points?wait=true", self.collection_url(collection)))
            .json(&json!({ "points": points }))
            .send()
            .await?;
        ensure_success(response, collection).await?;
        self.next_sequence
            .insert(collection.to_string(), first_sequence + records.len() as u64);
        Ok(())
    }

    async fn get_all(&self, collection: &str) -> Result<Vec<StoredChunk>, StoreError> {
        let mut sequenced = Vec::new();
        let mut offset = None;

        loop {
            let (points, next) = self.scroll_page(collection, offset).await?;
            for point in &points {
                let (id, text, metadata) = parse_payload(point)?;
                let chunk = StoredChunk {
                    id,
                    text,
                    metadata,
                    embedding: parse_vector(point)?,
                };
                sequenced.push((parse_sequence(point), chunk));
            }
            match next {
                Some(next) => offset = Some(next),
                None => break,
            }
        }

        // scroll pages come back in point-id order
        Ok(into_write_order(sequenced))
    }

    async fn query(
        &self,
        collection: &str,
        text: &str,
        k: usize,
    ) -> Result<Vec<Neighbor>, StoreError> {
        let vector = self.embedder.embed(text);
        let response = self
            .client
            .post(format!("{}/points/search", self.collection_url(collection)))
            .json(&json!({
                "vector": vector,
                "limit": k,
                "with_payload": true,
            }))
            .send()
            .await?;
        let parsed = json_or_error(response, collection).await?;

        let hits = parsed
            .pointer("/result")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        hits.iter()
            .map(|hit| {
                let (id, text, metadata) = parse_payload(hit)?;
                // with Euclid distance qdrant reports the distance as the score
                let distance = hit.get("score").and_then(Value::as_f64).unwrap_or(0.0) as f32;
                Ok(Neighbor {
                    id,
                    text,
                    metadata,
                    distance,
                })
            })
            .collect::<Result<Vec<_>, StoreError>>()
    }

    async fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, StoreError> {
        Ok(self.embedder.embed_all(texts))
    }

    async fn count(&self, collection: &str) -> Result<usize, StoreError> {
        let response = self
            .client
            .post(format!("{}/points/count", self.collection_url(collection)))
            .json(&json!({ "exact": true }))
            .send()
            .await?;
        let parsed = json_or_error(response, collection).await?;
        parsed
            .pointer("/result/count")
            .and_then(Value::as_u64)
            .map(|count| count as usize)
            .ok_or_else(|| malformed("count response without result.count"))
    }
}

use crate::embeddings::{squared_euclidean, CharacterNgramEmbedder, Embedder};
use crate::traits::ChunkStore;
use crate::{ChunkRecord, Neighbor, StoreError, StoredChunk};
use async_trait::async_trait;
use std::collections::HashMap;

/// Chunk store kept in process memory. Records stay in insertion order and
/// distances are squared Euclidean.
#[derive(Debug, Default)]
pub struct InMemoryChunkStore<E = CharacterNgramEmbedder> {
    embedder: E,
    collections: HashMap<String, Vec<StoredChunk>>,
}

impl InMemoryChunkStore<CharacterNgramEmbedder> {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<E> InMemoryChunkStore<E>
where
    E: Embedder,
{
    pub fn with_embedder(embedder: E) -> Self {
        Self {
            embedder,
            collections: HashMap::new(),
        }
    }

    pub fn has_collection(&self, name: &str) -> bool {
        self.collections.contains_key(name)
    }

    fn collection(&self, name: &str) -> Result<&Vec<StoredChunk>, StoreError> {
        self.collections
            .get(name)
            .ok_or_else(|| StoreError::MissingCollection(name.to_string()))
    }

    fn embedding_for(&self, record: &ChunkRecord) -> Result<Vec<f32>, StoreError> {
        let embedding = match &record.embedding {
            Some(embedding) => embedding.clone(),
            None => self.embedder.embed(&record.text),
        };
        if embedding.len() != self.embedder.dimensions() {
            return Err(StoreError::DimensionMismatch {
                expected: self.embedder.dimensions(),
                actual: embedding.len(),
            });
        }
        Ok(embedding)
    }
}

#[async_trait]
impl<E> ChunkStore for InMemoryChunkStore<E>
where
    E: Embedder,
{
    async fn delete_collection(&mut self, name: &str) -> Result<(), StoreError> {
        self.collections.remove(name);
        Ok(())
    }

    async fn create_collection(&mut self, name: &str) -> Result<(), StoreError> {
        self.collections.entry(name.to_string()).or_default();
        Ok(())
    }

    async fn put(&mut self, collection: &str, records: &[ChunkRecord]) -> Result<(), StoreError> {
        let stored = records
            .iter()
            .map(|record| {
                Ok(StoredChunk {
                    id: record.id.clone(),
                    text: record.text.clone(),
                    metadata: record.metadata.clone(),
                    embedding: self.embedding_for(record)?,
                })
            })
            .collect::<Result<Vec<_>, StoreError>>()?;

        let target = self
            .collections
            .get_mut(collection)
            .ok_or_else(|| StoreError::MissingCollection(collection.to_string()))?;

        for chunk in stored {
            match target.iter_mut().find(|existing| existing.id == chunk.id) {
                Some(existing) => *existing = chunk,
                None => target.push(chunk),
            }
        }
        Ok(())
    }

    async fn get_all(&self, collection: &str) -> Result<Vec<StoredChunk>, StoreError> {
        Ok(self.collection(collection)?.clone())
    }

    async fn query(
        &self,
        collection: &str,
        text: &str,
        k: usize,
    ) -> Result<Vec<Neighbor>, StoreError> {
        let chunks = self.collection(collection)?;
        let query_vector = self.embedder.embed(text);

        let mut neighbors: Vec<Neighbor> = chunks
            .iter()
            .map(|chunk| Neighbor {
                id: chunk.id.clone(),
                text: chunk.text.clone(),
                metadata: chunk.metadata.clone(),
                distance: squared_euclidean(&query_vector, &chunk.embedding),
            })
            .collect();

        neighbors.sort_by(|left, right| left.distance.total_cmp(&right.distance));
        neighbors.truncate(k);
        Ok(neighbors)
    }

    async fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, StoreError> {
        Ok(self.embedder.embed_all(texts))
    }

    async fn count(&self, collection: &str) -> Result<usize, StoreError> {
        Ok(self.collection(collection)?.len())
    }
}

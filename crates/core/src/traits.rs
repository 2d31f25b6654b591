use crate::{ChunkRecord, Neighbor, StoreError, StoredChunk};
use async_trait::async_trait;

/// A vector storage engine holding named collections of chunk records.
///
/// Writers take `&mut self`: a collection is rebuilt wholesale on every
/// indexing run, so a handle has at most one writer and no reader can
/// observe it half-rebuilt. Readers share `&self`.
#[async_trait]
pub trait ChunkStore: Send + Sync {
    /// Drop a collection and everything in it. Missing collections are fine.
    async fn delete_collection(&mut self, name: &str) -> Result<(), StoreError>;

    /// Create a collection, or keep the existing one.
    async fn create_collection(&mut self, name: &str) -> Result<(), StoreError>;

    /// Store records in order, embedding those without a vector.
    async fn put(&mut self, collection: &str, records: &[ChunkRecord]) -> Result<(), StoreError>;

    /// Every record with its embedding, in storage order.
    async fn get_all(&self, collection: &str) -> Result<Vec<StoredChunk>, StoreError>;

    /// Up to `k` nearest records to `text`, by ascending distance.
    async fn query(
        &self,
        collection: &str,
        text: &str,
        k: usize,
    ) -> Result<Vec<Neighbor>, StoreError>;

    async fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, StoreError>;

    async fn count(&self, collection: &str) -> Result<usize, StoreError> {
        Ok(self.get_all(collection).await?.len())
    }
}

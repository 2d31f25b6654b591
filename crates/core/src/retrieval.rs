use crate::embeddings::cosine_similarity;
use crate::llm::CompletionModel;
use crate::tags::TagExtractor;
use crate::traits::ChunkStore;
use crate::{
    Neighbor, RetrievalBranch, RetrievalHit, RetrievalOptions, RetrievalResult, StoreError,
    StoredChunk,
};
use std::collections::HashSet;
use tracing::{debug, info};

/// Tag pre-filter followed by cosine rerank, with a plain nearest-neighbour
/// query when no stored chunk shares a tag with the query.
///
/// The retriever only reads from the store, so any number of them may share
/// one store as long as no indexing run holds it.
pub struct HybridRetriever<'a, S, M> {
    store: &'a S,
    tagger: &'a TagExtractor<M>,
    options: RetrievalOptions,
}

impl<'a, S, M> HybridRetriever<'a, S, M>
where
    S: ChunkStore,
    M: CompletionModel,
{
    pub fn new(store: &'a S, tagger: &'a TagExtractor<M>) -> Self {
        Self::with_options(store, tagger, RetrievalOptions::default())
    }

    pub fn with_options(store: &'a S, tagger: &'a TagExtractor<M>, options: RetrievalOptions) -> Self {
        Self {
            store,
            tagger,
            options,
        }
    }

    pub fn options(&self) -> &RetrievalOptions {
        &self.options
    }

    pub async fn retrieve(&self, query: &str) -> Result<RetrievalResult, StoreError> {
        let tags = self.tagger.query_tags(query).await;
        let collection = &self.options.collection;
        let stored = self.store.get_all(collection).await?;

        let wanted: HashSet<&str> = tags.iter().map(String::as_str).collect();
        let preselected = preselect(&stored, &wanted);
        debug!(
            query,
            tags = ?tags,
            stored = stored.len(),
            preselected = preselected.len(),
            "tag pre-selection"
        );

        let (branch, hits) = if preselected.is_empty() {
            let neighbors = self
                .store
                .query(collection, query, self.options.top_k)
                .await?;
            (RetrievalBranch::VectorFallback, distance_hits(neighbors))
        } else {
            let query_vector = self
                .store
                .embed(&[query])
                .await?
                .into_iter()
                .next()
                .ok_or_else(|| StoreError::BackendResponse {
                    backend: "embedder".to_string(),
                    details: "no embedding returned for the query".to_string(),
                })?;
            (
                RetrievalBranch::TagFiltered,
                rank_by_similarity(&query_vector, &preselected, self.options.top_k),
            )
        };

        for hit in &hits {
            debug!(id = %hit.id, source = %hit.source, page = hit.page, score = hit.score, "retrieved chunk");
        }
        info!(branch = ?branch, hits = hits.len(), "retrieval finished");

        Ok(RetrievalResult {
            query: query.to_string(),
            tags,
            branch,
            hits,
        })
    }
}

/// Chunks whose stored tags intersect `wanted`, in storage order.
fn preselect<'c>(stored: &'c [StoredChunk], wanted: &HashSet<&str>) -> Vec<&'c StoredChunk> {
    if wanted.is_empty() {
        return Vec::new();
    }
    stored
        .iter()
        .filter(|chunk| {
            chunk
                .metadata
                .tag_set()
                .iter()
                .any(|tag| wanted.contains(tag))
        })
        .collect()
}

/// Descending cosine similarity; `sort_by` is stable so equal scores keep
/// storage order.
fn rank_by_similarity(query_vector: &[f32], chunks: &[&StoredChunk], top_k: usize) -> Vec<RetrievalHit> {
    let mut scored: Vec<(f32, &StoredChunk)> = chunks
        .iter()
        .map(|chunk| (cosine_similarity(query_vector, &chunk.embedding), *chunk))
        .collect();
    scored.sort_by(|left, right| right.0.total_cmp(&left.0));

    scored
        .into_iter()
        .take(top_k)
        .map(|(score, chunk)| RetrievalHit {
            id: chunk.id.clone(),
            text: chunk.text.clone(),
            source: chunk.metadata.source.clone(),
            page: chunk.metadata.page,
            score,
        })
        .collect()
}

pub fn distance_to_score(distance: f32) -> f32 {
    1.0 / (1.0 + distance)
}

fn distance_hits(neighbors: Vec<Neighbor>) -> Vec<RetrievalHit> {
    neighbors
        .into_iter()
        .map(|neighbor| RetrievalHit {
            score: distance_to_score(neighbor.distance),
            id: neighbor.id,
            text: neighbor.text,
            source: neighbor.metadata.source,
            page: neighbor.metadata.page,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LlmError;
    use crate::stores::InMemoryChunkStore;
    use crate::{record_id, ChunkMetadata, ChunkRecord};
    use async_trait::async_trait;
    use proptest::prelude::*;

    struct QueryModel(&'static str);

    #[async_trait]
    impl CompletionModel for QueryModel {
        async fn complete(&self, _prompt: &str) -> Result<String, LlmError> {
            Ok(self.0.to_string())
        }
    }

    struct DownModel;

    #[async_trait]
    impl CompletionModel for DownModel {
        async fn complete(&self, _prompt: &str) -> Result<String, LlmError> {
            Err(LlmError::EmptyCompletion)
        }
    }

    async fn empty_store() -> Result<InMemoryChunkStore, StoreError> {
        let mut store = InMemoryChunkStore::new();
        store
            .create_collection(&RetrievalOptions::default().collection)
            .await?;
        Ok(store)
    }

    async fn add_document(
        store: &mut InMemoryChunkStore,
        source: &str,
        tags: &[&str],
        chunks: &[&str],
    ) -> Result<(), StoreError> {
        let tags: Vec<String> = tags.iter().map(|tag| tag.to_string()).collect();
        let records: Vec<ChunkRecord> = chunks
            .iter()
            .enumerate()
            .map(|(position, text)| ChunkRecord {
                id: record_id(source, position as u32),
                text: text.to_string(),
                metadata: ChunkMetadata::new(source, position as u32, &tags),
                embedding: None,
            })
            .collect();
        store
            .put(&RetrievalOptions::default().collection, &records)
            .await
    }

    #[tokio::test]
    async fn matching_tags_restrict_and_rank_by_cosine() -> Result<(), StoreError> {
        let mut store = empty_store().await?;
        add_document(
            &mut store,
            "geze.pdf",
            &["PEM", "GEZE"],
            &["horaires de la gare", "capteurs de vibration du viaduc"],
        )
        .await?;
        add_document(
            &mut store,
            "autre.pdf",
            &["TRAMWAY"],
            &["capteurs de vibration du viaduc de la ligne"],
        )
        .await?;
        let tagger = TagExtractor::new(QueryModel(r#"["GEZE", "VIBRATION"]"#));

        let result = HybridRetriever::new(&store, &tagger)
            .retrieve("capteurs de vibration à Gèze")
            .await?;

        assert_eq!(result.branch, RetrievalBranch::TagFiltered);
        assert_eq!(result.tags, vec!["GEZE", "VIBRATION"]);
        let ids: Vec<&str> = result.hits.iter().map(|hit| hit.id.as_str()).collect();
        assert_eq!(ids, vec!["geze.pdf_1", "geze.pdf_0"]);
        assert!(result.hits[0].score >= result.hits[1].score);
        Ok(())
    }

    #[tokio::test]
    async fn unmatched_tags_fall_back_to_nearest_neighbours() -> Result<(), StoreError> {
        let mut store = empty_store().await?;
        add_document(
            &mut store,
            "rc.pdf",
            &["BPU"],
            &["bordereau des prix", "planning des travaux", "capteurs"],
        )
        .await?;
        let tagger = TagExtractor::new(QueryModel("VIADUC"));

        let options = RetrievalOptions {
            top_k: 2,
            ..RetrievalOptions::default()
        };
        let result = HybridRetriever::with_options(&store, &tagger, options)
            .retrieve("planning")
            .await?;

        assert_eq!(result.branch, RetrievalBranch::VectorFallback);
        assert_eq!(result.hits.len(), 2);
        assert_eq!(result.hits[0].id, "rc.pdf_1");
        assert!(result.hits[0].score > result.hits[1].score);
        assert!(result.hits.iter().all(|hit| hit.score > 0.0 && hit.score <= 1.0));
        Ok(())
    }

    #[tokio::test]
    async fn model_failure_uses_vector_branch() -> Result<(), StoreError> {
        let mut store = empty_store().await?;
        add_document(&mut store, "rc.pdf", &["BPU"], &["bordereau des prix"]).await?;
        let tagger = TagExtractor::new(DownModel);

        let result = HybridRetriever::new(&store, &tagger).retrieve("BPU").await?;
        assert!(result.tags.is_empty());
        assert_eq!(result.branch, RetrievalBranch::VectorFallback);
        assert_eq!(result.hits.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn empty_collection_returns_no_hits() -> Result<(), StoreError> {
        let store = empty_store().await?;
        let tagger = TagExtractor::new(QueryModel("GEZE"));

        let result = HybridRetriever::new(&store, &tagger).retrieve("Gèze").await?;
        assert!(result.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn missing_collection_is_a_store_error() {
        let store = InMemoryChunkStore::new();
        let tagger = TagExtractor::new(QueryModel("GEZE"));

        let result = HybridRetriever::new(&store, &tagger).retrieve("Gèze").await;
        assert!(matches!(result, Err(StoreError::MissingCollection(_))));
    }

    #[tokio::test]
    async fn tag_branch_respects_top_k() -> Result<(), StoreError> {
        let chunks = ["a1 lot", "b2 lot", "c3 lot", "d4 lot"];
        let mut store = empty_store().await?;
        add_document(&mut store, "cctp.pdf", &["CCTP"], &chunks).await?;
        let tagger = TagExtractor::new(QueryModel("CCTP"));
        let options = RetrievalOptions {
            top_k: 3,
            ..RetrievalOptions::default()
        };

        let result = HybridRetriever::with_options(&store, &tagger, options)
            .retrieve("cctp")
            .await?;
        assert_eq!(result.branch, RetrievalBranch::TagFiltered);
        assert_eq!(result.hits.len(), 3);
        Ok(())
    }

    /// Delegates to an in-memory store but never returns query embeddings.
    struct SilentEmbedder(InMemoryChunkStore);

    #[async_trait]
    impl ChunkStore for SilentEmbedder {
        async fn delete_collection(&mut self, name: &str) -> Result<(), StoreError> {
            self.0.delete_collection(name).await
        }

        async fn create_collection(&mut self, name: &str) -> Result<(), StoreError> {
            self.0.create_collection(name).await
        }

        async fn put(&mut self, collection: &str, records: &[ChunkRecord]) -> Result<(), StoreError> {
            self.0.put(collection, records).await
        }

        async fn get_all(&self, collection: &str) -> Result<Vec<StoredChunk>, StoreError> {
            self.0.get_all(collection).await
        }

        async fn query(
            &self,
            collection: &str,
            text: &str,
            k: usize,
        ) -> Result<Vec<Neighbor>, StoreError> {
            self.0.query(collection, text, k).await
        }

        async fn embed(&self, _texts: &[&str]) -> Result<Vec<Vec<f32>>, StoreError> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn missing_query_embedding_is_a_store_error() -> Result<(), StoreError> {
        let mut inner = empty_store().await?;
        add_document(&mut inner, "rc.pdf", &["BPU"], &["bordereau des prix"]).await?;
        let store = SilentEmbedder(inner);
        let tagger = TagExtractor::new(QueryModel("BPU"));

        let result = HybridRetriever::new(&store, &tagger).retrieve("prix du BPU").await;
        assert!(matches!(result, Err(StoreError::BackendResponse { .. })));
        Ok(())
    }

    fn stored(id: &str, embedding: Vec<f32>) -> StoredChunk {
        StoredChunk {
            id: id.to_string(),
            text: id.to_string(),
            metadata: ChunkMetadata::new("doc.pdf", 0, &["TAG".to_string()]),
            embedding,
        }
    }

    #[test]
    fn equal_similarities_keep_storage_order() {
        let chunks = [
            stored("first", vec![1.0, 0.0]),
            stored("best", vec![1.0, 1.0]),
            stored("second", vec![1.0, 0.0]),
            stored("third", vec![1.0, 0.0]),
        ];
        let refs: Vec<&StoredChunk> = chunks.iter().collect();

        let hits = rank_by_similarity(&[1.0, 1.0], &refs, 10);
        assert_eq!(hits[1].score, hits[2].score);
        assert_eq!(hits[2].score, hits[3].score);
        let ids: Vec<&str> = hits.iter().map(|hit| hit.id.as_str()).collect();
        assert_eq!(ids, vec!["best", "first", "second", "third"]);

        let reversed: Vec<&StoredChunk> = chunks.iter().rev().collect();
        let hits = rank_by_similarity(&[1.0, 1.0], &reversed, 10);
        let ids: Vec<&str> = hits.iter().map(|hit| hit.id.as_str()).collect();
        assert_eq!(ids, vec!["best", "third", "second", "first"]);
    }

    #[test]
    fn preselection_needs_an_exact_shared_tag() {
        let chunks = [stored("a", vec![1.0])];
        let wanted: HashSet<&str> = ["TA"].into_iter().collect();
        assert!(preselect(&chunks, &wanted).is_empty());

        let wanted: HashSet<&str> = ["TAG"].into_iter().collect();
        assert_eq!(preselect(&chunks, &wanted).len(), 1);
        assert!(preselect(&chunks, &HashSet::new()).is_empty());
    }

    proptest! {
        #[test]
        fn score_decreases_with_distance(near in 0.0f32..1e6, gap in 0.001f32..1e3) {
            let far = near + gap;
            prop_assert!(distance_to_score(near) > distance_to_score(far));
            prop_assert!(distance_to_score(near) <= 1.0);
            prop_assert!(distance_to_score(far) > 0.0);
        }
    }
}

pub mod answer;
pub mod chunking;
pub mod embeddings;
pub mod error;
pub mod extractor;
pub mod ingest;
pub mod llm;
pub mod models;
pub mod retrieval;
pub mod stores;
pub mod tags;
pub mod traits;

pub use answer::{Answer, AnswerSynthesizer};
pub use chunking::{
    chunk_by_paragraph, chunk_fixed_window, normalize_text, normalize_whitespace,
    ChunkingConfig, ChunkingStrategy,
};
pub use embeddings::{CharacterNgramEmbedder, Embedder, DEFAULT_EMBEDDING_DIMENSIONS};
pub use error::{AnswerError, IngestError, LlmError, StoreError};
pub use extractor::{
    discover_documents, DocxTextExtractor, ExtractorSet, PdfTextExtractor, PlainTextExtractor,
    TextExtractor,
};
pub use ingest::{index_documents, index_folder};
pub use llm::{ChatCompletionClient, ChatCompletionConfig, CompletionModel};
pub use models::{
    join_tags, page_estimate, record_id, ChunkMetadata, ChunkRecord, IndexedDocument,
    IndexingOptions, IndexingReport, Neighbor, RetrievalBranch, RetrievalHit, RetrievalOptions,
    RetrievalResult, SkippedFile, StoredChunk, DEFAULT_COLLECTION, DEFAULT_TOP_K, TAG_DELIMITER,
};
pub use retrieval::HybridRetriever;
pub use stores::{InMemoryChunkStore, QdrantChunkStore};
pub use tags::{StopwordSet, TagExtractor, TagParse, TagScope};
pub use traits::ChunkStore;

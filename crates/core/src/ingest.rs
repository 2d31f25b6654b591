use crate::chunking::{normalize_paragraphs, normalize_text, ChunkingStrategy};
use crate::extractor::{discover_documents, ExtractorSet};
use crate::llm::CompletionModel;
use crate::tags::TagExtractor;
use crate::traits::ChunkStore;
use crate::{
    record_id, ChunkMetadata, ChunkRecord, IndexedDocument, IndexingOptions, IndexingReport,
    IngestError, SkippedFile, StoreError,
};
use chrono::Utc;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Rebuild `options.collection` from scratch out of `paths`.
///
/// The previous collection is dropped first, so nothing indexed by an
/// earlier run survives. Unreadable, missing or unsupported files are
/// skipped and reported; only storage failures abort the run.
pub async fn index_documents<S, M, P>(
    store: &mut S,
    tagger: &TagExtractor<M>,
    extractors: &ExtractorSet,
    paths: &[P],
    options: &IndexingOptions,
) -> Result<IndexingReport, StoreError>
where
    S: ChunkStore,
    M: CompletionModel,
    P: AsRef<Path>,
{
    store.delete_collection(&options.collection).await?;
    store.create_collection(&options.collection).await?;
    info!(collection = %options.collection, "collection reset");

    let mut documents = Vec::new();
    let mut skipped_files = Vec::new();
    let mut total_chunks = 0;
    let mut seen_sources = HashSet::new();

    for path in paths {
        let path = path.as_ref();
        let prepared = prepare_document(path, extractors, options).and_then(|(source, text)| {
            // record ids are keyed by file name, so a second file with the
            // same name would overwrite the first one's chunks
            if seen_sources.insert(source.clone()) {
                Ok((source, text))
            } else {
                Err(IngestError::DuplicateFileName(source))
            }
        });
        let (source, text) = match prepared {
            Ok(prepared) => prepared,
            Err(error) => {
                warn!(path = %path.display(), reason = %error, "skipped document");
                skipped_files.push(SkippedFile {
                    path: path.to_path_buf(),
                    reason: error.to_string(),
                });
                continue;
            }
        };

        let chunks = options.chunking.chunk(&text);
        let tags = if chunks.is_empty() {
            Vec::new()
        } else {
            let snippet: String = text.chars().take(options.snippet_chars).collect();
            tagger.document_tags(&snippet).await
        };

        let records = chunks
            .into_iter()
            .enumerate()
            .map(|(position, chunk)| {
                let position = position as u32;
                ChunkRecord {
                    id: record_id(&source, position),
                    text: chunk,
                    metadata: ChunkMetadata::new(source.clone(), position, &tags),
                    embedding: None,
                }
            })
            .collect::<Vec<_>>();

        store.put(&options.collection, &records).await?;
        info!(
            source = %source,
            chunk_count = records.len(),
            tags = ?tags,
            "document indexed"
        );

        total_chunks += records.len();
        documents.push(IndexedDocument {
            source,
            chunk_count: records.len(),
            tags,
        });
    }

    info!(
        collection = %options.collection,
        total_chunks,
        skipped = skipped_files.len(),
        "indexing finished"
    );

    Ok(IndexingReport {
        collection: options.collection.clone(),
        total_chunks,
        documents,
        skipped_files,
        indexed_at: Utc::now(),
    })
}

/// Index every supported document found under `folder`.
pub async fn index_folder<S, M>(
    store: &mut S,
    tagger: &TagExtractor<M>,
    extractors: &ExtractorSet,
    folder: &Path,
    options: &IndexingOptions,
) -> Result<IndexingReport, StoreError>
where
    S: ChunkStore,
    M: CompletionModel,
{
    let files: Vec<PathBuf> = discover_documents(folder, extractors);
    if files.is_empty() {
        warn!(folder = %folder.display(), "no supported documents found");
    }
    index_documents(store, tagger, extractors, &files, options).await
}

fn prepare_document(
    path: &Path,
    extractors: &ExtractorSet,
    options: &IndexingOptions,
) -> Result<(String, String), IngestError> {
    let source = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| IngestError::MissingFileName(path.display().to_string()))?
        .to_string();

    let raw = extractors.extract(path)?;
    let text = match (options.normalize_text, options.chunking.strategy) {
        (false, _) => raw,
        (true, ChunkingStrategy::FixedWindow) => normalize_text(&raw),
        (true, ChunkingStrategy::Paragraph) => normalize_paragraphs(&raw),
    };
    Ok((source, text))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunking::ChunkingConfig;
    use crate::error::LlmError;
    use crate::stores::InMemoryChunkStore;
    use async_trait::async_trait;
    use std::fs;
    use tempfile::tempdir;

    struct DocumentModel {
        answer: Option<&'static str>,
    }

    #[async_trait]
    impl CompletionModel for DocumentModel {
        async fn complete(&self, _prompt: &str) -> Result<String, LlmError> {
            self.answer
                .map(str::to_string)
                .ok_or(LlmError::EmptyCompletion)
        }
    }

    fn tagger(answer: Option<&'static str>) -> TagExtractor<DocumentModel> {
        TagExtractor::new(DocumentModel { answer })
    }

    #[tokio::test]
    async fn single_document_yields_positioned_chunks() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("cctp.txt");
        fs::write(&path, "abcdefghij".repeat(240))?;

        let mut store = InMemoryChunkStore::new();
        let options = IndexingOptions::default();
        let report = index_documents(
            &mut store,
            &tagger(Some("PEM GÈZE")),
            &ExtractorSet::default(),
            &[&path],
            &options,
        )
        .await?;

        assert_eq!(report.total_chunks, 3);
        assert_eq!(report.documents[0].tags, vec!["PEM", "GEZE"]);

        let stored = store.get_all(&options.collection).await?;
        let positions: Vec<u32> = stored.iter().map(|c| c.metadata.chunk_position).collect();
        let pages: Vec<u32> = stored.iter().map(|c| c.metadata.page).collect();
        let ids: Vec<&str> = stored.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(positions, vec![0, 1, 2]);
        assert_eq!(pages, vec![0, 0, 1]);
        assert_eq!(ids, vec!["cctp.txt_0", "cctp.txt_1", "cctp.txt_2"]);
        assert!(stored.iter().all(|c| c.metadata.tags == "PEM;GEZE"));
        assert!(stored.iter().all(|c| c.metadata.source == "cctp.txt"));
        assert_eq!(stored[2].text.len(), 700);
        Ok(())
    }

    #[tokio::test]
    async fn bad_inputs_are_skipped_not_fatal() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let good = dir.path().join("memo.md");
        let unsupported = dir.path().join("prix.xlsx");
        let broken = dir.path().join("rc.pdf");
        fs::write(&good, "Mémoire technique.\n\nCapteurs.")?;
        fs::write(&unsupported, b"sheet")?;
        fs::write(&broken, b"%PDF-1.4\n%broken")?;
        let missing = dir.path().join("absent.docx");

        let mut store = InMemoryChunkStore::new();
        let report = index_documents(
            &mut store,
            &tagger(Some("MEMO")),
            &ExtractorSet::default(),
            &[&missing, &unsupported, &broken, &good],
            &IndexingOptions::default(),
        )
        .await?;

        assert_eq!(report.skipped_files.len(), 3);
        assert_eq!(report.documents.len(), 1);
        assert_eq!(report.total_chunks, 1);

        let stored = store.get_all(&report.collection).await?;
        assert_eq!(stored[0].text, "Memoire technique. Capteurs.");
        Ok(())
    }

    #[tokio::test]
    async fn model_failure_indexes_untagged_chunks() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("ccap.txt");
        fs::write(&path, "Pénalités de retard.")?;

        let mut store = InMemoryChunkStore::new();
        let report = index_documents(
            &mut store,
            &tagger(None),
            &ExtractorSet::default(),
            &[&path],
            &IndexingOptions::default(),
        )
        .await?;

        assert_eq!(report.total_chunks, 1);
        let stored = store.get_all(&report.collection).await?;
        assert_eq!(stored[0].metadata.tags, "");
        Ok(())
    }

    #[tokio::test]
    async fn reindexing_replaces_the_whole_collection() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let first = dir.path().join("first.txt");
        let second = dir.path().join("second.txt");
        fs::write(&first, "Ancien marché.")?;
        fs::write(&second, "Nouveau dossier.")?;

        let mut store = InMemoryChunkStore::new();
        let options = IndexingOptions::default();
        let extractors = ExtractorSet::default();
        index_documents(&mut store, &tagger(Some("A1")), &extractors, &[&first], &options).await?;
        index_documents(&mut store, &tagger(Some("B2")), &extractors, &[&second], &options).await?;

        let stored = store.get_all(&options.collection).await?;
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].metadata.source, "second.txt");
        Ok(())
    }

    #[tokio::test]
    async fn paragraph_chunking_survives_normalization() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("memoire.txt");
        let text = (0..20)
            .map(|i| format!("Paragraphe {i} : capteurs de la gare de Gèze,\nligne {i}."))
            .collect::<Vec<_>>()
            .join("\n\n");
        fs::write(&path, text)?;

        let mut store = InMemoryChunkStore::new();
        let options = IndexingOptions {
            chunking: ChunkingConfig::paragraph(),
            ..IndexingOptions::default()
        };
        let report = index_documents(
            &mut store,
            &tagger(Some("GEZE")),
            &ExtractorSet::default(),
            &[&path],
            &options,
        )
        .await?;

        assert!(report.total_chunks > 1);
        let stored = store.get_all(&options.collection).await?;
        for chunk in &stored {
            assert!(chunk.text.chars().count() <= options.chunking.max_chars);
            assert!(chunk.text.is_ascii());
        }
        assert!(stored[0].text.starts_with("Paragraphe 0 : capteurs de la gare de Geze, ligne 0."));
        Ok(())
    }

    #[tokio::test]
    async fn repeated_file_names_are_skipped() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        fs::create_dir(dir.path().join("lot1"))?;
        fs::create_dir(dir.path().join("lot2"))?;
        let first = dir.path().join("lot1").join("cctp.txt");
        let second = dir.path().join("lot2").join("cctp.txt");
        fs::write(&first, "Lot un.")?;
        fs::write(&second, "Lot deux.")?;

        let mut store = InMemoryChunkStore::new();
        let report = index_documents(
            &mut store,
            &tagger(Some("LOT1")),
            &ExtractorSet::default(),
            &[&first, &second],
            &IndexingOptions::default(),
        )
        .await?;

        assert_eq!(report.total_chunks, 1);
        assert_eq!(report.documents.len(), 1);
        assert_eq!(report.skipped_files.len(), 1);
        assert_eq!(report.skipped_files[0].path, second);

        let stored = store.get_all(&report.collection).await?;
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].text, "Lot un.");
        Ok(())
    }

    #[tokio::test]
    async fn folder_indexing_discovers_documents() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        fs::write(dir.path().join("a.txt"), "Lot unique.")?;
        fs::write(dir.path().join("b.md"), "Planning.")?;

        let mut store = InMemoryChunkStore::new();
        let report = index_folder(
            &mut store,
            &tagger(Some("X9")),
            &ExtractorSet::default(),
            dir.path(),
            &IndexingOptions::default(),
        )
        .await?;

        assert_eq!(report.documents.len(), 2);
        assert_eq!(report.total_chunks, 2);
        Ok(())
    }
}

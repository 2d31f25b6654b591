use chrono::Utc;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tenderdoc_core::{
    discover_documents, index_documents, Answer, AnswerSynthesizer, ChatCompletionClient,
    ChatCompletionConfig, ExtractorSet, HybridRetriever, IndexingOptions, QdrantChunkStore,
    RetrievalOptions, TagExtractor, DEFAULT_COLLECTION, DEFAULT_TOP_K,
};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "tenderdoc", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Qdrant base URL
    #[arg(long, env = "TENDERDOC_QDRANT_URL", default_value = "http://localhost:6333")]
    qdrant_url: String,

    /// Collection holding the chunk records
    #[arg(long, env = "TENDERDOC_COLLECTION", default_value = DEFAULT_COLLECTION)]
    collection: String,

    /// OpenAI-compatible chat completions endpoint
    #[arg(
        long,
        env = "TENDERDOC_LLM_ENDPOINT",
        default_value = tenderdoc_core::llm::DEFAULT_CHAT_ENDPOINT
    )]
    llm_endpoint: String,

    /// Chat model used for tags and answers
    #[arg(
        long,
        env = "TENDERDOC_LLM_MODEL",
        default_value = tenderdoc_core::llm::DEFAULT_CHAT_MODEL
    )]
    llm_model: String,

    /// API key for the chat endpoint
    #[arg(long, env = "MISTRAL_API_KEY", hide_env_values = true)]
    api_key: Option<String>,
}

#[derive(Subcommand)]
enum Command {
    /// Rebuild the collection from the given documents.
    Index {
        /// Documents to index (pdf, docx, txt, md).
        paths: Vec<PathBuf>,
        /// Also index every supported document under this folder.
        #[arg(long)]
        folder: Option<PathBuf>,
    },
    /// Print the chunks retrieved for a question.
    Search {
        query: String,
        #[arg(long, default_value_t = DEFAULT_TOP_K)]
        top_k: usize,
        /// Print the extracted tags and the retrieval branch.
        #[arg(long, default_value_t = false)]
        explain: bool,
    },
    /// Answer a question from the indexed documents.
    Ask {
        query: String,
        #[arg(long, default_value_t = DEFAULT_TOP_K)]
        top_k: usize,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();
    info!(
        version = env!("CARGO_PKG_VERSION"),
        started_at = %Utc::now().to_rfc3339(),
        "tenderdoc boot"
    );

    if cli.api_key.is_none() {
        warn!("MISTRAL_API_KEY is not set, model calls will fail");
    }
    let model = ChatCompletionClient::new(ChatCompletionConfig {
        endpoint: cli.llm_endpoint.clone(),
        api_key: cli.api_key.clone(),
        model: cli.llm_model.clone(),
    })?;
    let tagger = TagExtractor::new(model.clone());
    let mut store = QdrantChunkStore::new(&cli.qdrant_url);

    match cli.command {
        Command::Index { mut paths, folder } => {
            let extractors = ExtractorSet::default();
            if let Some(folder) = &folder {
                paths.extend(discover_documents(folder, &extractors));
            }
            if paths.is_empty() {
                anyhow::bail!("nothing to index: pass document paths or --folder");
            }

            let options = IndexingOptions {
                collection: cli.collection,
                ..IndexingOptions::default()
            };
            let report = index_documents(&mut store, &tagger, &extractors, &paths, &options).await?;

            for document in &report.documents {
                println!(
                    "{} chunks={} tags={}",
                    document.source,
                    document.chunk_count,
                    document.tags.join(";")
                );
            }
            for skipped in &report.skipped_files {
                println!("skipped {}: {}", skipped.path.display(), skipped.reason);
            }
            println!(
                "{} chunks indexed into {} at {}",
                report.total_chunks,
                report.collection,
                report.indexed_at.to_rfc3339()
            );
        }
        Command::Search {
            query,
            top_k,
            explain,
        } => {
            let options = RetrievalOptions {
                collection: cli.collection,
                top_k,
            };
            let result = HybridRetriever::with_options(&store, &tagger, options)
                .retrieve(&query)
                .await?;

            if explain {
                println!("tags: {}", result.tags.join(", "));
                println!("branch: {:?}", result.branch);
            }
            if result.is_empty() {
                println!("no relevant chunk found");
            }
            for (rank, hit) in result.hits.iter().enumerate() {
                println!(
                    "TOP {} | score={:.4} | source={} | page={}",
                    rank + 1,
                    hit.score,
                    hit.source,
                    hit.page
                );
                println!("{}\n", hit.text);
            }
        }
        Command::Ask { query, top_k } => {
            let options = RetrievalOptions {
                collection: cli.collection,
                top_k,
            };
            let retriever = HybridRetriever::with_options(&store, &tagger, options);
            let answer = AnswerSynthesizer::new(retriever, &model).answer(&query).await?;

            println!("{}", answer.text());
            if let Answer::Generated { hits, .. } = &answer {
                println!();
                for hit in hits {
                    println!("source: {} (page {}, score {:.4})", hit.source, hit.page, hit.score);
                }
            }
        }
    }

    Ok(())
}

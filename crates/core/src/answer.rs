use crate::error::AnswerError;
use crate::llm::CompletionModel;
use crate::retrieval::HybridRetriever;
use crate::traits::ChunkStore;
use crate::{RetrievalHit, RetrievalResult};
use tracing::info;

pub const NO_RELEVANT_CONTENT: &str = "No relevant document was found for this question.";

#[derive(Debug, Clone)]
pub enum Answer {
    /// Retrieval came back empty; the model was not called.
    NoRelevantContent,
    Generated {
        text: String,
        hits: Vec<RetrievalHit>,
    },
}

impl Answer {
    pub fn text(&self) -> &str {
        match self {
            Answer::NoRelevantContent => NO_RELEVANT_CONTENT,
            Answer::Generated { text, .. } => text,
        }
    }

    pub fn hits(&self) -> &[RetrievalHit] {
        match self {
            Answer::NoRelevantContent => &[],
            Answer::Generated { hits, .. } => hits,
        }
    }
}

/// Builds the grounded prompt sent for the final answer. Every extract is
/// labelled with its document and estimated page so the model can cite them.
pub fn answer_prompt(query: &str, hits: &[RetrievalHit]) -> String {
    let documents = hits
        .iter()
        .map(|hit| format!("[{}, page {}]\n{}", hit.source, hit.page, hit.text))
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        "You are a technical expert assistant for the field of the user's question.\n\
         Instructions:\n\
         1. Rely ONLY on the documents provided below.\n\
         2. Write your answer in 2 paragraphs: [Tender context] / [Factual technical answer + \
         quoted extracts].\n\
         3. Cite your sources (e.g. \"According to the document titled \"TITLE\", page Y, the \
         extract (\"...\") states that...\").\n\n\
         Documents:\n{documents}\n\n\
         Question: {query}\n"
    )
}

/// Runs retrieval, then asks the model for an answer grounded in the hits.
pub struct AnswerSynthesizer<'a, S, M, A> {
    retriever: HybridRetriever<'a, S, M>,
    model: &'a A,
}

impl<'a, S, M, A> AnswerSynthesizer<'a, S, M, A>
where
    S: ChunkStore,
    M: CompletionModel,
    A: CompletionModel,
{
    pub fn new(retriever: HybridRetriever<'a, S, M>, model: &'a A) -> Self {
        Self { retriever, model }
    }

    pub async fn answer(&self, query: &str) -> Result<Answer, AnswerError> {
        let retrieval = self.retriever.retrieve(query).await?;
        self.synthesize(retrieval).await
    }

    pub async fn synthesize(&self, retrieval: RetrievalResult) -> Result<Answer, AnswerError> {
        if retrieval.is_empty() {
            info!(query = %retrieval.query, "no relevant content, skipping synthesis");
            return Ok(Answer::NoRelevantContent);
        }

        let prompt = answer_prompt(&retrieval.query, &retrieval.hits);
        let text = self.model.complete(&prompt).await?;
        info!(hits = retrieval.hits.len(), chars = text.len(), "answer generated");

        Ok(Answer::Generated {
            text,
            hits: retrieval.hits,
        })
    }
}

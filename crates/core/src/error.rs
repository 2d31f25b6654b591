use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("pdf parse error: {0}")]
    PdfParse(String),

    #[error("docx read error: {0}")]
    Docx(String),

    #[error("regex error: {0}")]
    RegexError(#[from] regex::Error),

    #[error("file not found: {0}")]
    MissingFile(String),

    #[error("unsupported document format: {0}")]
    UnsupportedFormat(String),

    #[error("path has no file name: {0}")]
    MissingFileName(String),

    #[error("document had no readable text: {0}")]
    EmptyDocument(String),

    #[error("another document with the same file name was already indexed: {0}")]
    DuplicateFileName(String),
}

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("invalid response from {endpoint}: {details}")]
    BackendResponse { endpoint: String, details: String },

    #[error("model returned an empty completion")]
    EmptyCompletion,

    #[error("missing configuration: {0}")]
    MissingConfig(String),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid response from {backend}: {details}")]
    BackendResponse { backend: String, details: String },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("collection does not exist: {0}")]
    MissingCollection(String),

    #[error("embedding dimension {actual} does not match collection dimension {expected}")]
    DimensionMismatch { expected: usize, actual: usize },
}

#[derive(Debug, Error)]
pub enum AnswerError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Llm(#[from] LlmError),
}

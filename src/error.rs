//! Error kinds surfaced by the question-answering path.
//!
//! Each processing stage returns one of these so the chat loop can decide per
//! kind whether to reprompt or end the session.

use thiserror::Error;

/// Rejected user input. Always recoverable.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Input was blank.
    #[error("please type a question")]
    Empty,
    /// Input reached the word limit.
    #[error("your question must be less than {limit} words (got {words})")]
    TooLong {
        /// Whitespace-separated words in the input.
        words: usize,
        /// Exclusive upper bound on accepted words.
        limit: usize,
    },
}

/// Failure while looking up chunks in the vector store.
#[derive(Debug, Error)]
pub enum RetrievalError {
    /// Query failed inside Postgres.
    #[error("postgres query failed: {0}")]
    Postgres(#[from] tokio_postgres::Error),
    /// The connection to Postgres is gone; nothing else will succeed.
    #[error("database connection closed")]
    ConnectionClosed,
    /// Store holds no chunks to answer from.
    #[error("no chunks stored; run the loader first")]
    NoChunks,
    /// Query vector width differs from the table's vector width.
    #[error("query embedding has {actual} dimensions, table expects {expected}")]
    DimensionMismatch {
        /// Declared table width.
        expected: usize,
        /// Width of the offending vector.
        actual: usize,
    },
}

impl RetrievalError {
    /// Wraps a Postgres error, folding closed connections into their own kind.
    pub fn from_postgres(err: tokio_postgres::Error) -> Self {
        if err.is_closed() {
            Self::ConnectionClosed
        } else {
            Self::Postgres(err)
        }
    }
}

/// Model download, load, or inference failure.
#[derive(Debug, Error)]
pub enum ModelError {
    /// Fetching model files from the hub failed.
    #[error("model download failed: {0}")]
    Download(String),
    /// ONNX session or tokenizer could not be built.
    #[error("model load failed: {0}")]
    Load(String),
    /// Tokenizer rejected the input.
    #[error("tokenization failed: {0}")]
    Tokenize(String),
    /// The ONNX graph failed or produced unexpected output.
    #[error("inference failed: {0}")]
    Inference(String),
}

/// Tagged failure of a single question/answer turn.
#[derive(Debug, Error)]
pub enum TurnError {
    /// Input rejected before any model or store call.
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// Vector lookup failed.
    #[error(transparent)]
    Retrieval(#[from] RetrievalError),
    /// Embedding or answering failed.
    #[error(transparent)]
    Model(#[from] ModelError),
}

impl TurnError {
    /// Whether the session should end instead of reprompting.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Retrieval(RetrievalError::ConnectionClosed))
    }
}

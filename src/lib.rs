#![warn(missing_docs)]
//! Retrieval-augmented extractive question answering over Wikipedia chunks.
//!
//! Ingestion: [`DatasetFetcher`] → [`DocumentReader`] → [`Chunker`] →
//! [`Embedder`] → [`PgVectorStore`]. Querying: [`ChatSession`] embeds a
//! question, pulls the nearest chunk and runs an [`Answerer`] over it.

pub mod answerer;
pub mod chunker;
pub mod controls;
pub mod dataset;
pub mod embedder;
pub mod embeddings;
pub mod error;
pub mod fetcher;
pub mod loader;
pub mod models;
pub mod session;
pub mod vector_store;

pub use answerer::{capitalize, Answer, AnswerConfig, Answerer};
pub use chunker::{Chunk, ChunkError, Chunker, ChunkerConfig};
pub use dataset::{DatasetError, Document, DocumentReader};
pub use embedder::Embedder;
pub use embeddings::{ChunkRecord, StoredChunk};
pub use error::{ModelError, RetrievalError, TurnError, ValidationError};
pub use fetcher::{DatasetFetcher, FetchError, FetchLimits, FetchReport};
pub use loader::{LoadError, LoadLimits, LoadReport, Loader};
pub use models::ModelSpec;
pub use session::{answer_question, ChatSession, QaContext, SessionState, SessionSummary};
pub use vector_store::{
    ChunkRetriever, ChunkSink, PgVectorStore, StoreError, TableName, EMBEDDING_DIMENSIONS,
};

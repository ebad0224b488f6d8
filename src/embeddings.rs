//! Shared chunk records passed between ingestion and retrieval.

use crate::chunker::Chunk;

/// Embedded chunk ready for insertion into the vector store.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkRecord {
    /// Source document title.
    pub title: String,
    /// Source document URL.
    pub url: String,
    /// Chunk text.
    pub content: String,
    /// Word count of `content`.
    pub token_count: usize,
    /// Unit-length embedding of `content`.
    pub embedding: Vec<f32>,
}

impl ChunkRecord {
    /// Attaches an embedding to a chunk.
    pub fn new(chunk: Chunk, embedding: Vec<f32>) -> Self {
        Self {
            title: chunk.title,
            url: chunk.url,
            content: chunk.content,
            token_count: chunk.token_count,
            embedding,
        }
    }
}

/// Chunk row read back from the store for a query.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredChunk {
    /// Row identifier.
    pub id: i64,
    /// Source document title.
    pub title: String,
    /// Source document URL.
    pub url: String,
    /// Chunk text.
    pub content: String,
    /// Word count of `content`.
    pub token_count: usize,
    /// Cosine distance to the query vector.
    pub distance: f64,
}

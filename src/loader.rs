//! Bulk ingestion: dataset shards → chunks → embeddings → vector store.

use std::path::Path;

use thiserror::Error;
use tracing::{debug, info};

use crate::chunker::Chunker;
use crate::dataset::{parquet_files, DatasetError, Document, DocumentReader};
use crate::embedder::Embedder;
use crate::embeddings::ChunkRecord;
use crate::error::ModelError;
use crate::vector_store::{ChunkSink, StoreError};

/// Per-file bounds applied during ingestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadLimits {
    /// Rows read from each shard; `None` reads the whole file.
    pub max_rows_per_file: Option<usize>,
}

impl Default for LoadLimits {
    fn default() -> Self {
        Self {
            max_rows_per_file: Some(10),
        }
    }
}

/// Errors that abort ingestion.
#[derive(Debug, Error)]
pub enum LoadError {
    /// Shard could not be listed or decoded.
    #[error(transparent)]
    Dataset(#[from] DatasetError),
    /// Embedding a chunk failed.
    #[error(transparent)]
    Model(#[from] ModelError),
    /// Writing to the store failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Totals accumulated over an ingestion run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadReport {
    /// Shards processed.
    pub files: usize,
    /// Documents read.
    pub documents: usize,
    /// Chunk rows written.
    pub chunks: usize,
}

impl LoadReport {
    fn absorb(&mut self, other: LoadReport) {
        self.files += other.files;
        self.documents += other.documents;
        self.chunks += other.chunks;
    }
}

/// Chunks, embeds and stores documents.
pub struct Loader<'a> {
    chunker: &'a Chunker,
    embedder: &'a dyn Embedder,
    limits: LoadLimits,
}

impl<'a> Loader<'a> {
    /// Builds a loader around a chunker and embedder.
    pub fn new(chunker: &'a Chunker, embedder: &'a dyn Embedder, limits: LoadLimits) -> Self {
        Self {
            chunker,
            embedder,
            limits,
        }
    }

    /// Ingests every `*.parquet` file in `dir`, committing once per file.
    pub async fn load_dir<S>(&self, dir: &Path, sink: &mut S) -> Result<LoadReport, LoadError>
    where
        S: ChunkSink + ?Sized,
    {
        let mut report = LoadReport::default();
        for path in parquet_files(dir)? {
            report.absorb(self.load_file(&path, sink).await?);
        }
        Ok(report)
    }

    /// Ingests one shard and commits it.
    pub async fn load_file<S>(&self, path: &Path, sink: &mut S) -> Result<LoadReport, LoadError>
    where
        S: ChunkSink + ?Sized,
    {
        info!(path = %path.display(), max_rows = ?self.limits.max_rows_per_file, "loading shard");
        let reader = DocumentReader::open(path, self.limits.max_rows_per_file)?;
        let mut report = self.load_documents(reader, sink).await?;
        report.files = 1;
        Ok(report)
    }

    /// Ingests documents from any source as one unit of work.
    pub async fn load_documents<I, S>(
        &self,
        documents: I,
        sink: &mut S,
    ) -> Result<LoadReport, LoadError>
    where
        I: IntoIterator<Item = Result<Document, DatasetError>>,
        S: ChunkSink + ?Sized,
    {
        let mut report = LoadReport::default();
        for document in documents {
            let document = document?;
            report.documents += 1;
            info!(title = %document.title, "processing document");
            let records = self.embed_document(&document)?;
            if records.is_empty() {
                debug!(title = %document.title, "document too short to chunk");
                continue;
            }
            sink.write_batch(&records).await?;
            report.chunks += records.len();
        }
        sink.commit().await?;
        Ok(report)
    }

    fn embed_document(&self, document: &Document) -> Result<Vec<ChunkRecord>, ModelError> {
        let chunks = self.chunker.chunk(document);
        if chunks.is_empty() {
            return Ok(Vec::new());
        }
        let texts: Vec<&str> = chunks.iter().map(|chunk| chunk.content.as_str()).collect();
        let vectors = self.embedder.embed_batch(&texts)?;
        if vectors.len() != chunks.len() {
            return Err(ModelError::Inference(format!(
                "embedder returned {} vectors for {} chunks",
                vectors.len(),
                chunks.len()
            )));
        }
        Ok(chunks
            .into_iter()
            .zip(vectors)
            .map(|(chunk, vector)| ChunkRecord::new(chunk, vector))
            .collect())
    }
}

//! Fixed-size, overlapping word windows over document text.

use std::fmt;

use crate::dataset::Document;

/// Window geometry used when splitting documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkerConfig {
    /// Maximum words per chunk.
    pub window_words: usize,
    /// Words shared between consecutive chunks.
    pub overlap_words: usize,
    /// Window starts stop this many words before the end of the text.
    pub tail_margin: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            window_words: 512,
            overlap_words: 32,
            tail_margin: 5,
        }
    }
}

/// Errors surfaced while configuring a chunker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkError {
    /// Window is empty or the overlap swallows it.
    InvalidWindow {
        /// Configured window size.
        window_words: usize,
        /// Configured overlap.
        overlap_words: usize,
    },
}

impl fmt::Display for ChunkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidWindow {
                window_words,
                overlap_words,
            } => write!(
                f,
                "chunk overlap ({overlap_words}) must be smaller than a non-empty window ({window_words})"
            ),
        }
    }
}

impl std::error::Error for ChunkError {}

/// One word window tagged with its source document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Source document title.
    pub title: String,
    /// Source document URL.
    pub url: String,
    /// Window words joined by single spaces.
    pub content: String,
    /// Number of words in `content`.
    pub token_count: usize,
}

/// Splits documents into overlapping word windows.
#[derive(Debug, Clone)]
pub struct Chunker {
    config: ChunkerConfig,
}

impl Chunker {
    /// Builds a chunker, validating the window geometry.
    pub fn new(config: ChunkerConfig) -> Result<Self, ChunkError> {
        if config.window_words == 0 || config.overlap_words >= config.window_words {
            return Err(ChunkError::InvalidWindow {
                window_words: config.window_words,
                overlap_words: config.overlap_words,
            });
        }
        Ok(Self { config })
    }

    /// Active configuration.
    pub fn config(&self) -> &ChunkerConfig {
        &self.config
    }

    fn step(&self) -> usize {
        self.config.window_words - self.config.overlap_words
    }

    /// Splits raw text into window strings.
    pub fn windows(&self, text: &str) -> Vec<(String, usize)> {
        let words: Vec<&str> = text.split_whitespace().collect();
        let last_start = words.len().saturating_sub(self.config.tail_margin);
        (0..last_start)
            .step_by(self.step())
            .map(|start| {
                let end = (start + self.config.window_words).min(words.len());
                let window = &words[start..end];
                (window.join(" "), window.len())
            })
            .collect()
    }

    /// Splits a document into chunks carrying its title and URL.
    pub fn chunk(&self, document: &Document) -> Vec<Chunk> {
        self.windows(&document.text)
            .into_iter()
            .map(|(content, token_count)| Chunk {
                title: document.title.clone(),
                url: document.url.clone(),
                content,
                token_count,
            })
            .collect()
    }
}

impl Default for Chunker {
    fn default() -> Self {
        Self {
            config: ChunkerConfig::default(),
        }
    }
}

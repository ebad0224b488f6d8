#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use wikiqa::embedder::{cosine_distance, l2_normalize};
use wikiqa::{
    Answer, Answerer, ChunkRecord, ChunkRetriever, ChunkSink, Embedder, ModelError,
    RetrievalError, StoreError, StoredChunk,
};

pub const DIMS: usize = 32;

/// Hashes lowercase words into a fixed number of buckets.
#[derive(Default)]
pub struct BagOfWordsEmbedder {
    calls: AtomicUsize,
}

impl BagOfWordsEmbedder {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Embedder for BagOfWordsEmbedder {
    fn dimensions(&self) -> usize {
        DIMS
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, ModelError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(texts
            .iter()
            .map(|text| {
                let mut v = vec![0.0f32; DIMS];
                for word in words(text) {
                    let bucket = word
                        .bytes()
                        .fold(7usize, |h, b| h.wrapping_mul(31).wrapping_add(b as usize));
                    v[bucket % DIMS] += 1.0;
                }
                l2_normalize(&mut v);
                v
            })
            .collect())
    }
}

/// Vector table kept in memory, searched by brute force.
#[derive(Default)]
pub struct MemoryStore {
    pending: Vec<ChunkRecord>,
    rows: Vec<ChunkRecord>,
    commits: usize,
    lookups: AtomicUsize,
    pub closed: bool,
}

impl MemoryStore {
    pub fn rows(&self) -> &[ChunkRecord] {
        &self.rows
    }

    pub fn commits(&self) -> usize {
        self.commits
    }

    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChunkSink for MemoryStore {
    async fn write_batch(&mut self, records: &[ChunkRecord]) -> Result<u64, StoreError> {
        if let Some(bad) = records.iter().find(|r| r.embedding.len() != DIMS) {
            return Err(StoreError::DimensionMismatch {
                expected: DIMS,
                actual: bad.embedding.len(),
            });
        }
        self.pending.extend_from_slice(records);
        Ok(records.len() as u64)
    }

    async fn commit(&mut self) -> Result<(), StoreError> {
        self.rows.append(&mut self.pending);
        self.commits += 1;
        Ok(())
    }
}

#[async_trait]
impl ChunkRetriever for MemoryStore {
    async fn nearest(
        &self,
        query: &[f32],
        limit: usize,
    ) -> Result<Vec<StoredChunk>, RetrievalError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        if self.closed {
            return Err(RetrievalError::ConnectionClosed);
        }
        if query.len() != DIMS {
            return Err(RetrievalError::DimensionMismatch {
                expected: DIMS,
                actual: query.len(),
            });
        }
        let mut scored: Vec<StoredChunk> = self
            .rows
            .iter()
            .enumerate()
            .map(|(idx, row)| StoredChunk {
                id: idx as i64 + 1,
                title: row.title.clone(),
                url: row.url.clone(),
                content: row.content.clone(),
                token_count: row.token_count,
                distance: cosine_distance(&row.embedding, query),
            })
            .collect();
        scored.sort_by(|a, b| a.distance.total_cmp(&b.distance).then(a.id.cmp(&b.id)));
        scored.truncate(limit);
        Ok(scored)
    }
}

/// Returns the words of the best-overlapping context sentence that the
/// question does not already contain.
#[derive(Default)]
pub struct OverlapAnswerer {
    calls: AtomicUsize,
}

impl OverlapAnswerer {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Answerer for OverlapAnswerer {
    fn answer(&self, question: &str, context: &str) -> Result<Answer, ModelError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let asked: HashSet<String> = words(question).collect();
        let best = context
            .split('.')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .max_by_key(|sentence| words(sentence).filter(|w| asked.contains(w)).count());
        let Some(sentence) = best else {
            return Ok(Answer::empty());
        };
        let text = sentence
            .split_whitespace()
            .filter(|w| !asked.contains(&normalize(w)))
            .collect::<Vec<_>>()
            .join(" ");
        let start = context.find(text.as_str()).unwrap_or(0);
        Ok(Answer {
            end: start + text.len(),
            start,
            score: 1.0,
            text,
        })
    }
}

/// Answerer whose model always fails.
pub struct BrokenAnswerer;

impl Answerer for BrokenAnswerer {
    fn answer(&self, _question: &str, _context: &str) -> Result<Answer, ModelError> {
        Err(ModelError::Inference("session poisoned".into()))
    }
}

pub fn words(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split_whitespace().map(normalize).filter(|w| !w.is_empty())
}

fn normalize(word: &str) -> String {
    word.trim_matches(|c: char| !c.is_alphanumeric())
        .to_lowercase()
}

pub fn record(embedder: &BagOfWordsEmbedder, title: &str, content: &str) -> ChunkRecord {
    ChunkRecord {
        title: title.to_string(),
        url: format!("https://en.wikipedia.org/wiki/{}", title.replace(' ', "_")),
        content: content.to_string(),
        token_count: content.split_whitespace().count(),
        embedding: embedder.embed(content).expect("embed"),
    }
}

//! Text embedding: the model-agnostic trait plus pooling and normalization helpers.

pub mod onnx;

use crate::error::ModelError;

/// Maps text to unit-length vectors of a fixed width.
///
/// Chunks and queries must go through the same implementation so their
/// distances are comparable.
pub trait Embedder: Send + Sync {
    /// Output vector width.
    fn dimensions(&self) -> usize;

    /// Embeds a batch of texts, preserving input order.
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, ModelError>;

    /// Embeds a single text.
    fn embed(&self, text: &str) -> Result<Vec<f32>, ModelError> {
        self.embed_batch(&[text])?
            .pop()
            .ok_or_else(|| ModelError::Inference("embedder returned no vectors".into()))
    }
}

/// Euclidean length of `v`.
pub fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Scales `v` to unit length in place. Zero vectors stay zero.
pub fn l2_normalize(v: &mut [f32]) {
    let norm = l2_norm(v);
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

/// Averages token states of one sequence, counting only unmasked positions.
///
/// `hidden` is `[seq_len, hidden_dim]` row-major.
pub fn mean_pool(hidden: &[f32], mask: &[i64], hidden_dim: usize) -> Vec<f32> {
    let mut pooled = vec![0.0f32; hidden_dim];
    let mut counted = 0usize;
    for (token, &m) in hidden.chunks_exact(hidden_dim).zip(mask) {
        if m == 0 {
            continue;
        }
        counted += 1;
        for (acc, value) in pooled.iter_mut().zip(token) {
            *acc += value;
        }
    }
    if counted > 0 {
        let denom = counted as f32;
        for value in pooled.iter_mut() {
            *value /= denom;
        }
    }
    pooled
}

/// Cosine distance between two vectors (`1 - cos θ`), matching pgvector's `<=>`.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f64 {
    let dot: f64 = a.iter().zip(b).map(|(x, y)| f64::from(*x) * f64::from(*y)).sum();
    let norm_a = f64::from(l2_norm(a));
    let norm_b = f64::from(l2_norm(b));
    if norm_a == 0.0 || norm_b == 0.0 {
        return 1.0;
    }
    1.0 - dot / (norm_a * norm_b)
}

//! Extractive question answering: span selection shared by every QA backend.

pub mod onnx;

use crate::error::ModelError;

/// Limits applied when extracting an answer span.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnswerConfig {
    /// Longest answer span, in tokens.
    pub max_answer_len: usize,
    /// Longest question + context sequence fed to the model, in tokens.
    pub max_seq_len: usize,
    /// Tokens shared between consecutive context windows when the context overflows.
    pub doc_stride: usize,
}

impl Default for AnswerConfig {
    fn default() -> Self {
        Self {
            max_answer_len: 128,
            max_seq_len: 512,
            doc_stride: 128,
        }
    }
}

/// Literal span of the context picked as the answer.
#[derive(Debug, Clone, PartialEq)]
pub struct Answer {
    /// Span text, exactly as it appears in the context.
    pub text: String,
    /// Product of the start and end probabilities.
    pub score: f32,
    /// Byte offset of the span start in the context.
    pub start: usize,
    /// Byte offset one past the span end in the context.
    pub end: usize,
}

impl Answer {
    /// Empty answer returned when there is nothing to extract from.
    pub fn empty() -> Self {
        Self {
            text: String::new(),
            score: 0.0,
            start: 0,
            end: 0,
        }
    }
}

/// Picks an answer span for `question` out of `context`.
pub trait Answerer: Send + Sync {
    /// Extracts the most likely span. Low-confidence spans are returned as-is.
    fn answer(&self, question: &str, context: &str) -> Result<Answer, ModelError>;
}

/// Uppercases the first character and lowercases the rest.
pub fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    let Some(first) = chars.next() else {
        return String::new();
    };
    let mut out: String = first.to_uppercase().collect();
    out.push_str(&chars.as_str().to_lowercase());
    out
}

/// Token span chosen from one window of logits.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpanScore {
    /// First token of the span.
    pub start: usize,
    /// Last token of the span (inclusive).
    pub end: usize,
    /// `p_start[start] * p_end[end]`.
    pub score: f32,
}

/// Softmax over the positions where `mask` is true; masked-out positions get zero.
pub fn masked_softmax(logits: &[f32], mask: &[bool]) -> Vec<f32> {
    let max = logits
        .iter()
        .zip(mask)
        .filter(|(_, &keep)| keep)
        .map(|(&l, _)| l)
        .fold(f32::NEG_INFINITY, f32::max);
    if max == f32::NEG_INFINITY {
        return vec![0.0; logits.len()];
    }
    let exps: Vec<f32> = logits
        .iter()
        .zip(mask)
        .map(|(&l, &keep)| if keep { (l - max).exp() } else { 0.0 })
        .collect();
    let total: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / total).collect()
}

/// Highest-scoring span with `start <= end`, both inside the context, at most `max_answer_len` tokens.
pub fn best_span(
    start_logits: &[f32],
    end_logits: &[f32],
    context: &[bool],
    max_answer_len: usize,
) -> Option<SpanScore> {
    let start_p = masked_softmax(start_logits, context);
    let end_p = masked_softmax(end_logits, context);
    let len = context.len().min(start_p.len()).min(end_p.len());
    let mut best: Option<SpanScore> = None;
    for start in (0..len).filter(|&i| context[i]) {
        let stop = (start + max_answer_len.max(1)).min(len);
        for end in (start..stop).filter(|&i| context[i]) {
            let score = start_p[start] * end_p[end];
            if best.is_none_or(|b| score > b.score) {
                best = Some(SpanScore { start, end, score });
            }
        }
    }
    best
}

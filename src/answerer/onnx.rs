//! Extractive QA with a SQuAD-tuned encoder running on ONNX Runtime.

use std::path::Path;

use ort::session::Session;
use ort::value::Tensor;
use parking_lot::Mutex;
use tokenizers::{Encoding, Tokenizer, TruncationParams, TruncationStrategy};
use tracing::debug;

use super::{best_span, Answer, AnswerConfig, Answerer};
use crate::error::ModelError;
use crate::models::{fetch_model_files, load_session, load_tokenizer, to_i64, ModelFiles, ModelSpec};

/// Question-answering model that emits `start_logits` / `end_logits` per token.
pub struct OnnxAnswerer {
    session: Mutex<Session>,
    tokenizer: Tokenizer,
    config: AnswerConfig,
}

impl OnnxAnswerer {
    /// Downloads (or reuses cached) files for `spec` and loads the model.
    pub fn load(
        spec: &ModelSpec,
        cache_dir: Option<&Path>,
        config: AnswerConfig,
    ) -> Result<Self, ModelError> {
        let files = fetch_model_files(spec, cache_dir)?;
        Self::from_files(&files, config)
    }

    /// Loads the model from local files.
    pub fn from_files(files: &ModelFiles, config: AnswerConfig) -> Result<Self, ModelError> {
        let mut tokenizer = load_tokenizer(&files.tokenizer)?;
        // Only the context is cut; overflow becomes extra windows.
        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length: config.max_seq_len,
                strategy: TruncationStrategy::OnlySecond,
                stride: config.doc_stride,
                ..Default::default()
            }))
            .map_err(|e| ModelError::Load(format!("tokenizer truncation: {e}")))?;
        let session = load_session(&files.model)?;
        Ok(Self {
            session: Mutex::new(session),
            tokenizer,
            config,
        })
    }

    fn score_window(
        &self,
        session: &mut Session,
        window: &Encoding,
        context: &str,
    ) -> Result<Option<Answer>, ModelError> {
        let len = window.get_ids().len();
        let shape = vec![1i64, len as i64];
        let ids_tensor = Tensor::from_array((shape.clone(), to_i64(window.get_ids())))
            .map_err(|e| ModelError::Inference(format!("input_ids tensor: {e}")))?;
        let mask_tensor = Tensor::from_array((shape, to_i64(window.get_attention_mask())))
            .map_err(|e| ModelError::Inference(format!("attention_mask tensor: {e}")))?;

        let outputs = session
            .run(ort::inputs![
                "input_ids" => ids_tensor,
                "attention_mask" => mask_tensor
            ])
            .map_err(|e| ModelError::Inference(format!("qa run: {e}")))?;
        let (_, start_logits) = outputs["start_logits"]
            .try_extract_tensor::<f32>()
            .map_err(|e| ModelError::Inference(format!("extract start_logits: {e}")))?;
        let (_, end_logits) = outputs["end_logits"]
            .try_extract_tensor::<f32>()
            .map_err(|e| ModelError::Inference(format!("extract end_logits: {e}")))?;
        if start_logits.len() != len || end_logits.len() != len {
            return Err(ModelError::Inference(format!(
                "expected {len} logits, got {} / {}",
                start_logits.len(),
                end_logits.len()
            )));
        }

        let in_context: Vec<bool> = window
            .get_sequence_ids()
            .iter()
            .map(|seq| *seq == Some(1))
            .collect();
        let Some(span) = best_span(
            start_logits,
            end_logits,
            &in_context,
            self.config.max_answer_len,
        ) else {
            return Ok(None);
        };

        let offsets = window.get_offsets();
        let start = offsets[span.start].0;
        let end = offsets[span.end].1;
        let text = context
            .get(start..end)
            .ok_or_else(|| {
                ModelError::Inference(format!("span {start}..{end} is outside the context"))
            })?
            .to_string();
        Ok(Some(Answer {
            text,
            score: span.score,
            start,
            end,
        }))
    }
}

impl Answerer for OnnxAnswerer {
    fn answer(&self, question: &str, context: &str) -> Result<Answer, ModelError> {
        if context.trim().is_empty() {
            return Ok(Answer::empty());
        }
        let encoding = self
            .tokenizer
            .encode((question, context), true)
            .map_err(|e| ModelError::Tokenize(e.to_string()))?;
        let windows: Vec<&Encoding> = std::iter::once(&encoding)
            .chain(encoding.get_overflowing())
            .collect();
        debug!(windows = windows.len(), "running qa model");

        let mut session = self.session.lock();
        let mut best: Option<Answer> = None;
        for window in windows {
            if let Some(candidate) = self.score_window(&mut session, window, context)? {
                if best.as_ref().is_none_or(|b| candidate.score > b.score) {
                    best = Some(candidate);
                }
            }
        }
        Ok(best.unwrap_or_else(Answer::empty))
    }
}

//! Sentence embeddings computed locally with ONNX Runtime.

use std::path::Path;

use ort::session::Session;
use ort::value::Tensor;
use parking_lot::Mutex;
use tokenizers::{Tokenizer, TruncationParams};
use tracing::debug;

use super::{l2_normalize, mean_pool, Embedder};
use crate::error::ModelError;
use crate::models::{fetch_model_files, load_session, load_tokenizer, to_i64, ModelFiles, ModelSpec};

/// Longest input the sentence-transformers model was trained on.
pub const MAX_SEQ_TOKENS: usize = 256;

/// Mean-pooled, L2-normalized sentence embeddings from a BERT-style ONNX graph.
pub struct OnnxEmbedder {
    session: Mutex<Session>,
    tokenizer: Tokenizer,
    dimensions: usize,
}

impl OnnxEmbedder {
    /// Downloads (or reuses cached) files for `spec` and loads the model.
    pub fn load(
        spec: &ModelSpec,
        cache_dir: Option<&Path>,
        dimensions: usize,
    ) -> Result<Self, ModelError> {
        let files = fetch_model_files(spec, cache_dir)?;
        Self::from_files(&files, dimensions)
    }

    /// Loads the model from local files.
    pub fn from_files(files: &ModelFiles, dimensions: usize) -> Result<Self, ModelError> {
        let mut tokenizer = load_tokenizer(&files.tokenizer)?;
        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length: MAX_SEQ_TOKENS,
                ..Default::default()
            }))
            .map_err(|e| ModelError::Load(format!("tokenizer truncation: {e}")))?;
        let session = load_session(&files.model)?;
        Ok(Self {
            session: Mutex::new(session),
            tokenizer,
            dimensions,
        })
    }
}

impl Embedder for OnnxEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, ModelError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let encodings = texts
            .iter()
            .map(|text| {
                self.tokenizer
                    .encode(*text, true)
                    .map_err(|e| ModelError::Tokenize(e.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let max_len = encodings
            .iter()
            .map(|enc| enc.get_ids().len())
            .max()
            .unwrap_or(0);
        if max_len == 0 {
            return Err(ModelError::Inference("empty tokenization".into()));
        }

        let batch = texts.len();
        let mut input_ids = vec![0i64; batch * max_len];
        let mut attention_mask = vec![0i64; batch * max_len];
        let mut token_type_ids = vec![0i64; batch * max_len];
        for (i, enc) in encodings.iter().enumerate() {
            let offset = i * max_len;
            let len = enc.get_ids().len();
            input_ids[offset..offset + len].copy_from_slice(&to_i64(enc.get_ids()));
            attention_mask[offset..offset + len]
                .copy_from_slice(&to_i64(enc.get_attention_mask()));
            token_type_ids[offset..offset + len].copy_from_slice(&to_i64(enc.get_type_ids()));
        }
        debug!(batch, max_len, "running embedding model");

        let shape = vec![batch as i64, max_len as i64];
        let ids_tensor = Tensor::from_array((shape.clone(), input_ids))
            .map_err(|e| ModelError::Inference(format!("input_ids tensor: {e}")))?;
        let mask_tensor = Tensor::from_array((shape.clone(), attention_mask.clone()))
            .map_err(|e| ModelError::Inference(format!("attention_mask tensor: {e}")))?;
        let type_tensor = Tensor::from_array((shape, token_type_ids))
            .map_err(|e| ModelError::Inference(format!("token_type_ids tensor: {e}")))?;

        let mut session = self.session.lock();
        let outputs = session
            .run(ort::inputs![
                "input_ids" => ids_tensor,
                "attention_mask" => mask_tensor,
                "token_type_ids" => type_tensor
            ])
            .map_err(|e| ModelError::Inference(format!("embedding run: {e}")))?;
        let (out_shape, hidden) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| ModelError::Inference(format!("extract hidden states: {e}")))?;

        // [batch, seq_len, hidden_dim]
        let dims: Vec<usize> = out_shape.iter().map(|&d| d as usize).collect();
        if dims.len() != 3 || dims[0] != batch || dims[1] != max_len {
            return Err(ModelError::Inference(format!(
                "unexpected hidden state shape {dims:?}"
            )));
        }
        let hidden_dim = dims[2];
        if hidden_dim != self.dimensions {
            return Err(ModelError::Inference(format!(
                "model emits {hidden_dim} dimensions, expected {}",
                self.dimensions
            )));
        }

        let per_item = max_len * hidden_dim;
        let vectors = (0..batch)
            .map(|i| {
                let states = &hidden[i * per_item..(i + 1) * per_item];
                let mask = &attention_mask[i * max_len..(i + 1) * max_len];
                let mut pooled = mean_pool(states, mask, hidden_dim);
                l2_normalize(&mut pooled);
                pooled
            })
            .collect();
        Ok(vectors)
    }
}

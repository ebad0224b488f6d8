//! Hugging Face hub downloads and ONNX Runtime session setup shared by the local models.

use std::path::{Path, PathBuf};

use ort::session::Session;
use tokenizers::Tokenizer;
use tracing::{debug, info};

use crate::error::ModelError;

/// Sentence-embedding model used for chunks and queries.
pub const DEFAULT_EMBEDDING_MODEL: &str = "sentence-transformers/all-MiniLM-L6-v2";
/// ONNX export of `distilbert-base-cased-distilled-squad`.
pub const DEFAULT_QA_MODEL: &str = "Xenova/distilbert-base-cased-distilled-squad";
/// Graph file inside each hub repository.
pub const DEFAULT_ONNX_FILE: &str = "onnx/model.onnx";

const TOKENIZER_FILE: &str = "tokenizer.json";

/// Hub repository plus the ONNX graph to pull from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSpec {
    /// Repository identifier, e.g. `sentence-transformers/all-MiniLM-L6-v2`.
    pub repo: String,
    /// Path of the ONNX graph inside the repository.
    pub onnx_file: String,
}

impl ModelSpec {
    /// Spec pointing at `repo`'s default ONNX export.
    pub fn new(repo: impl Into<String>) -> Self {
        Self {
            repo: repo.into(),
            onnx_file: DEFAULT_ONNX_FILE.to_string(),
        }
    }
}

/// Local paths of a downloaded model.
#[derive(Debug, Clone)]
pub struct ModelFiles {
    /// ONNX graph.
    pub model: PathBuf,
    /// `tokenizer.json`.
    pub tokenizer: PathBuf,
}

/// Downloads (or reuses cached) model files for `spec`.
pub fn fetch_model_files(spec: &ModelSpec, cache_dir: Option<&Path>) -> Result<ModelFiles, ModelError> {
    debug!(repo = %spec.repo, cache_dir = ?cache_dir, "resolving model files via hf-hub");
    let mut builder = hf_hub::api::sync::ApiBuilder::new();
    if let Some(dir) = cache_dir {
        builder = builder.with_cache_dir(dir.to_path_buf());
    }
    let api = builder
        .build()
        .map_err(|e| ModelError::Download(format!("hf-hub api: {e}")))?;
    let repo = api.model(spec.repo.clone());
    let model = repo
        .get(&spec.onnx_file)
        .map_err(|e| ModelError::Download(format!("{} ({}): {e}", spec.repo, spec.onnx_file)))?;
    let tokenizer = repo
        .get(TOKENIZER_FILE)
        .map_err(|e| ModelError::Download(format!("{} ({TOKENIZER_FILE}): {e}", spec.repo)))?;
    info!(repo = %spec.repo, model = %model.display(), "model files ready");
    Ok(ModelFiles { model, tokenizer })
}

/// Builds a single-threaded ONNX Runtime session for `model`.
pub fn load_session(model: &Path) -> Result<Session, ModelError> {
    Session::builder()
        .map_err(|e| ModelError::Load(format!("session builder: {e}")))?
        .with_intra_threads(1)
        .map_err(|e| ModelError::Load(format!("thread config: {e}")))?
        .with_log_level(ort::logging::LogLevel::Warning)
        .map_err(|e| ModelError::Load(format!("log level: {e}")))?
        .commit_from_file(model)
        .map_err(|e| ModelError::Load(format!("model load ({}): {e}", model.display())))
}

/// Loads a tokenizer with padding disabled; callers configure truncation.
pub fn load_tokenizer(path: &Path) -> Result<Tokenizer, ModelError> {
    let mut tokenizer = Tokenizer::from_file(path)
        .map_err(|e| ModelError::Load(format!("tokenizer load ({}): {e}", path.display())))?;
    tokenizer.with_padding(None);
    Ok(tokenizer)
}

/// Widens token ids or masks into the `i64` tensors the ONNX graphs expect.
pub(crate) fn to_i64(values: &[u32]) -> Vec<i64> {
    values.iter().map(|&v| i64::from(v)).collect()
}

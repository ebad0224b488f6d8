//! Command-line flag groups shared by the loader and chat binaries.

use std::path::PathBuf;

use clap::Args;
use tokio_postgres::Config;

use crate::answerer::AnswerConfig;
use crate::fetcher::{FetchLimits, DEFAULT_CATALOG_URL};
use crate::loader::LoadLimits;
use crate::models::{ModelSpec, DEFAULT_EMBEDDING_MODEL, DEFAULT_QA_MODEL};
use crate::vector_store::{StoreError, TableName};

/// Postgres connection and table selection.
#[derive(Args, Debug, Clone)]
pub struct DatabaseArgs {
    /// Name of the Postgres database
    pub dbname: String,

    /// Postgres host
    #[arg(long = "pg-host", env = "PGHOST", default_value = "localhost")]
    pub host: String,

    /// Postgres port
    #[arg(long = "pg-port", env = "PGPORT", default_value_t = 5432)]
    pub port: u16,

    /// Postgres user
    #[arg(long = "pg-user", env = "PGUSER", default_value = "postgres")]
    pub user: String,

    /// Postgres password
    #[arg(long = "pg-password", env = "PGPASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Schema holding the chunk table
    #[arg(long, env = "WIKIQA_SCHEMA", default_value = "public")]
    pub schema: String,

    /// Chunk table name
    #[arg(long, env = "WIKIQA_TABLE", default_value = "embeddings")]
    pub table: String,
}

impl DatabaseArgs {
    /// Connection settings for `tokio_postgres`.
    pub fn pg_config(&self) -> Config {
        let mut config = Config::new();
        config
            .dbname(&self.dbname)
            .host(&self.host)
            .port(self.port)
            .user(&self.user)
            .application_name(env!("CARGO_PKG_NAME"));
        if let Some(password) = &self.password {
            config.password(password);
        }
        config
    }

    /// Target table identifier.
    pub fn table_name(&self) -> Result<TableName, StoreError> {
        TableName::new(self.schema.clone(), self.table.clone())
    }
}

/// Model selection and cache location.
#[derive(Args, Debug, Clone)]
pub struct ModelArgs {
    /// Hub repository of the sentence-embedding model
    #[arg(long, env = "WIKIQA_EMBEDDING_MODEL", default_value = DEFAULT_EMBEDDING_MODEL)]
    pub embedding_model: String,

    /// Hub repository of the extractive QA model
    #[arg(long, env = "WIKIQA_QA_MODEL", default_value = DEFAULT_QA_MODEL)]
    pub qa_model: String,

    /// Directory for downloaded model files (defaults to the hf-hub cache)
    #[arg(long, env = "WIKIQA_MODEL_CACHE")]
    pub model_cache: Option<PathBuf>,
}

impl ModelArgs {
    /// Embedding model spec.
    pub fn embedding_spec(&self) -> ModelSpec {
        ModelSpec::new(self.embedding_model.clone())
    }

    /// QA model spec.
    pub fn qa_spec(&self) -> ModelSpec {
        ModelSpec::new(self.qa_model.clone())
    }
}

/// Answer extraction limits.
#[derive(Args, Debug, Clone)]
pub struct AnswerArgs {
    /// Longest answer span, in tokens
    #[arg(long, default_value_t = 128)]
    pub max_answer_len: usize,

    /// Longest question + context sequence, in tokens
    #[arg(long, default_value_t = 512)]
    pub max_seq_len: usize,
}

impl AnswerArgs {
    /// Converts the flags into an [`AnswerConfig`].
    pub fn answer_config(&self) -> AnswerConfig {
        AnswerConfig {
            max_answer_len: self.max_answer_len.max(1),
            max_seq_len: self.max_seq_len,
            ..AnswerConfig::default()
        }
    }
}

/// Dataset download and ingestion bounds.
#[derive(Args, Debug, Clone)]
pub struct DatasetArgs {
    /// Directory holding downloaded parquet shards
    #[arg(long, env = "WIKIQA_DATASET_DIR", default_value = "./datasets/wikimedia")]
    pub dataset_dir: PathBuf,

    /// Catalog endpoint listing shard URLs
    #[arg(long, env = "WIKIQA_CATALOG_URL", default_value = DEFAULT_CATALOG_URL)]
    pub catalog_url: String,

    /// New shards downloaded per run (0 = all missing shards)
    #[arg(long, env = "WIKIQA_MAX_DOWNLOADS", default_value_t = 1)]
    pub max_downloads: usize,

    /// Rows ingested from each shard (0 = whole shard)
    #[arg(long, env = "WIKIQA_MAX_ROWS", default_value_t = 10)]
    pub max_rows_per_file: usize,

    /// Skip the download step and ingest whatever is already on disk
    #[arg(long, default_value_t = false)]
    pub skip_download: bool,
}

impl DatasetArgs {
    /// Download bounds.
    pub fn fetch_limits(&self) -> FetchLimits {
        FetchLimits {
            max_downloads: (self.max_downloads > 0).then_some(self.max_downloads),
        }
    }

    /// Ingestion bounds.
    pub fn load_limits(&self) -> LoadLimits {
        LoadLimits {
            max_rows_per_file: (self.max_rows_per_file > 0).then_some(self.max_rows_per_file),
        }
    }
}

/// Logging verbosity.
#[derive(Args, Debug, Clone)]
pub struct LogArgs {
    /// Default log filter when RUST_LOG is unset
    #[arg(long, env = "WIKIQA_LOG", default_value = "info")]
    pub log_level: String,
}

impl LogArgs {
    /// Installs a stderr `tracing` subscriber. `RUST_LOG` wins over `--log-level`.
    pub fn init_tracing(&self) {
        use tracing_subscriber::EnvFilter;

        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(&self.log_level));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .compact()
            .try_init();
    }
}

//! Dataset shard downloads driven by a JSON catalog of file URLs.

use std::path::{Path, PathBuf};

use reqwest::{Client, StatusCode};
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};
use url::Url;

/// Catalog of English Wikipedia parquet shards (2023-11-01 dump).
pub const DEFAULT_CATALOG_URL: &str =
    "https://huggingface.co/api/datasets/wikimedia/wikipedia/parquet/20231101.en/train";

const PARTIAL_SUFFIX: &str = ".part";

/// Bounds on how much a single fetch run downloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchLimits {
    /// Stop after this many new files; `None` downloads every missing file.
    pub max_downloads: Option<usize>,
}

impl Default for FetchLimits {
    fn default() -> Self {
        // shards are 400MB+ each
        Self {
            max_downloads: Some(1),
        }
    }
}

/// Errors raised while listing or downloading shards.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Local filesystem failure.
    #[error("filesystem error at {path}: {source}")]
    Io {
        /// Offending path.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },
    /// Transport-level HTTP failure.
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// Server answered with a non-success status.
    #[error("{url} returned {status}")]
    Status {
        /// Requested URL.
        url: String,
        /// Response status.
        status: StatusCode,
    },
    /// Catalog body is not a JSON array of URLs.
    #[error("invalid catalog response: {0}")]
    Catalog(String),
}

/// Outcome of a fetch run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchReport {
    /// Files written during this run.
    pub downloaded: Vec<PathBuf>,
    /// Catalog entries already present locally.
    pub skipped: Vec<PathBuf>,
}

/// Downloads dataset shards listed by a catalog endpoint.
#[derive(Clone)]
pub struct DatasetFetcher {
    client: Client,
    catalog_url: String,
    limits: FetchLimits,
}

impl DatasetFetcher {
    /// Builds a fetcher for `catalog_url`.
    pub fn new(catalog_url: impl Into<String>, limits: FetchLimits) -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            catalog_url: catalog_url.into(),
            limits,
        })
    }

    /// Fetches and parses the list of shard URLs.
    pub async fn catalog(&self) -> Result<Vec<Url>, FetchError> {
        let resp = self.client.get(&self.catalog_url).send().await?;
        if !resp.status().is_success() {
            return Err(FetchError::Status {
                url: self.catalog_url.clone(),
                status: resp.status(),
            });
        }
        let body = resp.text().await?;
        parse_catalog(&body)
    }

    /// Ensures `dir` exists and downloads missing shards up to the configured cap.
    pub async fn fetch_into(&self, dir: &Path) -> Result<FetchReport, FetchError> {
        fs::create_dir_all(dir).await.map_err(|source| FetchError::Io {
            path: dir.to_path_buf(),
            source,
        })?;

        let urls = self.catalog().await?;
        info!(files = urls.len(), catalog = %self.catalog_url, "fetched dataset catalog");
        let mut report = FetchReport::default();
        for url in urls {
            if self
                .limits
                .max_downloads
                .is_some_and(|cap| report.downloaded.len() >= cap)
            {
                break;
            }
            let Some(name) = file_name_for(&url) else {
                debug!(%url, "catalog entry has no file name; skipping");
                continue;
            };
            let dest = dir.join(&name);
            let present = fs::try_exists(&dest)
                .await
                .map_err(|source| FetchError::Io {
                    path: dest.clone(),
                    source,
                })?;
            if present {
                debug!(path = %dest.display(), "shard already present");
                report.skipped.push(dest);
                continue;
            }
            let bytes = self.download(&url, &dest).await?;
            info!(path = %dest.display(), bytes, "downloaded shard");
            report.downloaded.push(dest);
        }
        Ok(report)
    }

    async fn download(&self, url: &Url, dest: &Path) -> Result<u64, FetchError> {
        let mut resp = self.client.get(url.clone()).send().await?;
        if !resp.status().is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: resp.status(),
            });
        }

        let partial = partial_path(dest);
        let written = match write_body(&mut resp, &partial).await {
            Ok(written) => written,
            Err(err) => {
                if let Err(cleanup) = fs::remove_file(&partial).await {
                    debug!(path = %partial.display(), error = %cleanup, "no partial file to remove");
                }
                return Err(err);
            }
        };
        fs::rename(&partial, dest)
            .await
            .map_err(|source| FetchError::Io {
                path: dest.to_path_buf(),
                source,
            })?;
        Ok(written)
    }
}

async fn write_body(resp: &mut reqwest::Response, partial: &Path) -> Result<u64, FetchError> {
    let io_err = |source| FetchError::Io {
        path: partial.to_path_buf(),
        source,
    };
    let mut file = fs::File::create(partial).await.map_err(io_err)?;
    let mut written = 0u64;
    while let Some(chunk) = resp.chunk().await? {
        file.write_all(&chunk).await.map_err(io_err)?;
        written += chunk.len() as u64;
    }
    file.flush().await.map_err(io_err)?;
    Ok(written)
}

/// Parses the catalog body: a JSON array of absolute URLs.
pub fn parse_catalog(body: &str) -> Result<Vec<Url>, FetchError> {
    let entries: Vec<String> =
        serde_json::from_str(body).map_err(|err| FetchError::Catalog(err.to_string()))?;
    entries
        .iter()
        .map(|entry| {
            Url::parse(entry).map_err(|err| FetchError::Catalog(format!("{entry}: {err}")))
        })
        .collect()
}

/// Last non-empty path segment of `url`, used as the local file name.
pub fn file_name_for(url: &Url) -> Option<String> {
    url.path_segments()?
        .filter(|segment| !segment.is_empty())
        .next_back()
        .map(str::to_string)
}

fn partial_path(dest: &Path) -> PathBuf {
    let mut name = dest.as_os_str().to_os_string();
    name.push(PARTIAL_SUFFIX);
    PathBuf::from(name)
}

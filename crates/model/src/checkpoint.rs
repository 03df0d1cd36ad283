//! Checkpoint resolution.
//!
//! A checkpoint is named either by a local directory or by a Hugging Face
//! Hub repository id (`facebook/bart-large`). Files are looked up in this
//! order:
//! 1. `<name>/<file>` when `<name>` is an existing directory
//! 2. `<cache_dir>/<name>/<file>`
//! 3. `https://huggingface.co/<name>/resolve/main/<file>`, saved into the
//!    cache (only when downloads are allowed)

use futures::StreamExt;
use ragqa_core::{AppError, AppResult};
use reqwest::header::{AUTHORIZATION, USER_AGENT};
use reqwest::StatusCode;
use std::io::Write;
use std::path::{Component, Path, PathBuf};

/// Default Hub endpoint, overridable with `HF_ENDPOINT`.
pub const DEFAULT_HUB_ENDPOINT: &str = "https://huggingface.co";

const DEFAULT_REVISION: &str = "main";

/// Finds checkpoint files locally or on the Hub.
#[derive(Debug, Clone)]
pub struct CheckpointResolver {
    cache_dir: PathBuf,
    allow_downloads: bool,
    endpoint: String,
    token: Option<String>,
    client: reqwest::Client,
}

impl CheckpointResolver {
    /// Create a resolver caching into `cache_dir`.
    ///
    /// Reads `HF_ENDPOINT` and `HF_TOKEN` from the environment.
    pub fn new(cache_dir: impl Into<PathBuf>, allow_downloads: bool) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| AppError::Model(format!("Failed to create HTTP client: {}", e)))?;

        let endpoint = std::env::var("HF_ENDPOINT")
            .unwrap_or_else(|_| DEFAULT_HUB_ENDPOINT.to_string())
            .trim_end_matches('/')
            .to_string();

        Ok(Self {
            cache_dir: cache_dir.into(),
            allow_downloads,
            endpoint,
            token: std::env::var("HF_TOKEN").ok().filter(|t| !t.trim().is_empty()),
            client,
        })
    }

    /// Use a different Hub endpoint.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into().trim_end_matches('/').to_string();
        self
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Where a downloaded file for `name` is cached.
    pub fn cached_path(&self, name: &str, file: &str) -> PathBuf {
        self.cache_dir.join(name).join(file)
    }

    /// Resolve `file` of checkpoint `name_or_path` to a local path.
    pub async fn resolve_file(&self, name_or_path: &str, file: &str) -> AppResult<PathBuf> {
        let local = Path::new(name_or_path);
        if local.is_dir() {
            let candidate = local.join(file);
            if candidate.is_file() {
                tracing::debug!("Using local checkpoint file {:?}", candidate);
                return Ok(candidate);
            }
            return Err(AppError::Model(format!(
                "Checkpoint directory {:?} has no {}",
                local, file
            )));
        }

        validate_repo_id(name_or_path)?;

        let cached = self.cached_path(name_or_path, file);
        if cached.is_file() {
            tracing::debug!("Using cached checkpoint file {:?}", cached);
            return Ok(cached);
        }

        if !self.allow_downloads {
            return Err(AppError::Model(format!(
                "Checkpoint '{}' not found: no directory of that name and no cached {} at {:?} (downloads disabled)",
                name_or_path, file, cached
            )));
        }

        self.download(name_or_path, file, &cached).await?;
        Ok(cached)
    }

    async fn download(&self, repo: &str, file: &str, dest: &Path) -> AppResult<()> {
        let url = format!(
            "{}/{}/resolve/{}/{}",
            self.endpoint, repo, DEFAULT_REVISION, file
        );
        tracing::info!("Downloading {}", url);

        let mut request = self
            .client
            .get(&url)
            .header(USER_AGENT, concat!("ragqa/", env!("CARGO_PKG_VERSION")));
        if let Some(token) = &self.token {
            request = request.header(AUTHORIZATION, format!("Bearer {}", token.trim()));
        }

        let response = request
            .send()
            .await
            .map_err(|e| AppError::Model(format!("Failed to download {}: {}", url, e)))?;

        match response.status() {
            StatusCode::OK => {}
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(AppError::Model(format!(
                    "Access to checkpoint '{}' denied; set HF_TOKEN for gated repositories",
                    repo
                )))
            }
            StatusCode::NOT_FOUND => {
                return Err(AppError::Model(format!(
                    "Checkpoint '{}' has no file {} on the Hub",
                    repo, file
                )))
            }
            status => {
                return Err(AppError::Model(format!(
                    "Downloading {} failed with status {}",
                    url, status
                )))
            }
        }

        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }

        // Stream into a sibling temp file, renamed only once complete
        let partial = dest.with_extension("partial");
        let written = match write_body(response, &partial, &url).await {
            Ok(written) => written,
            Err(e) => {
                if let Err(cleanup) = std::fs::remove_file(&partial) {
                    tracing::debug!("Could not remove {:?}: {}", partial, cleanup);
                }
                return Err(e);
            }
        };

        std::fs::rename(&partial, dest)?;
        tracing::debug!("Saved {} bytes to {:?}", written, dest);
        Ok(())
    }
}

async fn write_body(response: reqwest::Response, path: &Path, url: &str) -> AppResult<usize> {
    let mut out = std::fs::File::create(path)?;
    let mut stream = response.bytes_stream();
    let mut written = 0usize;

    while let Some(chunk) = stream.next().await {
        let chunk =
            chunk.map_err(|e| AppError::Model(format!("Download of {} failed: {}", url, e)))?;
        out.write_all(&chunk)?;
        written += chunk.len();
    }
    out.flush()?;
    Ok(written)
}

/// Hub ids are relative paths without `..` components.
fn validate_repo_id(name: &str) -> AppResult<()> {
    let path = Path::new(name);
    let valid = !name.trim().is_empty()
        && path
            .components()
            .all(|c| matches!(c, Component::Normal(_)));

    if valid {
        Ok(())
    } else {
        Err(AppError::Model(format!(
            "Checkpoint '{}' is neither a directory nor a Hub repository id",
            name
        )))
    }
}

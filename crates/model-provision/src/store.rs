//! Local model store

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::ProvisionError;

/// Files smaller than this are treated as failed downloads
pub const DEFAULT_MIN_BYTES: u64 = 1000;

/// Weight file extension
pub const MODEL_EXTENSION: &str = "onnx";

/// Directory of model weights with an optional remote origin
pub struct ModelStore {
    dir: PathBuf,
    base_url: Option<String>,
    min_bytes: u64,
    client: reqwest::Client,
}

impl ModelStore {
    /// Create a store rooted at `dir`, downloading from `base_url` when set
    pub fn new(dir: impl Into<PathBuf>, base_url: Option<String>) -> Self {
        Self {
            dir: dir.into(),
            base_url: base_url.map(|u| u.trim_end_matches('/').to_string()),
            min_bytes: DEFAULT_MIN_BYTES,
            client: reqwest::Client::new(),
        }
    }

    pub fn with_min_bytes(mut self, min_bytes: u64) -> Self {
        self.min_bytes = min_bytes;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Local path for a model name
    pub fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", name, MODEL_EXTENSION))
    }

    fn url_for(&self, name: &str) -> Option<String> {
        self.base_url
            .as_ref()
            .map(|base| format!("{}/{}.{}", base, name, MODEL_EXTENSION))
    }

    /// Ensure every named model is present, returning name -> path
    pub async fn ensure(&self, names: &[&str]) -> Result<BTreeMap<String, PathBuf>, ProvisionError> {
        info!("Preparing model directory {}", self.dir.display());
        tokio::fs::create_dir_all(&self.dir).await?;

        let mut paths = BTreeMap::new();
        for name in names {
            let path = self.ensure_one(name).await?;
            paths.insert(name.to_string(), path);
        }
        Ok(paths)
    }

    async fn ensure_one(&self, name: &str) -> Result<PathBuf, ProvisionError> {
        let path = self.path_for(name);
        if is_present(&path, self.min_bytes).await {
            info!("{} already exists locally", path.display());
            return Ok(path);
        }

        let Some(url) = self.url_for(name) else {
            return Err(ProvisionError::Missing {
                name: name.to_string(),
                path: path.display().to_string(),
            });
        };

        info!("Downloading {} from {}", name, url);
        self.download(name, &url, &path).await?;
        Ok(path)
    }

    async fn download(&self, name: &str, url: &str, path: &Path) -> Result<(), ProvisionError> {
        let response = self.client.get(url).send().await?;
        if response.status() != reqwest::StatusCode::OK {
            return Err(ProvisionError::Status {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }

        let partial = path.with_extension(format!("{}.part", MODEL_EXTENSION));
        let written = match write_body(response, &partial).await {
            Ok(written) => written,
            Err(e) => {
                warn!("Download of {} interrupted: {}", name, e);
                let _ = tokio::fs::remove_file(&partial).await;
                return Err(e);
            }
        };
        debug!("Received {} bytes for {}", written, name);

        if written < self.min_bytes {
            warn!("Discarding truncated download of {} ({} bytes)", name, written);
            tokio::fs::remove_file(&partial).await?;
            return Err(ProvisionError::TooSmall {
                name: name.to_string(),
                bytes: written,
            });
        }

        tokio::fs::rename(&partial, path).await?;
        info!("Saved {}", path.display());
        Ok(())
    }
}

/// Stream a response body into `partial`, returning the byte count
async fn write_body(mut response: reqwest::Response, partial: &Path) -> Result<u64, ProvisionError> {
    let mut file = tokio::fs::File::create(partial).await?;
    let mut written: u64 = 0;
    while let Some(chunk) = response.chunk().await? {
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    file.flush().await?;
    Ok(written)
}

/// True when `path` is a file of at least `min_bytes`
pub(crate) async fn is_present(path: &Path, min_bytes: u64) -> bool {
    match tokio::fs::metadata(path).await {
        Ok(meta) => meta.is_file() && meta.len() >= min_bytes,
        Err(_) => false,
    }
}

//! Model Provisioning
//!
//! Makes sure detector weights exist on local storage before the detectors
//! are constructed. Missing or truncated files are downloaded again.

mod store;

pub use store::{ModelStore, DEFAULT_MIN_BYTES, MODEL_EXTENSION};

use thiserror::Error;

/// Errors during model provisioning
#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Download of {url} failed with status {status}")]
    Status { url: String, status: u16 },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Model {name} missing at {path} and no download URL is configured")]
    Missing { name: String, path: String },
    #[error("Model {name} is only {bytes} bytes, likely truncated")]
    TooSmall { name: String, bytes: u64 },
}

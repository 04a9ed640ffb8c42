//! Error types for report collection

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, CspError>;

#[derive(Debug, Error)]
pub enum CspError {
    #[error("Invalid URI {uri:?}: {source}")]
    InvalidUri {
        uri: String,
        source: url::ParseError,
    },

    #[error("Invalid hostname in {uri:?}")]
    InvalidHostname { uri: String },

    #[error("Invalid root domain key: {key:?}")]
    InvalidDomainKey { key: String },

    #[error("Malformed report payload: {0}")]
    MalformedReport(#[source] serde_json::Error),

    #[error("Corrupt ledger at {path}: {source}")]
    CorruptLedger {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("IO error on {path}: {source}")]
    Storage {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to render view for {domain}: {reason}")]
    Render { domain: String, reason: String },

    #[error("No reports stored for {domain}")]
    NotFound { domain: String },

    #[error("Failed to load config from {path}: {source}")]
    ConfigLoad {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CspError {
    /// Errors caused by the request rather than by the collector
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            CspError::InvalidUri { .. }
                | CspError::InvalidHostname { .. }
                | CspError::InvalidDomainKey { .. }
                | CspError::MalformedReport(_)
        )
    }

    pub(crate) fn storage(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CspError::Storage {
            path: path.into(),
            source,
        }
    }
}

//! Root domain extraction
//!
//! A root domain is the last two dot-separated labels of a hostname. It keys
//! a domain's ledger, names its artifacts on disk and lists it on the landing
//! page. There is no public suffix awareness: `foo.co.uk` maps to `co.uk`.

use crate::error::{CspError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

/// Last two labels of a hostname, e.g. `example.com` for `a.b.example.com`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RootDomain(String);

impl RootDomain {
    /// Derive the root domain owning `uri`
    pub fn from_uri(uri: &str) -> Result<Self> {
        let parsed = Url::parse(uri).map_err(|source| CspError::InvalidUri {
            uri: uri.to_string(),
            source,
        })?;

        let host = parsed.host_str().ok_or_else(|| CspError::InvalidHostname {
            uri: uri.to_string(),
        })?;

        let labels: Vec<&str> = host.split('.').collect();
        if labels.len() < 2 {
            return Err(CspError::InvalidHostname {
                uri: uri.to_string(),
            });
        }

        let root = labels[labels.len() - 2..].join(".");
        if !is_valid_key(&root) {
            return Err(CspError::InvalidHostname {
                uri: uri.to_string(),
            });
        }

        Ok(Self(root))
    }

    /// Accept an externally supplied key, such as a query parameter
    ///
    /// Keys become filename stems, so only characters that can appear in a
    /// root domain are allowed and path components are rejected.
    pub fn from_key(key: &str) -> Result<Self> {
        if is_valid_key(key) {
            Ok(Self(key.to_string()))
        } else {
            Err(CspError::InvalidDomainKey {
                key: key.to_string(),
            })
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn is_valid_key(key: &str) -> bool {
    !key.is_empty()
        && !key.starts_with('.')
        && key.contains('.')
        && !key.contains("..")
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.')
}

/// Derive the root domain owning `uri`
pub fn extract_root_domain(uri: &str) -> Result<RootDomain> {
    RootDomain::from_uri(uri)
}

impl fmt::Display for RootDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for RootDomain {
    type Error = CspError;

    fn try_from(value: String) -> Result<Self> {
        Self::from_key(&value)
    }
}

impl From<RootDomain> for String {
    fn from(domain: RootDomain) -> Self {
        domain.0
    }
}

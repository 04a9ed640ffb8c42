//! File-backed storage for domain ledgers and their rendered pages
//!
//! Everything lives in one flat directory:
//! - `<domain>.json`: the ledger, a JSON array of violation records
//! - `<domain>_csp.html`: the rendered view of that ledger
//! - `index.html`: the landing page
//! - `domains.json`: the manifest of known domains
//!
//! `LedgerStore` does no locking of its own. Read-modify-write sequences on a
//! ledger must be serialized per domain by the caller, which
//! [`ReportService`](crate::service::ReportService) does with [`KeyedLocks`].

mod atomic;
pub mod locks;
pub mod manifest;

pub use locks::KeyedLocks;
pub use manifest::Manifest;

use crate::domain::RootDomain;
use crate::error::{CspError, Result};
use crate::report::ViolationRecord;
use atomic::write_atomic;
use std::collections::BTreeSet;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Ordered violation records for one root domain
pub type DomainLedger = Vec<ViolationRecord>;

const LEDGER_SUFFIX: &str = ".json";
const VIEW_SUFFIX: &str = "_csp.html";
const INDEX_FILE: &str = "index.html";
const MANIFEST_FILE: &str = "domains.json";

pub struct LedgerStore {
    dir: PathBuf,
}

impl LedgerStore {
    /// Open a store rooted at `dir`, creating the directory if needed
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| CspError::storage(&dir, e))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn ledger_path(&self, domain: &RootDomain) -> PathBuf {
        self.dir.join(format!("{}{}", domain, LEDGER_SUFFIX))
    }

    pub fn view_path(&self, domain: &RootDomain) -> PathBuf {
        self.dir.join(format!("{}{}", domain, VIEW_SUFFIX))
    }

    pub fn index_path(&self) -> PathBuf {
        self.dir.join(INDEX_FILE)
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.dir.join(MANIFEST_FILE)
    }

    /// Load a domain's ledger; a domain with no ledger yet has an empty one
    ///
    /// A ledger that exists but cannot be decoded is reported as
    /// `CorruptLedger` and left untouched on disk.
    pub fn load(&self, domain: &RootDomain) -> Result<DomainLedger> {
        let path = self.ledger_path(domain);
        let raw = match fs::read(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(CspError::storage(&path, e)),
        };

        serde_json::from_slice(&raw).map_err(|source| CspError::CorruptLedger { path, source })
    }

    /// Persist a full ledger, replacing any previous version atomically
    pub fn save(&self, domain: &RootDomain, ledger: &[ViolationRecord]) -> Result<()> {
        let path = self.ledger_path(domain);
        let raw = serde_json::to_vec(ledger).map_err(|e| CspError::storage(&path, e.into()))?;
        write_atomic(&path, &raw)
    }

    /// Append one record to the end of a domain's ledger and persist it
    pub fn append(&self, domain: &RootDomain, record: ViolationRecord) -> Result<DomainLedger> {
        let mut ledger = self.load(domain)?;
        ledger.push(record);
        self.save(domain, &ledger)?;
        Ok(ledger)
    }

    /// Remove a domain's ledger and rendered view
    ///
    /// A domain missing one of the two artifacts is still cleaned up; only a
    /// domain with neither is `NotFound`.
    pub fn delete_ledger(&self, domain: &RootDomain) -> Result<()> {
        let ledger_removed = remove_if_present(&self.ledger_path(domain))?;
        let view_removed = remove_if_present(&self.view_path(domain))?;

        if ledger_removed || view_removed {
            Ok(())
        } else {
            Err(CspError::NotFound {
                domain: domain.to_string(),
            })
        }
    }

    pub fn write_view(&self, domain: &RootDomain, html: &str) -> Result<()> {
        write_atomic(&self.view_path(domain), html.as_bytes())
    }

    pub fn write_index(&self, html: &str) -> Result<()> {
        write_atomic(&self.index_path(), html.as_bytes())
    }

    /// Domains that currently have a ledger file on disk
    pub fn scan_ledgers(&self) -> Result<BTreeSet<RootDomain>> {
        self.scan_suffix(LEDGER_SUFFIX)
    }

    /// Domains that currently have a rendered view on disk
    pub fn scan_views(&self) -> Result<BTreeSet<RootDomain>> {
        self.scan_suffix(VIEW_SUFFIX)
    }

    fn scan_suffix(&self, suffix: &str) -> Result<BTreeSet<RootDomain>> {
        let entries = fs::read_dir(&self.dir).map_err(|e| CspError::storage(&self.dir, e))?;

        let mut domains = BTreeSet::new();
        for entry in entries {
            let entry = entry.map_err(|e| CspError::storage(&self.dir, e))?;
            let is_file = entry.file_type().map(|t| t.is_file()).unwrap_or(false);
            if !is_file {
                continue;
            }

            let name = entry.file_name();
            let Some(stem) = name.to_str().and_then(|n| n.strip_suffix(suffix)) else {
                continue;
            };

            // The manifest shares the ledger suffix but is not a domain key.
            if let Ok(domain) = RootDomain::from_key(stem) {
                domains.insert(domain);
            }
        }

        Ok(domains)
    }
}

fn remove_if_present(path: &Path) -> Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(CspError::storage(path, e)),
    }
}

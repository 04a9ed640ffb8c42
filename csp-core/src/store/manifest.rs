use super::atomic::write_atomic;
use crate::domain::RootDomain;
use crate::error::{CspError, Result};
use std::collections::BTreeSet;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

/// Durable registry of root domains that have a ledger
///
/// Stored as a sorted JSON array next to the ledgers. The registry is
/// updated right after a ledger is written, before its view is rendered, so
/// a failed render never hides a domain from the landing page.
pub struct Manifest {
    path: PathBuf,
    lock: Mutex<()>,
}

impl Manifest {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the registered domains; a missing manifest is empty
    pub fn load(&self) -> Result<BTreeSet<RootDomain>> {
        let raw = match fs::read(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(BTreeSet::new()),
            Err(e) => return Err(CspError::storage(&self.path, e)),
        };

        serde_json::from_slice(&raw).map_err(|source| CspError::CorruptLedger {
            path: self.path.clone(),
            source,
        })
    }

    /// Register a domain; returns whether it was new
    pub fn insert(&self, domain: &RootDomain) -> Result<bool> {
        self.update(|domains| domains.insert(domain.clone()))
    }

    /// Unregister a domain; returns whether it was present
    pub fn remove(&self, domain: &RootDomain) -> Result<bool> {
        self.update(|domains| domains.remove(domain))
    }

    /// Overwrite the registry with exactly `domains`
    pub fn replace(&self, domains: &BTreeSet<RootDomain>) -> Result<()> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.write(domains)
    }

    fn update(&self, change: impl FnOnce(&mut BTreeSet<RootDomain>) -> bool) -> Result<bool> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut domains = self.load()?;
        let changed = change(&mut domains);
        if changed {
            self.write(&domains)?;
        }
        Ok(changed)
    }

    fn write(&self, domains: &BTreeSet<RootDomain>) -> Result<()> {
        let raw = serde_json::to_vec_pretty(domains)
            .map_err(|e| CspError::storage(&self.path, e.into()))?;
        write_atomic(&self.path, &raw)
    }
}

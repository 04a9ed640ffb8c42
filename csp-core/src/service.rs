//! Report ingestion and deletion
//!
//! `ReportService` sequences the extractor, store, manifest and renderers.
//! Each domain's ledger update and view render run under that domain's lock,
//! so concurrent reports for one domain are applied one after the other while
//! reports for different domains proceed in parallel. Landing page rebuilds
//! are serialized separately and always read the manifest fresh.
//!
//! Nothing is rolled back. A ledger that was written stays written even if
//! rendering fails afterwards; the manifest already lists the domain and
//! [`ReportService::reconcile`] rebuilds missing or stale views.

use crate::config::{SiteConfig, StorageConfig};
use crate::domain::RootDomain;
use crate::error::{CspError, Result};
use crate::render::{render_index, render_view, SCRIPTS_JS, STYLES_CSS};
use crate::report::{ReportPayload, ViolationRecord};
use crate::store::{DomainLedger, KeyedLocks, LedgerStore, Manifest};
use chrono::Utc;
use std::collections::BTreeSet;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::Path;
use std::sync::{Mutex, PoisonError};
use tracing::{debug, info, warn};

/// Outcome of a startup reconciliation pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileStats {
    /// Domains whose view was rendered
    pub rendered: usize,
    /// Domains skipped because their ledger could not be loaded or rendered
    pub failed: usize,
}

pub struct ReportService {
    store: LedgerStore,
    manifest: Manifest,
    locks: KeyedLocks,
    index_lock: Mutex<()>,
    site: SiteConfig,
}

impl ReportService {
    /// Open the service over the configured data directory
    pub fn open(storage: &StorageConfig, site: SiteConfig) -> Result<Self> {
        let store = LedgerStore::open(&storage.data_dir)?;
        let manifest = Manifest::new(store.manifest_path());
        Ok(Self {
            store,
            manifest,
            locks: KeyedLocks::new(),
            index_lock: Mutex::new(()),
            site,
        })
    }

    pub fn data_dir(&self) -> &Path {
        self.store.dir()
    }

    pub fn store(&self) -> &LedgerStore {
        &self.store
    }

    /// Handle a raw report body end to end
    pub fn ingest(&self, body: &[u8]) -> Result<RootDomain> {
        let record = ReportPayload::parse(body)?.into_record();
        self.ingest_record(record)
    }

    /// Store one violation and refresh the affected pages
    pub fn ingest_record(&self, mut record: ViolationRecord) -> Result<RootDomain> {
        let domain = RootDomain::from_uri(&record.document_uri)?;
        record.received_at = Some(Utc::now());

        debug!(domain = %domain, blocked_uri = %record.blocked_uri, "Received CSP report");

        let stored = self.locks.with(domain.as_str(), || -> Result<usize> {
            let ledger = self.store.append(&domain, record)?;
            if self.manifest.insert(&domain)? {
                info!(domain = %domain, "Registered new domain");
            }
            self.publish_view(&domain, &ledger)?;
            Ok(ledger.len())
        });

        // A failed render still leaves the domain registered, so list it.
        let refreshed = self.refresh_landing_page();
        let count = stored?;
        refreshed?;

        info!(domain = %domain, reports = count, "Stored CSP report");
        Ok(domain)
    }

    /// Remove all reports for a domain
    ///
    /// The landing page is rebuilt whether or not the removal succeeded, so
    /// it never keeps listing a domain whose artifacts are gone.
    pub fn delete(&self, domain: &RootDomain) -> Result<()> {
        let deleted = self.locks.with(domain.as_str(), || -> Result<()> {
            match self.store.delete_ledger(domain) {
                Ok(()) => {
                    self.manifest.remove(domain)?;
                    Ok(())
                }
                // Unregister even when the artifacts were already gone.
                Err(e @ CspError::NotFound { .. }) => {
                    if self.manifest.remove(domain)? {
                        Ok(())
                    } else {
                        Err(e)
                    }
                }
                Err(e) => Err(e),
            }
        });

        let refreshed = self.refresh_landing_page();

        match &deleted {
            Ok(()) => info!(domain = %domain, "Deleted domain reports"),
            Err(e) => warn!(domain = %domain, error = %e, "Failed to delete domain reports"),
        }

        deleted.and(refreshed)
    }

    /// Load the ledger for a domain
    pub fn ledger(&self, domain: &RootDomain) -> Result<DomainLedger> {
        self.locks.with(domain.as_str(), || self.store.load(domain))
    }

    /// Domains listed on the landing page, sorted
    pub fn list_known_domains(&self) -> Result<BTreeSet<RootDomain>> {
        self.manifest.load()
    }

    /// Rebuild the landing page from the manifest
    pub fn refresh_landing_page(&self) -> Result<()> {
        let _guard = self.index_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let domains = self.manifest.load()?;
        let html = render_index(&self.site.title, &domains);
        self.store.write_index(&html)?;
        debug!(domains = domains.len(), "Rendered landing page");
        Ok(())
    }

    /// Bring manifest, views and landing page in line with the ledgers on disk
    ///
    /// Ledgers are the source of truth: the manifest is rewritten to list
    /// exactly the domains with a ledger, every view is re-rendered, and views
    /// left behind without a ledger are removed. Ledgers that fail to load
    /// or render are logged and left for an operator.
    pub fn reconcile(&self) -> Result<ReconcileStats> {
        let ledgers = self.store.scan_ledgers()?;
        let mut stats = ReconcileStats::default();

        for domain in &ledgers {
            let outcome = self.locks.with(domain.as_str(), || -> Result<()> {
                let ledger = self.store.load(domain)?;
                self.publish_view(domain, &ledger)
            });

            match outcome {
                Ok(()) => stats.rendered += 1,
                Err(e) => {
                    stats.failed += 1;
                    warn!(domain = %domain, error = %e, "Skipping domain during reconcile");
                }
            }
        }

        for orphan in self.store.scan_views()?.difference(&ledgers) {
            let path = self.store.view_path(orphan);
            fs::remove_file(&path).map_err(|e| CspError::Storage { path, source: e })?;
            info!(domain = %orphan, "Removed view without a ledger");
        }

        self.manifest.replace(&ledgers)?;
        self.refresh_landing_page()?;

        info!(
            domains = ledgers.len(),
            rendered = stats.rendered,
            failed = stats.failed,
            "Reconciled report store"
        );
        Ok(stats)
    }

    /// Write the default stylesheet and script unless already customized
    pub fn ensure_assets(&self) -> Result<()> {
        for (name, contents) in [("styles.css", STYLES_CSS), ("scripts.js", SCRIPTS_JS)] {
            let path = self.store.dir().join(name);
            let created = OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .and_then(|mut file| file.write_all(contents.as_bytes()));

            match created {
                Ok(()) => debug!(path = %path.display(), "Wrote default asset"),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {}
                Err(e) => return Err(CspError::Storage { path, source: e }),
            }
        }
        Ok(())
    }

    fn publish_view(&self, domain: &RootDomain, ledger: &[ViolationRecord]) -> Result<()> {
        let html = render_view(domain, ledger)?;
        self.store.write_view(domain, &html)
    }
}

//! Core library for the CSP report collector
//!
//! Turns browser CSP violation reports into per-domain JSON ledgers and
//! renders a static HTML view per domain plus a landing page listing them.

pub mod config;
pub mod domain;
pub mod error;
pub mod render;
pub mod report;
pub mod service;
pub mod store;

pub use config::{Config, ConfigLoader};
pub use domain::{extract_root_domain, RootDomain};
pub use error::{CspError, Result};
pub use report::{ReportPayload, ViolationRecord};
pub use service::{ReconcileStats, ReportService};
pub use store::{DomainLedger, KeyedLocks, LedgerStore, Manifest};

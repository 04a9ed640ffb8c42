//! Configuration for the collector
//!
//! - Config: server, storage and site settings loaded from TOML
//! - ConfigLoader: locates and layers config files

pub mod loader;
pub mod schema;

pub use loader::ConfigLoader;
pub use schema::{Config, ServerConfig, SiteConfig, StorageConfig};

//! HTTP front end for the CSP report collector

pub mod routes;
pub mod server;
pub mod static_files;

pub use routes::AppState;
pub use server::CollectorServer;

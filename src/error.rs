//! Error type for the fallible seams of the harvester.
//!
//! Per-article failures (a dead link, a page with no body, a page with no
//! keyword hit) never become errors; they are logged and the article is
//! dropped. `HarvestError` only covers the places where a caller has to decide
//! what to do next: listing calls against the search API, snapshot I/O, and
//! configuration.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("xlsx error: {0}")]
    Xlsx(#[from] rust_xlsxwriter::XlsxError),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("search API answered with HTTP {0}")]
    ListingStatus(u16),

    /// The listing call kept failing at one pagination position.
    #[error("search API stalled at window {window} page {page} after {attempts} attempts")]
    ListingStalled {
        window: String,
        page: u32,
        attempts: u32,
    },

    #[error("background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

//! Failure taxonomy for the monitoring pipeline.
//!
//! Every variant except `Authentication` is recovered locally by the caller
//! (empty page, zero entities, skipped entity, dropped alert). Authentication
//! failures abort the run before any work starts.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("Failed to fetch {url}: {reason}")]
    Fetch { url: String, reason: String },

    #[error("Search for '{query}' failed: {reason}")]
    Search { query: String, reason: String },

    #[error("Entity extraction failed: {0}")]
    Extraction(String),

    #[error("Registry query for '{entity}' failed: {reason}")]
    RegistryQuery { entity: String, reason: String },

    #[error("Alert delivery failed: {0}")]
    AlertDelivery(String),

    #[error("Authentication failed: {0}")]
    Authentication(String),
}

impl MonitorError {
    /// Only authentication failures stop the run.
    pub fn is_fatal(&self) -> bool {
        matches!(self, MonitorError::Authentication(_))
    }
}

pub type MonitorResult<T> = std::result::Result<T, MonitorError>;

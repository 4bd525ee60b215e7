//! Intensity provider errors.
//!
//! These never leave the crate's sources: every variant is resolved to a
//! fallback reading. They exist so the fallback choice and the log line
//! can tell the failure modes apart.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum IntensityError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("login failed: {0}")]
    Login(String),

    #[error("provider returned status {0}")]
    Status(u16),

    #[error("no forecast data for region {0}")]
    NoData(String),
}

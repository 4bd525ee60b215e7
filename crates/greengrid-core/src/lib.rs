//! greengrid-core: configuration and shared types for GreenGrid.

pub mod config;
pub mod error;
pub mod types;

pub use config::GreenGridConfig;
pub use error::ConfigError;
pub use types::*;

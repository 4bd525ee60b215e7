//! greengrid-intensity: carbon-intensity readings for GreenGrid.
//!
//! Provides the [`IntensitySource`] seam the dispatcher and accumulator
//! read through, a WattTime-backed production source, a fixed-map source
//! for tests and offline runs, and the periodic history sampler.
//!
//! # Sources
//!
//! ```text
//! IntensitySource (trait, never fails the caller)
//!   ├── WattTimeSource  login → forecast, randomized fallback menus
//!   └── StaticSource    region → reading map
//! ```

pub mod error;
pub mod sampler;
pub mod source;
pub mod watttime;

pub use error::IntensityError;
pub use sampler::{CatalogSnapshot, IntensitySampler};
pub use source::{IntensitySource, ReadingFuture, StaticSource, read_catalog, usable};
pub use watttime::{Credentials, WattTimeSource};

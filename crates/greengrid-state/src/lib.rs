//! greengrid-state: embedded job store for GreenGrid.
//!
//! Backed by [redb](https://docs.rs/redb), provides persistent and in-memory
//! storage for jobs and the catalog-wide intensity history.
//!
//! # Architecture
//!
//! All domain types are JSON-serialized into redb's `&[u8]` value columns.
//! Jobs are keyed by ID; a secondary `{created_at}/{id}` index serves
//! newest-first pagination with a reverse range scan.
//!
//! The `JobStore` is `Clone` + `Send` + `Sync` (backed by `Arc<Database>`)
//! and can be shared across async tasks.

pub mod error;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{StateError, StateResult};
pub use store::{JobStore, Modified};
pub use types::*;

//! redb table definitions for the GreenGrid job store.
//!
//! Each table uses `&str` keys. Record tables hold JSON-serialized values;
//! the index table maps a sortable key back to a job ID.

use redb::TableDefinition;

/// Jobs keyed by `{job_id}`.
pub const JOBS: TableDefinition<&str, &[u8]> = TableDefinition::new("jobs");

/// Creation-order index keyed by `{created_at_micros:020}/{job_id}`, value is the job ID.
pub const JOBS_BY_CREATED: TableDefinition<&str, &str> = TableDefinition::new("jobs_by_created");

/// Intensity samples keyed by `{taken_at_millis:020}`.
pub const INTENSITY_SAMPLES: TableDefinition<&str, &[u8]> =
    TableDefinition::new("intensity_samples");

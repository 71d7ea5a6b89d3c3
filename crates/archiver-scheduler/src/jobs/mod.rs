//! Registration of the archiver's configured jobs.
//!
//! - `backup`: archive yesterday's documents of an index
//! - `cleanup`: delete documents past their retention period

mod backup;
mod cleanup;

pub use backup::{backup_output, register_backup_job};
pub use cleanup::register_cleanup_job;

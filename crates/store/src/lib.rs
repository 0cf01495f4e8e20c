//! Durable snapshots for the flood trust engine.
//!
//! A snapshot holds every submitter trust record and every report in the
//! ledger. Files carry a checksummed header, may be lz4-compressed and are
//! replaced atomically.

pub mod atomic_write;
pub mod file_header;
pub mod snapshot;
pub mod store_error;

pub use snapshot::{
    load_snapshot, save_snapshot, RestoreSummary, Snapshot, CURRENT_SNAPSHOT_VERSION,
};
pub use store_error::StoreError;

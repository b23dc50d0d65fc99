//! Workspace facade crate.
//!
//! Re-exports the pipeline stages so hosts can depend on `harvest-workspace`
//! alone: [`ingest`] scans channels into the raw record, [`store`] loads it
//! into SQLite and [`enrich`] attaches object detections to stored images.

pub use core_enrich as enrich;
pub use core_ingest as ingest;
pub use core_store as store;

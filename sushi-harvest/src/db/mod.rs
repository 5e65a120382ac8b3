//! Database access for sushi-harvest
//!
//! Reference persistence for harvested usage on top of the shared SQLite
//! schema from `sushi_common::db`.

pub mod usage_records;

pub use usage_records::SqliteUsageStore;

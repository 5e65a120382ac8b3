//! sushi-harvest library interface
//!
//! Exposes the harvest pipeline for the command line and integration tests

pub mod credentials;
pub mod db;
pub mod fallback;
pub mod services;
pub mod types;

pub use credentials::TomlCredentialRegistry;
pub use db::SqliteUsageStore;
pub use fallback::DirectoryFallbackStore;
pub use types::{CredentialStore, FallbackKey, FallbackStore, HarvestLedger, MonthRange, UsageSink};

//! # SUSHI Common Library
//!
//! Shared code for the SUSHI harvesting workspace including:
//! - Usage record data model (one row per resource, metric type and month)
//! - COUNTER report types and statistics source descriptors
//! - Configuration loading (TOML + environment)
//! - Logging initialization
//! - SQLite pool initialization

pub mod config;
#[cfg(feature = "sqlx")]
pub mod db;
pub mod error;
pub mod logging;
pub mod models;

pub use error::{Error, Result};
pub use models::{
    FieldLimits, ItemMetadata, ParentMetadata, ReportType, StatisticsSource, SushiEndpoint,
    UsageField, UsageRecord,
};

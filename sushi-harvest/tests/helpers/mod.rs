//! Shared test utilities: fast client configuration, in-memory collaborators
//! and fixture loading

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::NaiveDate;
use httpmock::MockServer;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::Mutex;
use sushi_common::config::SushiConfig;
use sushi_common::{ReportType, Result, StatisticsSource, SushiEndpoint};
use sushi_harvest::services::SushiClient;
use sushi_harvest::{CredentialStore, HarvestLedger, MonthRange};

pub const CUSTOMER_ID: &str = "cust-1";

/// Client settings without request spacing and with short timeouts
pub fn fast_config() -> SushiConfig {
    SushiConfig {
        primary_timeout_secs: 5,
        retry_timeout_secs: 5,
        min_request_interval_ms: 0,
        ..SushiConfig::default()
    }
}

pub fn fast_client() -> SushiClient {
    SushiClient::new(&fast_config()).unwrap()
}

/// Endpoint rooted at `/r5` on the mock server
pub fn endpoint_for(server: &MockServer) -> SushiEndpoint {
    SushiEndpoint::new(server.url("/r5"), CUSTOMER_ID)
}

pub fn source() -> StatisticsSource {
    StatisticsSource::new(7, "Example Platform")
}

pub fn month(year: i32, month: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, 1).unwrap()
}

pub fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

pub fn fixture_bytes(name: &str) -> Vec<u8> {
    std::fs::read(fixture_path(name)).unwrap()
}

pub fn fixture_json(name: &str) -> Value {
    serde_json::from_slice(&fixture_bytes(name)).unwrap()
}

/// Credential store that returns the same endpoint (or none) for every source
pub struct StaticCredentials(pub Option<SushiEndpoint>);

#[async_trait]
impl CredentialStore for StaticCredentials {
    async fn credentials_for(&self, _source: &StatisticsSource) -> Result<Option<SushiEndpoint>> {
        Ok(self.0.clone())
    }
}

/// Ledger backed by a map of already-stored months per report type
#[derive(Default)]
pub struct MemoryLedger {
    harvested: Mutex<BTreeMap<ReportType, BTreeSet<NaiveDate>>>,
}

impl MemoryLedger {
    pub fn with_months(report_type: ReportType, months: &[NaiveDate]) -> Self {
        let ledger = Self::default();
        ledger
            .harvested
            .lock()
            .unwrap()
            .insert(report_type, months.iter().copied().collect());
        ledger
    }
}

#[async_trait]
impl HarvestLedger for MemoryLedger {
    async fn already_harvested(
        &self,
        _source: &StatisticsSource,
        report_type: ReportType,
        range: &MonthRange,
    ) -> Result<BTreeSet<NaiveDate>> {
        Ok(self
            .harvested
            .lock()
            .unwrap()
            .get(&report_type)
            .map(|months| months.iter().copied().filter(|m| range.contains(*m)).collect())
            .unwrap_or_default())
    }
}

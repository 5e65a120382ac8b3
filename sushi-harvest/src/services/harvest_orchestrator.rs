//! Harvest orchestration for one statistics source
//!
//! Walks the master reports a provider offers in PR, DR, TR, IR order, asks
//! only for months not yet stored, normalizes accepted reports and tags the
//! records. Every modeled failure becomes a message; only collaborator
//! errors (credential lookup, ledger) propagate.

use crate::services::counter_exceptions::CounterException;
use crate::services::report_normalizer::{self, NormalizeError};
use crate::services::sushi_client::{SushiClient, SushiResponse};
use crate::types::{CredentialStore, FallbackKey, HarvestLedger, MonthRange};
use chrono::NaiveDate;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;
use sushi_common::{FieldLimits, ReportType, Result, StatisticsSource, SushiEndpoint, UsageRecord};

/// What a harvest message is about
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MessageScope {
    /// The statistics source as a whole
    Source,
    /// One master report
    Report(ReportType),
}

impl fmt::Display for MessageScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageScope::Source => f.write_str("source"),
            MessageScope::Report(report_type) => write!(f, "{}", report_type),
        }
    }
}

/// Records gathered by one harvest plus everything worth telling the operator
#[derive(Debug, Clone, Default)]
pub struct HarvestResult {
    pub records: Vec<UsageRecord>,
    pub messages: BTreeMap<MessageScope, Vec<String>>,
}

impl HarvestResult {
    fn push(&mut self, scope: MessageScope, message: impl Into<String>) {
        self.messages.entry(scope).or_default().push(message.into());
    }

    pub fn messages_for(&self, scope: MessageScope) -> &[String] {
        self.messages.get(&scope).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn message_count(&self) -> usize {
        self.messages.values().map(Vec::len).sum()
    }
}

/// SUSHI parameters specific to a master report
pub fn report_parameters(report_type: ReportType, range: &MonthRange) -> Vec<(&'static str, String)> {
    let mut params = vec![
        ("begin_date", range.begin().format("%Y-%m-%d").to_string()),
        ("end_date", range.last_day().format("%Y-%m-%d").to_string()),
    ];
    let attributes = match report_type {
        ReportType::PR | ReportType::DR => "Data_Type|Access_Method",
        ReportType::TR => "Data_Type|Section_Type|YOP|Access_Type|Access_Method",
        ReportType::IR => "Data_Type|YOP|Access_Type|Access_Method",
    };
    params.push(("attributes_to_show", attributes.to_string()));
    if report_type == ReportType::IR {
        params.push(("include_parent_details", "True".to_string()));
    }
    params
}

/// Drives the SUSHI client and the normalizer for one source at a time
pub struct HarvestOrchestrator {
    client: SushiClient,
    credentials: Arc<dyn CredentialStore>,
    ledger: Arc<dyn HarvestLedger>,
    field_limits: FieldLimits,
    check_status: bool,
}

impl HarvestOrchestrator {
    pub fn new(
        client: SushiClient,
        credentials: Arc<dyn CredentialStore>,
        ledger: Arc<dyn HarvestLedger>,
    ) -> Self {
        Self {
            client,
            credentials,
            ledger,
            field_limits: FieldLimits::default(),
            check_status: true,
        }
    }

    pub fn with_field_limits(mut self, field_limits: FieldLimits) -> Self {
        self.field_limits = field_limits;
        self
    }

    /// Whether to call `status` before harvesting
    pub fn with_status_check(mut self, enabled: bool) -> Self {
        self.check_status = enabled;
        self
    }

    /// Harvest `source` for the months of `begin` through `end`
    ///
    /// `report_types` of `None` asks the provider which master reports it
    /// offers.
    pub async fn harvest(
        &self,
        source: &StatisticsSource,
        begin: NaiveDate,
        end: NaiveDate,
        report_types: Option<&[ReportType]>,
    ) -> Result<HarvestResult> {
        let mut result = HarvestResult::default();

        let Some(range) = MonthRange::new(begin, end) else {
            tracing::warn!(source_id = source.id, %begin, %end, "End date precedes begin date");
            result.push(
                MessageScope::Source,
                format!("End date {} precedes begin date {}; nothing harvested", end, begin),
            );
            return Ok(result);
        };

        let Some(endpoint) = self.credentials.credentials_for(source).await? else {
            tracing::warn!(source_id = source.id, "No SUSHI credentials");
            result.push(
                MessageScope::Source,
                format!("No SUSHI credentials for {}", source.name),
            );
            return Ok(result);
        };

        tracing::info!(source_id = source.id, source = %source.name, range = %range, "Starting harvest");

        if self.check_status && !self.service_available(&endpoint, &mut result).await {
            return Ok(result);
        }

        let report_types: Vec<ReportType> = match report_types {
            Some(requested) => ReportType::HARVEST_ORDER
                .into_iter()
                .filter(|rt| requested.contains(rt))
                .collect(),
            None => match self.offered_reports(&endpoint, &mut result).await {
                Some(offered) => offered,
                None => return Ok(result),
            },
        };

        for report_type in report_types {
            self.harvest_report(source, &endpoint, report_type, &range, &mut result)
                .await?;
        }

        tracing::info!(
            source_id = source.id,
            records = result.records.len(),
            messages = result.message_count(),
            "Harvest complete"
        );
        Ok(result)
    }

    /// Status check; `false` means the harvest must stop
    async fn service_available(&self, endpoint: &SushiEndpoint, result: &mut HarvestResult) -> bool {
        match self.client.status(endpoint).await {
            Ok(SushiResponse::Exceptions(exceptions)) => {
                result.push(
                    MessageScope::Source,
                    format!("Service status reported {}", describe(&exceptions)),
                );
                false
            }
            Ok(SushiResponse::Payload { body, alerts }) => {
                for alert in alerts {
                    result.push(MessageScope::Source, format!("Alert: {}", alert));
                }
                if body.get("Service_Active").map(is_false).unwrap_or(false) {
                    result.push(MessageScope::Source, "SUSHI service is not active");
                    return false;
                }
                true
            }
            Err(e) => {
                tracing::warn!(url = %endpoint.base_url, "Status check failed: {}", e);
                result.push(
                    MessageScope::Source,
                    format!("Status check failed ({}); continuing", e),
                );
                true
            }
        }
    }

    /// Master reports the provider offers, in harvest order
    async fn offered_reports(
        &self,
        endpoint: &SushiEndpoint,
        result: &mut HarvestResult,
    ) -> Option<Vec<ReportType>> {
        let ids = match self.client.reports(endpoint).await {
            Ok(ids) => ids,
            Err(e) => {
                result.push(
                    MessageScope::Source,
                    format!("Listing available reports failed: {}", e),
                );
                return None;
            }
        };

        let offered: BTreeSet<ReportType> = ids.iter().filter_map(|id| id.parse().ok()).collect();
        let ordered: Vec<ReportType> = ReportType::HARVEST_ORDER
            .into_iter()
            .filter(|rt| offered.contains(rt))
            .collect();
        if ordered.is_empty() {
            result.push(MessageScope::Source, "Provider offers no master reports");
            return None;
        }
        Some(ordered)
    }

    async fn harvest_report(
        &self,
        source: &StatisticsSource,
        endpoint: &SushiEndpoint,
        report_type: ReportType,
        range: &MonthRange,
        result: &mut HarvestResult,
    ) -> Result<()> {
        let scope = MessageScope::Report(report_type);
        let harvested = self
            .ledger
            .already_harvested(source, report_type, range)
            .await?;
        let missing: Vec<NaiveDate> = range
            .months()
            .into_iter()
            .filter(|month| !harvested.contains(month))
            .collect();

        let request_range = match (missing.first(), missing.last()) {
            (Some(first), Some(last)) if endpoint.partial_ranges => {
                MonthRange::new(*first, *last).unwrap_or(*range)
            }
            (Some(_), Some(_)) => *range,
            _ => {
                tracing::info!(source_id = source.id, report = %report_type, "Already harvested");
                result.push(
                    scope,
                    format!("{} for {} was already harvested; skipped", report_type, range),
                );
                return Ok(());
            }
        };

        let params = report_parameters(report_type, &request_range);
        let fallback = FallbackKey {
            statistics_source_id: source.id,
            report_type,
            range: request_range,
        };

        tracing::debug!(
            source_id = source.id,
            report = %report_type,
            range = %request_range,
            "Requesting master report"
        );

        let response = self
            .client
            .fetch(endpoint, &report_type.report_path(), &params, Some(&fallback))
            .await;

        let (body, alerts) = match response {
            Err(e) => {
                tracing::warn!(source_id = source.id, report = %report_type, "Harvest failed: {}", e);
                result.push(scope, format!("{} harvest failed: {}", report_type, e));
                return Ok(());
            }
            Ok(SushiResponse::Exceptions(exceptions)) => {
                if exceptions.iter().all(CounterException::is_no_usage) {
                    tracing::info!(source_id = source.id, report = %report_type, "No usage available");
                    result.push(
                        scope,
                        format!("{} has no usage for {}: {}", report_type, request_range, describe(&exceptions)),
                    );
                } else {
                    tracing::warn!(source_id = source.id, report = %report_type, "COUNTER exception");
                    result.push(
                        scope,
                        format!("{} returned {}", report_type, describe(&exceptions)),
                    );
                }
                return Ok(());
            }
            Ok(SushiResponse::Payload { body, alerts }) => (body, alerts),
        };

        for alert in alerts {
            result.push(scope, format!("Alert: {}", alert));
        }

        let records = match report_normalizer::normalize(&Value::Object(body), &self.field_limits) {
            Ok(records) => records,
            Err(e) => {
                tracing::warn!(source_id = source.id, report = %report_type, "Normalization failed: {}", e);
                result.push(scope, normalize_message(report_type, &e));
                return Ok(());
            }
        };

        if records.is_empty() {
            result.push(
                scope,
                format!("{} for {} contained no usage; skipped", report_type, request_range),
            );
            return Ok(());
        }

        let before = records.len();
        let accepted: Vec<UsageRecord> = records
            .into_iter()
            .filter(|r| range.contains(r.usage_date) && !harvested.contains(&r.usage_date))
            .map(|r| r.tagged(source.id, report_type))
            .collect();

        if accepted.is_empty() {
            tracing::info!(source_id = source.id, report = %report_type, dropped = before, "Nothing new in report");
            result.push(
                scope,
                format!(
                    "{} for {} held only months already harvested or outside the range; nothing new",
                    report_type, range
                ),
            );
            return Ok(());
        }

        tracing::info!(
            source_id = source.id,
            report = %report_type,
            records = accepted.len(),
            dropped = before - accepted.len(),
            "Master report harvested"
        );
        result.records.extend(accepted);
        Ok(())
    }
}

fn normalize_message(report_type: ReportType, error: &NormalizeError) -> String {
    format!("{} could not be loaded: {}", report_type, error)
}

fn describe(exceptions: &[CounterException]) -> String {
    exceptions
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

fn is_false(value: &Value) -> bool {
    match value {
        Value::Bool(active) => !active,
        Value::String(s) => s.trim().eq_ignore_ascii_case("false"),
        _ => false,
    }
}

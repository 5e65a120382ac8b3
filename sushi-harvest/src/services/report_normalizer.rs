//! COUNTER R5 report normalizer
//!
//! Flattens one parsed master report into [`UsageRecord`]s: one record per
//! (item, metric type, month). The whole report is rejected when any text
//! field exceeds its configured ceiling, so a batch is either stored
//! completely or not at all.

use crate::services::counter_json::{Contributor, CounterReport, ItemParent, ReportItem, TypeValue};
use crate::types::month_start;
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::collections::BTreeSet;
use sushi_common::{FieldLimits, ItemMetadata, ParentMetadata, UsageField, UsageRecord};
use thiserror::Error;

/// Appended to an author list that was cut short
const ET_AL: &str = " et al.";
const AUTHOR_SEPARATOR: &str = "; ";

static ISSN_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{4}-\d{3}[\dXx]\s*$").expect("valid ISSN pattern"));

static PROPRIETARY_TYPE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^proprietary(_id)?$").expect("valid proprietary pattern"));

/// Normalization failures; any of them rejects the entire report
#[derive(Debug, Error, PartialEq, Eq)]
pub enum NormalizeError {
    #[error(
        "{field} value of {length} characters exceeds the {max}-character limit; \
         raise the limit to at least {suggested}"
    )]
    FieldTooLong {
        field: UsageField,
        length: usize,
        max: usize,
        suggested: usize,
    },

    #[error("Malformed report: {0}")]
    Malformed(String),

    #[error("Invalid {field} value: {value}")]
    InvalidValue { field: UsageField, value: String },
}

/// Flatten a master report into usage records
///
/// Records carry no statistics source or report type; the orchestrator
/// tags them after a successful normalization.
pub fn normalize(report: &Value, limits: &FieldLimits) -> Result<Vec<UsageRecord>, NormalizeError> {
    if !report.is_object() {
        return Err(NormalizeError::Malformed(
            "report body is not an object".to_string(),
        ));
    }
    let report: CounterReport = serde_json::from_value(report.clone())
        .map_err(|e| NormalizeError::Malformed(e.to_string()))?;

    let report_creation_date = report
        .header
        .as_ref()
        .and_then(|h| h.created.as_deref())
        .and_then(parse_date);

    let mut records = Vec::new();
    for item in &report.items {
        let metadata = item_metadata(item, limits)?;
        for performance in &item.performance {
            let begin = performance
                .period
                .as_ref()
                .and_then(|p| p.begin_date.as_deref())
                .ok_or_else(|| NormalizeError::Malformed("Performance without Period.Begin_Date".to_string()))?;
            let usage_date = parse_date(begin)
                .map(month_start)
                .ok_or_else(|| NormalizeError::InvalidValue {
                    field: UsageField::UsageDate,
                    value: begin.to_string(),
                })?;

            for instance in &performance.instances {
                let metric_type = instance
                    .metric_type
                    .clone()
                    .ok_or_else(|| NormalizeError::Malformed("Instance without Metric_Type".to_string()))?;
                records.push(UsageRecord {
                    statistics_source_id: None,
                    report_type: None,
                    item: metadata.clone(),
                    metric_type,
                    usage_date,
                    usage_count: parse_count(&instance.count)?,
                    report_creation_date,
                });
            }
        }
    }

    tracing::debug!(
        items = report.items.len(),
        records = records.len(),
        "Normalized COUNTER report"
    );
    Ok(records)
}

/// Columns carrying a value in at least one record of the batch
pub fn populated_fields(records: &[UsageRecord]) -> BTreeSet<UsageField> {
    UsageField::ALL
        .iter()
        .copied()
        .filter(|field| records.iter().any(|record| field.is_populated(record)))
        .collect()
}

fn item_metadata(item: &ReportItem, limits: &FieldLimits) -> Result<ItemMetadata, NormalizeError> {
    let ids = Identifiers::from_list(&item.ids);

    Ok(ItemMetadata {
        resource_name: limited(item.resource_name(), UsageField::ResourceName, limits.resource_name)?,
        publisher: limited(item.publisher.as_deref(), UsageField::Publisher, limits.publisher)?,
        publisher_id: limited(
            publisher_id(&item.publisher_id),
            UsageField::PublisherId,
            limits.publisher_id,
        )?,
        platform: limited(item.platform.as_deref(), UsageField::Platform, limits.platform)?,
        authors: join_authors(&item.contributors, UsageField::Authors, limits.authors)?,
        publication_date: publication_date(&item.dates),
        article_version: article_version(&item.attributes),
        doi: limited(ids.doi, UsageField::Doi, limits.doi)?,
        proprietary_id: limited(ids.proprietary, UsageField::ProprietaryId, limits.proprietary_id)?,
        isbn: ids.isbn.map(str::to_string),
        print_issn: ids.print_issn.map(normalize_issn),
        online_issn: ids.online_issn.map(normalize_issn),
        uri: limited(ids.uri, UsageField::Uri, limits.uri)?,
        data_type: item.data_type.clone(),
        section_type: item.section_type.clone(),
        yop: parse_yop(item.yop.as_deref())?,
        access_type: item.access_type.clone(),
        access_method: item.access_method.clone(),
        parent: match &item.parent {
            Some(parent) => parent_metadata(parent, limits)?,
            None => ParentMetadata::default(),
        },
    })
}

fn parent_metadata(parent: &ItemParent, limits: &FieldLimits) -> Result<ParentMetadata, NormalizeError> {
    let ids = Identifiers::from_list(&parent.ids);

    Ok(ParentMetadata {
        title: limited(parent.name.as_deref(), UsageField::ParentTitle, limits.resource_name)?,
        authors: join_authors(&parent.contributors, UsageField::ParentAuthors, limits.authors)?,
        publication_date: publication_date(&parent.dates),
        article_version: article_version(&parent.attributes),
        data_type: parent.data_type.clone(),
        doi: limited(ids.doi, UsageField::ParentDoi, limits.doi)?,
        proprietary_id: limited(
            ids.proprietary,
            UsageField::ParentProprietaryId,
            limits.proprietary_id,
        )?,
        isbn: ids.isbn.map(str::to_string),
        print_issn: ids.print_issn.map(normalize_issn),
        online_issn: ids.online_issn.map(normalize_issn),
        uri: limited(ids.uri, UsageField::ParentUri, limits.uri)?,
    })
}

// ============================================================================
// Field helpers
// ============================================================================

/// Identifiers picked out of an `Item_ID` list; the first of each kind wins
#[derive(Default)]
struct Identifiers<'a> {
    doi: Option<&'a str>,
    proprietary: Option<&'a str>,
    isbn: Option<&'a str>,
    print_issn: Option<&'a str>,
    online_issn: Option<&'a str>,
    uri: Option<&'a str>,
}

impl<'a> Identifiers<'a> {
    fn from_list(ids: &'a [TypeValue]) -> Self {
        let mut found = Identifiers::default();
        for id in ids {
            let (Some(kind), Some(value)) = (id.kind.as_deref(), id.value.as_deref()) else {
                continue;
            };
            let kind = kind.trim().to_ascii_lowercase();
            let slot = match kind.as_str() {
                "doi" => &mut found.doi,
                "isbn" => &mut found.isbn,
                "print_issn" => &mut found.print_issn,
                "online_issn" => &mut found.online_issn,
                "uri" => &mut found.uri,
                k if k.starts_with("proprietary") => &mut found.proprietary,
                _ => continue,
            };
            if slot.is_none() {
                *slot = Some(value);
            }
        }
        found
    }
}

/// Value checked against its ceiling
fn limited(value: Option<&str>, field: UsageField, max: usize) -> Result<Option<String>, NormalizeError> {
    let Some(value) = value.map(str::trim).filter(|v| !v.is_empty()) else {
        return Ok(None);
    };
    check_length(value, field, max)?;
    Ok(Some(value.to_string()))
}

fn check_length(value: &str, field: UsageField, max: usize) -> Result<(), NormalizeError> {
    let length = value.chars().count();
    if length > max {
        return Err(NormalizeError::FieldTooLong {
            field,
            length,
            max,
            suggested: suggested_limit(length),
        });
    }
    Ok(())
}

/// Observed length plus 10%, rounded up
fn suggested_limit(length: usize) -> usize {
    (length * 11 + 9) / 10
}

/// Single entry → its value; several → the proprietary one
fn publisher_id(ids: &[TypeValue]) -> Option<&str> {
    match ids {
        [only] => only.value.as_deref(),
        many => many
            .iter()
            .find(|id| {
                id.kind
                    .as_deref()
                    .map(|k| PROPRIETARY_TYPE.is_match(k.trim()))
                    .unwrap_or(false)
            })
            .and_then(|id| id.value.as_deref()),
    }
}

/// Author names joined with `"; "`, cut short with `" et al."` at the ceiling
fn join_authors(
    contributors: &[Contributor],
    field: UsageField,
    max: usize,
) -> Result<Option<String>, NormalizeError> {
    let names: Vec<&str> = contributors
        .iter()
        .filter(|c| {
            c.kind
                .as_deref()
                .map(|k| k.trim().eq_ignore_ascii_case("author"))
                .unwrap_or(true)
        })
        .filter_map(|c| c.name.as_deref())
        .collect();

    let Some((first, rest)) = names.split_first() else {
        return Ok(None);
    };
    check_length(first, field, max)?;

    let et_al_len = ET_AL.chars().count();
    let mut joined = first.to_string();
    let mut length = joined.chars().count();

    for (i, name) in rest.iter().enumerate() {
        let is_last = i + 1 == rest.len();
        let candidate = length + AUTHOR_SEPARATOR.len() + name.chars().count();
        let fits = if is_last {
            candidate <= max
        } else {
            candidate + et_al_len <= max
        };
        if !fits {
            // A shortened list must carry the marker
            let needed = length + et_al_len;
            if needed > max {
                return Err(NormalizeError::FieldTooLong {
                    field,
                    length: needed,
                    max,
                    suggested: suggested_limit(needed),
                });
            }
            joined.push_str(ET_AL);
            return Ok(Some(joined));
        }
        joined.push_str(AUTHOR_SEPARATOR);
        joined.push_str(name);
        length = candidate;
    }

    Ok(Some(joined))
}

/// Canonical `NNNN-NNNC` form of an ISSN
///
/// Conforming values are trimmed. Eight bare characters get the hyphen
/// inserted. Anything else is rebuilt as the first five characters, a
/// hyphen and the last four characters of the trimmed value.
pub fn normalize_issn(raw: &str) -> String {
    if ISSN_PATTERN.is_match(raw) {
        return raw.trim().to_string();
    }
    let trimmed = raw.trim();
    let chars: Vec<char> = trimmed.chars().collect();
    if chars.len() == 8 && chars.iter().all(|c| c.is_ascii_alphanumeric()) {
        let head: String = chars[..4].iter().collect();
        let tail: String = chars[4..].iter().collect();
        return format!("{}-{}", head, tail);
    }
    let head: String = chars.iter().take(5).collect();
    let tail: String = chars[chars.len().saturating_sub(4)..].iter().collect();
    format!("{}-{}", head, tail)
}

fn publication_date(dates: &[TypeValue]) -> Option<NaiveDate> {
    dates
        .iter()
        .find(|d| d.is("Publication_Date"))
        .and_then(|d| d.value.as_deref())
        .and_then(parse_date)
}

fn article_version(attributes: &[TypeValue]) -> Option<String> {
    attributes
        .iter()
        .find(|a| a.is("Article_Version"))
        .and_then(|a| a.value.clone())
}

/// `YYYY-MM-DD` (possibly followed by a time) or `YYYY-MM`
fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if let Some(day) = raw.get(..10) {
        if let Ok(date) = NaiveDate::parse_from_str(day, "%Y-%m-%d") {
            return Some(date);
        }
    }
    raw.get(..7)
        .and_then(|month| NaiveDate::parse_from_str(&format!("{}-01", month), "%Y-%m-%d").ok())
}

fn parse_yop(raw: Option<&str>) -> Result<Option<i32>, NormalizeError> {
    raw.map(|yop| {
        yop.parse::<i32>().map_err(|_| NormalizeError::InvalidValue {
            field: UsageField::Yop,
            value: yop.to_string(),
        })
    })
    .transpose()
}

fn parse_count(raw: &Value) -> Result<u64, NormalizeError> {
    let invalid = || NormalizeError::InvalidValue {
        field: UsageField::UsageCount,
        value: raw.to_string(),
    };
    match raw {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0 && f.fract() == 0.0).map(|f| f as u64))
            .ok_or_else(invalid),
        Value::String(s) => s.trim().parse::<u64>().map_err(|_| invalid()),
        _ => Err(invalid()),
    }
}

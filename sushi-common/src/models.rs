//! Usage record data model
//!
//! One [`UsageRecord`] describes one (resource metadata, metric type, month)
//! tuple. Records are built fresh for every normalization and never mutated in
//! place; tagging produces a new value.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Report types
// ============================================================================

/// COUNTER R5 master report
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ReportType {
    /// Platform Master Report
    PR,
    /// Database Master Report
    DR,
    /// Title Master Report
    TR,
    /// Item Master Report
    IR,
}

impl ReportType {
    /// Order in which master reports are harvested
    pub const HARVEST_ORDER: [ReportType; 4] =
        [ReportType::PR, ReportType::DR, ReportType::TR, ReportType::IR];

    pub fn as_str(&self) -> &'static str {
        match self {
            ReportType::PR => "PR",
            ReportType::DR => "DR",
            ReportType::TR => "TR",
            ReportType::IR => "IR",
        }
    }

    /// SUSHI path for the customizable master report (e.g. `reports/pr`)
    pub fn report_path(&self) -> String {
        format!("reports/{}", self.as_str().to_lowercase())
    }
}

impl fmt::Display for ReportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReportType {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "PR" => Ok(ReportType::PR),
            "DR" => Ok(ReportType::DR),
            "TR" => Ok(ReportType::TR),
            "IR" => Ok(ReportType::IR),
            other => Err(crate::Error::InvalidInput(format!(
                "Not a master report type: {}",
                other
            ))),
        }
    }
}

// ============================================================================
// Statistics sources and SUSHI credentials
// ============================================================================

/// A provider of usage statistics (one vendor platform)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatisticsSource {
    pub id: i64,
    pub name: String,
}

impl StatisticsSource {
    pub fn new(id: i64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

/// SUSHI endpoint and credential set for one statistics source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SushiEndpoint {
    /// Base URL of the SUSHI service (report paths are appended)
    pub base_url: String,
    pub customer_id: String,
    #[serde(default)]
    pub requestor_id: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub platform: Option<String>,
    /// Whether the provider honors begin/end dates narrower than what was
    /// asked for previously (false forces full-range requests)
    #[serde(default = "default_partial_ranges")]
    pub partial_ranges: bool,
}

fn default_partial_ranges() -> bool {
    true
}

impl SushiEndpoint {
    pub fn new(base_url: impl Into<String>, customer_id: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            customer_id: customer_id.into(),
            requestor_id: None,
            api_key: None,
            platform: None,
            partial_ranges: true,
        }
    }

    /// Full URL for a SUSHI path, tolerating base URLs without trailing slash
    pub fn url_for(&self, path: &str) -> String {
        let base = self.base_url.trim_end_matches('/');
        let path = path.trim_start_matches('/');
        format!("{}/{}", base, path)
    }

    /// Host portion of the base URL, used to serialize calls per provider
    pub fn provider_key(&self) -> String {
        let without_scheme = self
            .base_url
            .split_once("://")
            .map(|(_, rest)| rest)
            .unwrap_or(&self.base_url);
        without_scheme
            .split('/')
            .next()
            .unwrap_or(without_scheme)
            .to_lowercase()
    }

    /// Credential query parameters in SUSHI naming
    pub fn credential_params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![("customer_id", self.customer_id.clone())];
        if let Some(requestor_id) = &self.requestor_id {
            params.push(("requestor_id", requestor_id.clone()));
        }
        if let Some(api_key) = &self.api_key {
            params.push(("api_key", api_key.clone()));
        }
        if let Some(platform) = &self.platform {
            params.push(("platform", platform.clone()));
        }
        params
    }
}

// ============================================================================
// Field ceilings
// ============================================================================

/// Maximum stored lengths (in characters) for free-text usage fields
///
/// Parent fields share the ceiling of their resource-level counterpart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldLimits {
    pub resource_name: usize,
    pub publisher: usize,
    pub publisher_id: usize,
    pub platform: usize,
    pub authors: usize,
    pub doi: usize,
    pub proprietary_id: usize,
    pub uri: usize,
}

impl Default for FieldLimits {
    fn default() -> Self {
        Self {
            resource_name: 2000,
            publisher: 225,
            publisher_id: 50,
            platform: 75,
            authors: 1000,
            doi: 75,
            proprietary_id: 100,
            uri: 250,
        }
    }
}

// ============================================================================
// Usage records
// ============================================================================

/// Metadata of the parent of a reported item (e.g. the journal of an article)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParentMetadata {
    #[serde(rename = "parent_title")]
    pub title: Option<String>,
    #[serde(rename = "parent_authors")]
    pub authors: Option<String>,
    #[serde(rename = "parent_publication_date")]
    pub publication_date: Option<NaiveDate>,
    #[serde(rename = "parent_article_version")]
    pub article_version: Option<String>,
    #[serde(rename = "parent_data_type")]
    pub data_type: Option<String>,
    #[serde(rename = "parent_DOI")]
    pub doi: Option<String>,
    #[serde(rename = "parent_proprietary_ID")]
    pub proprietary_id: Option<String>,
    #[serde(rename = "parent_ISBN")]
    pub isbn: Option<String>,
    #[serde(rename = "parent_print_ISSN")]
    pub print_issn: Option<String>,
    #[serde(rename = "parent_online_ISSN")]
    pub online_issn: Option<String>,
    #[serde(rename = "parent_URI")]
    pub uri: Option<String>,
}

/// Resource-level metadata shared by every record fanned out from one item
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemMetadata {
    pub resource_name: Option<String>,
    pub publisher: Option<String>,
    #[serde(rename = "publisher_ID")]
    pub publisher_id: Option<String>,
    pub platform: Option<String>,
    pub authors: Option<String>,
    pub publication_date: Option<NaiveDate>,
    pub article_version: Option<String>,
    #[serde(rename = "DOI")]
    pub doi: Option<String>,
    #[serde(rename = "proprietary_ID")]
    pub proprietary_id: Option<String>,
    #[serde(rename = "ISBN")]
    pub isbn: Option<String>,
    #[serde(rename = "print_ISSN")]
    pub print_issn: Option<String>,
    #[serde(rename = "online_ISSN")]
    pub online_issn: Option<String>,
    #[serde(rename = "URI")]
    pub uri: Option<String>,
    pub data_type: Option<String>,
    pub section_type: Option<String>,
    #[serde(rename = "YOP")]
    pub yop: Option<i32>,
    pub access_type: Option<String>,
    pub access_method: Option<String>,
    #[serde(flatten)]
    pub parent: ParentMetadata,
}

/// One usage row: a resource, a metric type and a reporting month
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageRecord {
    #[serde(rename = "statistics_source_ID")]
    pub statistics_source_id: Option<i64>,
    pub report_type: Option<ReportType>,
    #[serde(flatten)]
    pub item: ItemMetadata,
    pub metric_type: String,
    /// Always the first day of the reporting month
    pub usage_date: NaiveDate,
    pub usage_count: u64,
    pub report_creation_date: Option<NaiveDate>,
}

impl UsageRecord {
    /// Copy of this record attributed to a statistics source and report type
    pub fn tagged(self, statistics_source_id: i64, report_type: ReportType) -> Self {
        Self {
            statistics_source_id: Some(statistics_source_id),
            report_type: Some(report_type),
            ..self
        }
    }
}

/// Columns of the produced usage schema
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum UsageField {
    StatisticsSourceId,
    ReportType,
    ResourceName,
    Publisher,
    PublisherId,
    Platform,
    Authors,
    PublicationDate,
    ArticleVersion,
    Doi,
    ProprietaryId,
    Isbn,
    PrintIssn,
    OnlineIssn,
    Uri,
    DataType,
    SectionType,
    Yop,
    AccessType,
    AccessMethod,
    ParentTitle,
    ParentAuthors,
    ParentPublicationDate,
    ParentArticleVersion,
    ParentDataType,
    ParentDoi,
    ParentProprietaryId,
    ParentIsbn,
    ParentPrintIssn,
    ParentOnlineIssn,
    ParentUri,
    MetricType,
    UsageDate,
    UsageCount,
    ReportCreationDate,
}

impl UsageField {
    pub const ALL: [UsageField; 35] = [
        UsageField::StatisticsSourceId,
        UsageField::ReportType,
        UsageField::ResourceName,
        UsageField::Publisher,
        UsageField::PublisherId,
        UsageField::Platform,
        UsageField::Authors,
        UsageField::PublicationDate,
        UsageField::ArticleVersion,
        UsageField::Doi,
        UsageField::ProprietaryId,
        UsageField::Isbn,
        UsageField::PrintIssn,
        UsageField::OnlineIssn,
        UsageField::Uri,
        UsageField::DataType,
        UsageField::SectionType,
        UsageField::Yop,
        UsageField::AccessType,
        UsageField::AccessMethod,
        UsageField::ParentTitle,
        UsageField::ParentAuthors,
        UsageField::ParentPublicationDate,
        UsageField::ParentArticleVersion,
        UsageField::ParentDataType,
        UsageField::ParentDoi,
        UsageField::ParentProprietaryId,
        UsageField::ParentIsbn,
        UsageField::ParentPrintIssn,
        UsageField::ParentOnlineIssn,
        UsageField::ParentUri,
        UsageField::MetricType,
        UsageField::UsageDate,
        UsageField::UsageCount,
        UsageField::ReportCreationDate,
    ];

    /// Column name in the produced schema
    pub fn column_name(&self) -> &'static str {
        match self {
            UsageField::StatisticsSourceId => "statistics_source_ID",
            UsageField::ReportType => "report_type",
            UsageField::ResourceName => "resource_name",
            UsageField::Publisher => "publisher",
            UsageField::PublisherId => "publisher_ID",
            UsageField::Platform => "platform",
            UsageField::Authors => "authors",
            UsageField::PublicationDate => "publication_date",
            UsageField::ArticleVersion => "article_version",
            UsageField::Doi => "DOI",
            UsageField::ProprietaryId => "proprietary_ID",
            UsageField::Isbn => "ISBN",
            UsageField::PrintIssn => "print_ISSN",
            UsageField::OnlineIssn => "online_ISSN",
            UsageField::Uri => "URI",
            UsageField::DataType => "data_type",
            UsageField::SectionType => "section_type",
            UsageField::Yop => "YOP",
            UsageField::AccessType => "access_type",
            UsageField::AccessMethod => "access_method",
            UsageField::ParentTitle => "parent_title",
            UsageField::ParentAuthors => "parent_authors",
            UsageField::ParentPublicationDate => "parent_publication_date",
            UsageField::ParentArticleVersion => "parent_article_version",
            UsageField::ParentDataType => "parent_data_type",
            UsageField::ParentDoi => "parent_DOI",
            UsageField::ParentProprietaryId => "parent_proprietary_ID",
            UsageField::ParentIsbn => "parent_ISBN",
            UsageField::ParentPrintIssn => "parent_print_ISSN",
            UsageField::ParentOnlineIssn => "parent_online_ISSN",
            UsageField::ParentUri => "parent_URI",
            UsageField::MetricType => "metric_type",
            UsageField::UsageDate => "usage_date",
            UsageField::UsageCount => "usage_count",
            UsageField::ReportCreationDate => "report_creation_date",
        }
    }

    /// Whether `record` carries a value for this column
    pub fn is_populated(&self, record: &UsageRecord) -> bool {
        let item = &record.item;
        let parent = &item.parent;
        match self {
            UsageField::StatisticsSourceId => record.statistics_source_id.is_some(),
            UsageField::ReportType => record.report_type.is_some(),
            UsageField::ResourceName => item.resource_name.is_some(),
            UsageField::Publisher => item.publisher.is_some(),
            UsageField::PublisherId => item.publisher_id.is_some(),
            UsageField::Platform => item.platform.is_some(),
            UsageField::Authors => item.authors.is_some(),
            UsageField::PublicationDate => item.publication_date.is_some(),
            UsageField::ArticleVersion => item.article_version.is_some(),
            UsageField::Doi => item.doi.is_some(),
            UsageField::ProprietaryId => item.proprietary_id.is_some(),
            UsageField::Isbn => item.isbn.is_some(),
            UsageField::PrintIssn => item.print_issn.is_some(),
            UsageField::OnlineIssn => item.online_issn.is_some(),
            UsageField::Uri => item.uri.is_some(),
            UsageField::DataType => item.data_type.is_some(),
            UsageField::SectionType => item.section_type.is_some(),
            UsageField::Yop => item.yop.is_some(),
            UsageField::AccessType => item.access_type.is_some(),
            UsageField::AccessMethod => item.access_method.is_some(),
            UsageField::ParentTitle => parent.title.is_some(),
            UsageField::ParentAuthors => parent.authors.is_some(),
            UsageField::ParentPublicationDate => parent.publication_date.is_some(),
            UsageField::ParentArticleVersion => parent.article_version.is_some(),
            UsageField::ParentDataType => parent.data_type.is_some(),
            UsageField::ParentDoi => parent.doi.is_some(),
            UsageField::ParentProprietaryId => parent.proprietary_id.is_some(),
            UsageField::ParentIsbn => parent.isbn.is_some(),
            UsageField::ParentPrintIssn => parent.print_issn.is_some(),
            UsageField::ParentOnlineIssn => parent.online_issn.is_some(),
            UsageField::ParentUri => parent.uri.is_some(),
            UsageField::MetricType | UsageField::UsageDate | UsageField::UsageCount => true,
            UsageField::ReportCreationDate => record.report_creation_date.is_some(),
        }
    }
}

impl fmt::Display for UsageField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_type_parsing_is_case_insensitive() {
        assert_eq!("tr".parse::<ReportType>().unwrap(), ReportType::TR);
        assert_eq!(" IR ".parse::<ReportType>().unwrap(), ReportType::IR);
        assert!("TR_J1".parse::<ReportType>().is_err());
    }

    #[test]
    fn test_report_path() {
        assert_eq!(ReportType::DR.report_path(), "reports/dr");
    }

    #[test]
    fn test_endpoint_url_joining() {
        let with_slash = SushiEndpoint::new("https://sushi.example.org/r5/", "cust");
        let without_slash = SushiEndpoint::new("https://sushi.example.org/r5", "cust");
        assert_eq!(with_slash.url_for("reports/pr"), "https://sushi.example.org/r5/reports/pr");
        assert_eq!(without_slash.url_for("/status"), "https://sushi.example.org/r5/status");
    }

    #[test]
    fn test_provider_key_is_host() {
        let endpoint = SushiEndpoint::new("https://Sushi.Example.org:8443/r5/", "cust");
        assert_eq!(endpoint.provider_key(), "sushi.example.org:8443");
    }

    #[test]
    fn test_credential_params_skip_missing_values() {
        let mut endpoint = SushiEndpoint::new("https://sushi.example.org", "cust");
        endpoint.api_key = Some("key".to_string());
        let params = endpoint.credential_params();
        assert_eq!(
            params,
            vec![("customer_id", "cust".to_string()), ("api_key", "key".to_string())]
        );
    }

    #[test]
    fn test_all_fields_have_unique_column_names() {
        let mut names: Vec<_> = UsageField::ALL.iter().map(|f| f.column_name()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), UsageField::ALL.len());
    }
}

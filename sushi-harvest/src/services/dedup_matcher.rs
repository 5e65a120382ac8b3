//! Deduplication matcher
//!
//! Finds pairs of resource descriptions that refer to the same resource,
//! typically one from an R4 tabular export and one from an R5 SUSHI harvest.
//! Comparison runs as an ordered list of declarative passes; a pair is
//! confirmed as soon as any pass agrees on every compared field.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use sushi_common::UsageRecord;

/// Minimal resource description compared by the matcher
///
/// Deserializes from both the snake_case R5 record columns and the R4
/// export headings (`Resource_Name`, `Print_ISSN`, ...).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceMetadata {
    #[serde(alias = "Resource_Name", alias = "Title", alias = "Database")]
    pub resource_name: Option<String>,
    #[serde(rename = "DOI", alias = "doi")]
    pub doi: Option<String>,
    #[serde(rename = "ISBN", alias = "isbn")]
    pub isbn: Option<String>,
    #[serde(rename = "print_ISSN", alias = "Print_ISSN", alias = "print_issn")]
    pub print_issn: Option<String>,
    #[serde(rename = "online_ISSN", alias = "Online_ISSN", alias = "online_issn")]
    pub online_issn: Option<String>,
    #[serde(alias = "Data_Type")]
    pub data_type: Option<String>,
}

impl From<&UsageRecord> for ResourceMetadata {
    fn from(record: &UsageRecord) -> Self {
        let item = &record.item;
        Self {
            resource_name: item.resource_name.clone(),
            doi: item.doi.clone(),
            isbn: item.isbn.clone(),
            print_issn: item.print_issn.clone(),
            online_issn: item.online_issn.clone(),
            data_type: item.data_type.clone(),
        }
    }
}

/// Exactly compared identifying field
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MatchField {
    Doi,
    Isbn,
    PrintIssn,
    OnlineIssn,
    DataType,
}

impl MatchField {
    fn value<'a>(&self, resource: &'a ResourceMetadata) -> Option<&'a str> {
        let value = match self {
            MatchField::Doi => resource.doi.as_deref(),
            MatchField::Isbn => resource.isbn.as_deref(),
            MatchField::PrintIssn => resource.print_issn.as_deref(),
            MatchField::OnlineIssn => resource.online_issn.as_deref(),
            MatchField::DataType => resource.data_type.as_deref(),
        };
        value.map(str::trim).filter(|v| !v.is_empty())
    }

    /// Exact equality; DOIs are case-insensitive by definition
    fn agrees(&self, a: &str, b: &str) -> bool {
        match self {
            MatchField::Doi => a.to_lowercase() == b.to_lowercase(),
            _ => a == b,
        }
    }

    /// Identifiers can anchor a match; the data type cannot
    fn is_identifier(&self) -> bool {
        !matches!(self, MatchField::DataType)
    }
}

/// One comparison pass
#[derive(Debug, Clone, Copy)]
pub struct MatchRule {
    pub id: u8,
    /// Fields that must be equal (trimmed; DOI ignores case)
    pub exact: &'static [MatchField],
    /// Minimum name similarity, when the name takes part in the pass
    pub fuzzy_name_threshold: Option<f64>,
    /// Fields that score as agreeing whatever their values
    pub always_match: &'static [MatchField],
}

impl MatchRule {
    /// Highest score a pair can reach in this pass
    pub fn max_score(&self) -> usize {
        self.exact.len() + self.always_match.len() + usize::from(self.fuzzy_name_threshold.is_some())
    }
}

const NAME_THRESHOLD: f64 = 0.9;

/// Comparison passes in evaluation order
pub const MATCH_RULES: [MatchRule; 6] = [
    MatchRule {
        id: 1,
        exact: &[MatchField::Doi, MatchField::Isbn, MatchField::DataType],
        fuzzy_name_threshold: None,
        always_match: &[MatchField::PrintIssn, MatchField::OnlineIssn],
    },
    MatchRule {
        id: 2,
        exact: &[
            MatchField::Doi,
            MatchField::PrintIssn,
            MatchField::OnlineIssn,
            MatchField::DataType,
        ],
        fuzzy_name_threshold: None,
        always_match: &[MatchField::Isbn],
    },
    MatchRule {
        id: 3,
        exact: &[MatchField::Isbn, MatchField::DataType],
        fuzzy_name_threshold: Some(NAME_THRESHOLD),
        always_match: &[MatchField::Doi, MatchField::PrintIssn, MatchField::OnlineIssn],
    },
    MatchRule {
        id: 4,
        exact: &[MatchField::PrintIssn, MatchField::OnlineIssn, MatchField::DataType],
        fuzzy_name_threshold: Some(NAME_THRESHOLD),
        always_match: &[MatchField::Doi, MatchField::Isbn],
    },
    MatchRule {
        id: 5,
        exact: &[MatchField::PrintIssn, MatchField::DataType],
        fuzzy_name_threshold: Some(NAME_THRESHOLD),
        always_match: &[MatchField::Doi, MatchField::Isbn, MatchField::OnlineIssn],
    },
    MatchRule {
        id: 6,
        exact: &[MatchField::OnlineIssn, MatchField::DataType],
        fuzzy_name_threshold: Some(NAME_THRESHOLD),
        always_match: &[MatchField::Doi, MatchField::Isbn, MatchField::PrintIssn],
    },
];

/// Position pair; within one batch `left < right`, against a catalog
/// `left` indexes the records and `right` the catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct MatchPair {
    pub left: usize,
    pub right: usize,
}

/// A pair and the passes that confirmed it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchCandidate {
    pub pair: MatchPair,
    pub passes: Vec<u8>,
}

/// A confirmed pair held back for manual review
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingMatch {
    pub passes: Vec<u8>,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchResult {
    pub confirmed: BTreeSet<MatchPair>,
    pub pending: BTreeMap<MatchPair, PendingMatch>,
}

/// Decides which confirmed pairs need a human to look at them
///
/// Provisional hook: the review criteria are not settled, so the default
/// policy selects nothing.
pub trait PendingConfirmationPolicy {
    /// Reason to hold `candidate` for review, or `None` to confirm it
    fn review_reason(
        &self,
        candidate: &MatchCandidate,
        left: &ResourceMetadata,
        right: &ResourceMetadata,
    ) -> Option<String>;
}

/// Confirms every matched pair
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPendingConfirmation;

impl PendingConfirmationPolicy for NoPendingConfirmation {
    fn review_reason(&self, _: &MatchCandidate, _: &ResourceMetadata, _: &ResourceMetadata) -> Option<String> {
        None
    }
}

/// Holds back pairs that only name-similarity passes confirmed when the
/// names are not identical
#[derive(Debug, Clone, Copy, Default)]
pub struct InexactNameReview;

impl PendingConfirmationPolicy for InexactNameReview {
    fn review_reason(
        &self,
        candidate: &MatchCandidate,
        left: &ResourceMetadata,
        right: &ResourceMetadata,
    ) -> Option<String> {
        let fuzzy_only = candidate.passes.iter().all(|id| {
            MATCH_RULES
                .iter()
                .find(|rule| rule.id == *id)
                .map(|rule| rule.fuzzy_name_threshold.is_some())
                .unwrap_or(false)
        });
        if !fuzzy_only {
            return None;
        }
        let (Some(a), Some(b)) = (left.resource_name.as_deref(), right.resource_name.as_deref()) else {
            return None;
        };
        if normalize_name(a) == normalize_name(b) {
            return None;
        }
        Some(format!(
            "names differ: \"{}\" / \"{}\" (similarity {:.3})",
            a.trim(),
            b.trim(),
            name_similarity(a, b)
        ))
    }
}

/// Multi-pass resource matcher
#[derive(Debug, Clone, Default)]
pub struct DedupMatcher<P = NoPendingConfirmation> {
    policy: P,
}

impl DedupMatcher<NoPendingConfirmation> {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<P: PendingConfirmationPolicy> DedupMatcher<P> {
    pub fn with_policy<Q: PendingConfirmationPolicy>(self, policy: Q) -> DedupMatcher<Q> {
        DedupMatcher { policy }
    }

    /// Pairs confirmed by at least one pass, in pair order
    ///
    /// Without a catalog every unordered pair within `records` is compared;
    /// with one, every (record, catalog entry) pair.
    pub fn candidates(
        &self,
        records: &[ResourceMetadata],
        catalog: Option<&[ResourceMetadata]>,
    ) -> Vec<MatchCandidate> {
        let right_side = catalog.unwrap_or(records);

        let mut candidates = Vec::new();
        for (left, a) in records.iter().enumerate() {
            let start = if catalog.is_some() { 0 } else { left + 1 };
            for (right, b) in right_side.iter().enumerate().skip(start) {
                let passes: Vec<u8> = MATCH_RULES
                    .iter()
                    .filter(|rule| pass_confirms(rule, a, b))
                    .map(|rule| rule.id)
                    .collect();
                if !passes.is_empty() {
                    candidates.push(MatchCandidate {
                        pair: MatchPair { left, right },
                        passes,
                    });
                }
            }
        }
        candidates
    }

    /// Confirmed and pending pairs for `records` (optionally against `catalog`)
    pub fn find_matches(
        &self,
        records: &[ResourceMetadata],
        catalog: Option<&[ResourceMetadata]>,
    ) -> MatchResult {
        let right_side = catalog.unwrap_or(records);
        let mut result = MatchResult::default();

        for candidate in self.candidates(records, catalog) {
            let left = &records[candidate.pair.left];
            let right = &right_side[candidate.pair.right];
            match self.policy.review_reason(&candidate, left, right) {
                Some(reason) => {
                    result.pending.insert(
                        candidate.pair,
                        PendingMatch {
                            passes: candidate.passes,
                            reason,
                        },
                    );
                }
                None => {
                    result.confirmed.insert(candidate.pair);
                }
            }
        }

        tracing::debug!(
            records = records.len(),
            catalog = catalog.map(<[_]>::len).unwrap_or(0),
            confirmed = result.confirmed.len(),
            pending = result.pending.len(),
            "Matching complete"
        );
        result
    }
}

/// Whether `rule` scores the pair at its maximum with a genuine anchor
///
/// A field missing from both records agrees without anchoring; a field
/// present on only one side fails the pass.
fn pass_confirms(rule: &MatchRule, a: &ResourceMetadata, b: &ResourceMetadata) -> bool {
    let mut score = rule.always_match.len();
    let mut anchored = false;

    for field in rule.exact {
        match (field.value(a), field.value(b)) {
            (None, None) => score += 1,
            (Some(x), Some(y)) if field.agrees(x, y) => {
                score += 1;
                anchored |= field.is_identifier();
            }
            _ => return false,
        }
    }

    if let Some(threshold) = rule.fuzzy_name_threshold {
        match (a.resource_name.as_deref(), b.resource_name.as_deref()) {
            (Some(x), Some(y)) if name_similarity(x, y) >= threshold => {
                score += 1;
                anchored = true;
            }
            _ => return false,
        }
    }

    anchored && score == rule.max_score()
}

fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Normalized Levenshtein similarity of trimmed, lowercased names
pub fn name_similarity(a: &str, b: &str) -> f64 {
    strsim::normalized_levenshtein(&normalize_name(a), &normalize_name(b))
}

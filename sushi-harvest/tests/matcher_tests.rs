//! Deduplication matcher tests

mod helpers;

use helpers::*;
use sushi_common::FieldLimits;
use sushi_harvest::services::{
    normalize, DedupMatcher, InexactNameReview, MatchPair, ResourceMetadata,
};

fn resource(
    name: &str,
    doi: Option<&str>,
    isbn: Option<&str>,
    print_issn: Option<&str>,
    online_issn: Option<&str>,
    data_type: &str,
) -> ResourceMetadata {
    ResourceMetadata {
        resource_name: Some(name.to_string()),
        doi: doi.map(str::to_string),
        isbn: isbn.map(str::to_string),
        print_issn: print_issn.map(str::to_string),
        online_issn: online_issn.map(str::to_string),
        data_type: Some(data_type.to_string()),
    }
}

fn pair(left: usize, right: usize) -> MatchPair {
    MatchPair { left, right }
}

/// A batch mixing books and journals
fn books() -> Vec<ResourceMetadata> {
    vec![
        resource("Rust in Action", Some("10.5555/ria"), Some("978-1-61729-556-8"), None, None, "Book"),
        resource("RUST IN ACTION, 2nd printing", Some("10.5555/RIA"), Some("978-1-61729-556-8"), None, None, "Book"),
        resource("Journal of Applied Things", Some("10.5555/jat"), None, Some("1234-5678"), Some("8765-4321"), "Journal"),
        resource("Journal of Applied Thing", None, None, Some("1234-5678"), Some("8765-4321"), "Journal"),
        resource("Annals of Stuff", None, None, None, Some("2345-6789"), "Journal"),
        resource("Completely Different Quarterly", None, None, None, Some("9999-0000"), "Journal"),
    ]
}

#[test]
fn test_identical_doi_isbn_and_type_match_despite_names() {
    let result = DedupMatcher::new().find_matches(&books(), None);

    assert!(result.confirmed.contains(&pair(0, 1)));
}

#[test]
fn test_issn_pair_with_similar_names_matches() {
    let result = DedupMatcher::new().find_matches(&books(), None);

    assert!(result.confirmed.contains(&pair(2, 3)));
}

#[test]
fn test_unrelated_resources_never_match() {
    let result = DedupMatcher::new().find_matches(&books(), None);

    // No shared identifier and dissimilar names
    assert!(!result.confirmed.contains(&pair(4, 5)));
    assert!(!result.pending.contains_key(&pair(4, 5)));
    assert_eq!(result.confirmed.len(), 2);
    assert!(result.pending.is_empty());
}

#[test]
fn test_pair_ignores_identifiers_carried_by_other_records() {
    let a = resource("Rust in Action", None, Some("978-1-61729-556-8"), None, None, "Book");
    let b = resource("Systems Programming Handbook", None, Some("978-1-61729-556-8"), None, None, "Book");
    let c = resource("Annals of Stuff", Some("10.5555/stuff"), None, None, Some("2345-6789"), "Journal");

    let pair_only = DedupMatcher::new().find_matches(&[a.clone(), b.clone()], None);
    let with_third = DedupMatcher::new().find_matches(&[a, b, c], None);

    assert!(pair_only.confirmed.contains(&pair(0, 1)));
    assert_eq!(with_third.confirmed, pair_only.confirmed);
}

#[test]
fn test_same_issn_different_type_does_not_match() {
    let records = vec![
        resource("Annals of Stuff", None, None, None, Some("2345-6789"), "Journal"),
        resource("Annals of Stuff", None, None, None, Some("2345-6789"), "Database"),
    ];

    let result = DedupMatcher::new().find_matches(&records, None);

    assert!(result.confirmed.is_empty());
}

#[test]
fn test_matching_is_repeatable() {
    let matcher = DedupMatcher::new();
    let first = matcher.find_matches(&books(), None);
    let second = matcher.find_matches(&books(), None);

    assert_eq!(first, second);
}

#[test]
fn test_catalog_mode_compares_records_to_catalog_entries() {
    let records = vec![
        resource("Annals of Stuff", None, None, None, Some("2345-6789"), "Journal"),
        resource("Rust in Action", Some("10.5555/ria"), Some("978-1-61729-556-8"), None, None, "Book"),
    ];
    let catalog = books();

    let result = DedupMatcher::new().find_matches(&records, Some(&catalog));

    assert!(result.confirmed.contains(&pair(0, 4)));
    assert!(result.confirmed.contains(&pair(1, 0)));
    assert!(result.confirmed.contains(&pair(1, 1)));
    // Records are never compared with each other in catalog mode
    assert!(result.confirmed.iter().all(|p| p.right < catalog.len()));
}

#[test]
fn test_inexact_name_review_holds_fuzzy_only_pairs() {
    let result = DedupMatcher::new()
        .with_policy(InexactNameReview)
        .find_matches(&books(), None);

    // Identifier pass confirmed the book pair outright
    assert!(result.confirmed.contains(&pair(0, 1)));
    // The journal pair only matched on similar names; the DOI on one side
    // rules out the identifier passes
    assert!(!result.confirmed.contains(&pair(2, 3)));
    assert!(result.pending.contains_key(&pair(2, 3)));
}

#[test]
fn test_r4_tabular_rows_deserialize() {
    let rows = r#"[
        {"Resource_Name": "Journal of Applied Things", "Publisher": "Example", "Print_ISSN": "1234-5678",
         "Online_ISSN": "8765-4321", "Data_Type": "Journal"},
        {"resource_name": "Journal of Applied Things", "print_ISSN": "1234-5678",
         "online_ISSN": "8765-4321", "data_type": "Journal", "metric_type": "Total_Item_Requests"}
    ]"#;
    let records: Vec<ResourceMetadata> = serde_json::from_str(rows).unwrap();

    assert_eq!(records[0], records[1]);
    let result = DedupMatcher::new().find_matches(&records, None);
    assert!(result.confirmed.contains(&pair(0, 1)));
}

#[test]
fn test_normalized_records_feed_the_matcher() {
    let records = normalize(&fixture_json("tr_two_items.json"), &FieldLimits::default()).unwrap();
    let resources: Vec<ResourceMetadata> = records.iter().map(ResourceMetadata::from).collect();

    let result = DedupMatcher::new().find_matches(&resources, None);

    // The six rows of the first title all describe one resource
    for left in 0..6 {
        for right in (left + 1)..6 {
            assert!(result.confirmed.contains(&pair(left, right)));
        }
    }
    assert!(!result.confirmed.contains(&pair(0, 6)));
}

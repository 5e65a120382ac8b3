//! COUNTER R5 report JSON types
//!
//! Providers are loose with the JSON they emit: lists arrive as single
//! objects or `null`, identifiers arrive as numbers, `Item_ID` arrives as a
//! list of `{Type, Value}` or (R5.1) as an object keyed by type. The
//! deserializers here absorb those variations once, at the ingestion
//! boundary, so the normalizer works on one shape.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// A complete master report body
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CounterReport {
    #[serde(rename = "Report_Header", default)]
    pub header: Option<ReportHeader>,
    #[serde(rename = "Report_Items", default, deserialize_with = "list_or_one")]
    pub items: Vec<ReportItem>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReportHeader {
    #[serde(rename = "Created", default, deserialize_with = "opt_text")]
    pub created: Option<String>,
}

/// `{Type, Value}` pair used by `Item_ID`, `Publisher_ID`, `Item_Dates` and
/// `Item_Attributes`
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct TypeValue {
    #[serde(rename = "Type", default, deserialize_with = "opt_text")]
    pub kind: Option<String>,
    #[serde(rename = "Value", default, deserialize_with = "opt_text")]
    pub value: Option<String>,
}

impl TypeValue {
    pub fn is(&self, kind: &str) -> bool {
        self.kind
            .as_deref()
            .map(|k| k.trim().eq_ignore_ascii_case(kind))
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Contributor {
    #[serde(rename = "Type", default, deserialize_with = "opt_text")]
    pub kind: Option<String>,
    #[serde(rename = "Name", default, deserialize_with = "opt_text")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReportItem {
    #[serde(rename = "Database", default, deserialize_with = "opt_text")]
    pub database: Option<String>,
    #[serde(rename = "Title", default, deserialize_with = "opt_text")]
    pub title: Option<String>,
    #[serde(rename = "Item", default, deserialize_with = "opt_text")]
    pub item: Option<String>,
    #[serde(rename = "Publisher", default, deserialize_with = "opt_text")]
    pub publisher: Option<String>,
    #[serde(rename = "Publisher_ID", default, deserialize_with = "identifiers")]
    pub publisher_id: Vec<TypeValue>,
    #[serde(rename = "Platform", default, deserialize_with = "opt_text")]
    pub platform: Option<String>,
    #[serde(rename = "Item_Contributors", default, deserialize_with = "list_or_one")]
    pub contributors: Vec<Contributor>,
    #[serde(rename = "Item_Dates", default, deserialize_with = "list_or_one")]
    pub dates: Vec<TypeValue>,
    #[serde(rename = "Item_Attributes", default, deserialize_with = "list_or_one")]
    pub attributes: Vec<TypeValue>,
    #[serde(rename = "Item_ID", default, deserialize_with = "identifiers")]
    pub ids: Vec<TypeValue>,
    #[serde(rename = "Data_Type", default, deserialize_with = "opt_text")]
    pub data_type: Option<String>,
    #[serde(rename = "Section_Type", default, deserialize_with = "opt_text")]
    pub section_type: Option<String>,
    #[serde(rename = "YOP", default, deserialize_with = "opt_text")]
    pub yop: Option<String>,
    #[serde(rename = "Access_Type", default, deserialize_with = "opt_text")]
    pub access_type: Option<String>,
    #[serde(rename = "Access_Method", default, deserialize_with = "opt_text")]
    pub access_method: Option<String>,
    #[serde(rename = "Item_Parent", default, deserialize_with = "first_of_one_or_many")]
    pub parent: Option<ItemParent>,
    #[serde(rename = "Performance", default, deserialize_with = "list_or_one")]
    pub performance: Vec<Performance>,
}

impl ReportItem {
    /// Resource name from whichever of `Database`, `Title`, `Item` is present
    pub fn resource_name(&self) -> Option<&str> {
        self.database
            .as_deref()
            .or(self.title.as_deref())
            .or(self.item.as_deref())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ItemParent {
    #[serde(rename = "Item_Name", default, deserialize_with = "opt_text")]
    pub name: Option<String>,
    #[serde(rename = "Item_ID", default, deserialize_with = "identifiers")]
    pub ids: Vec<TypeValue>,
    #[serde(rename = "Item_Contributors", default, deserialize_with = "list_or_one")]
    pub contributors: Vec<Contributor>,
    #[serde(rename = "Item_Dates", default, deserialize_with = "list_or_one")]
    pub dates: Vec<TypeValue>,
    #[serde(rename = "Item_Attributes", default, deserialize_with = "list_or_one")]
    pub attributes: Vec<TypeValue>,
    #[serde(rename = "Data_Type", default, deserialize_with = "opt_text")]
    pub data_type: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Performance {
    #[serde(rename = "Period", default)]
    pub period: Option<Period>,
    #[serde(rename = "Instance", default, deserialize_with = "list_or_one")]
    pub instances: Vec<Instance>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Period {
    #[serde(rename = "Begin_Date", default, deserialize_with = "opt_text")]
    pub begin_date: Option<String>,
}

/// One metric count; `Count` is kept raw and validated by the normalizer
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Instance {
    #[serde(rename = "Metric_Type", default, deserialize_with = "opt_text")]
    pub metric_type: Option<String>,
    #[serde(rename = "Count", default)]
    pub count: Value,
}

// ============================================================================
// Lenient deserializers
// ============================================================================

/// Text that may arrive as a string, number or boolean; blank becomes `None`
fn opt_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(value_text(&value))
}

fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// `null` → empty, single object → one element, list → list
fn list_or_one<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    let items = match value {
        Value::Null => Vec::new(),
        Value::Array(items) => items,
        other => vec![other],
    };
    items
        .into_iter()
        .filter(|item| !item.is_null())
        .map(|item| serde_json::from_value(item).map_err(serde::de::Error::custom))
        .collect()
}

/// First element of a one-or-many value
fn first_of_one_or_many<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let items: Vec<T> = list_or_one(deserializer)?;
    Ok(items.into_iter().next())
}

/// Identifier lists in either the R5 `[{Type, Value}]` form or the R5.1
/// `{Type: Value}` / `{Type: [Value, ...]}` form
fn identifiers<'de, D>(deserializer: D) -> Result<Vec<TypeValue>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    match value {
        Value::Null => Ok(Vec::new()),
        Value::Array(items) => items
            .into_iter()
            .filter(|item| !item.is_null())
            .map(|item| serde_json::from_value(item).map_err(serde::de::Error::custom))
            .collect(),
        Value::Object(map) if map.contains_key("Type") || map.contains_key("Value") => {
            serde_json::from_value(Value::Object(map))
                .map(|tv| vec![tv])
                .map_err(serde::de::Error::custom)
        }
        Value::Object(map) => {
            let mut ids = Vec::new();
            for (kind, entry) in map {
                let values = match entry {
                    Value::Array(values) => values,
                    other => vec![other],
                };
                ids.extend(values.iter().filter_map(value_text).map(|value| TypeValue {
                    kind: Some(kind.clone()),
                    value: Some(value),
                }));
            }
            Ok(ids)
        }
        other => Err(serde::de::Error::custom(format!(
            "identifier list expected, found {}",
            other
        ))),
    }
}

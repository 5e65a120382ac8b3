//! COUNTER exception detection
//!
//! SUSHI providers report problems inside otherwise successful HTTP
//! responses, and they do so in several shapes. A parsed body is scanned in
//! this order:
//!
//! 1. `Report_Header.Exceptions` (exceptions attached to a master report)
//! 2. a bare object carrying `Code`/`code` at the top level
//! 3. `Exception.Severity` nested one level under the top level
//! 4. a top-level `Severity` key
//! 5. a top-level `Alerts` array
//!
//! The first of 1-4 that matches makes the response blocking. Alerts are
//! advisory and never block.

use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;

/// "No Usage Available for Requested Dates"
pub const NO_USAGE_AVAILABLE: i64 = 3030;
/// "Usage Not Ready for Requested Dates"
pub const USAGE_NOT_READY: i64 = 3031;
/// "Usage No Longer Available for Requested Dates"
pub const USAGE_NO_LONGER_AVAILABLE: i64 = 3032;

/// One exception or alert reported by a SUSHI provider
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CounterException {
    pub code: Option<i64>,
    pub severity: Option<String>,
    pub message: Option<String>,
    pub data: Option<String>,
}

impl CounterException {
    /// Build from an exception object, tolerating key casing and string codes
    pub fn from_value(value: &Value) -> Option<Self> {
        let object = value.as_object()?;
        let code = get_ci(object, "Code").and_then(|v| match v {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        });
        let exception = Self {
            code,
            severity: get_ci(object, "Severity").and_then(text),
            message: get_ci(object, "Message").and_then(text),
            data: get_ci(object, "Data").and_then(text),
        };
        if exception == Self::default() {
            return None;
        }
        Some(exception)
    }

    /// Build from a status `Alerts` entry (`{Date_Time, Alert}`)
    pub fn from_alert(value: &Value) -> Self {
        match value.as_object() {
            Some(object) => Self {
                code: None,
                severity: Some("Alert".to_string()),
                message: get_ci(object, "Alert").and_then(text),
                data: get_ci(object, "Date_Time").and_then(text),
            },
            None => Self {
                severity: Some("Alert".to_string()),
                message: text(value),
                ..Self::default()
            },
        }
    }

    /// Whether the provider is saying there is simply no usage to report
    pub fn is_no_usage(&self) -> bool {
        matches!(
            self.code,
            Some(NO_USAGE_AVAILABLE) | Some(USAGE_NOT_READY) | Some(USAGE_NO_LONGER_AVAILABLE)
        )
    }
}

impl fmt::Display for CounterException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "{}", code)?,
            None => f.write_str("COUNTER")?,
        }
        if let Some(severity) = &self.severity {
            write!(f, " ({})", severity)?;
        }
        write!(
            f,
            ": {}",
            self.message.as_deref().unwrap_or("no message provided")
        )?;
        if let Some(data) = &self.data {
            write!(f, " [{}]", data)?;
        }
        Ok(())
    }
}

/// Outcome of scanning one response body
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExceptionScan {
    /// Exceptions that prevent the payload from being used
    pub blocking: Vec<CounterException>,
    /// Alerts that are recorded but do not stop processing
    pub advisory: Vec<CounterException>,
}

impl ExceptionScan {
    pub fn is_blocking(&self) -> bool {
        !self.blocking.is_empty()
    }
}

/// Scan a parsed SUSHI body for COUNTER exceptions and alerts
pub fn scan(body: &Map<String, Value>) -> ExceptionScan {
    let blocking = header_exceptions(body)
        .or_else(|| top_level_code(body))
        .or_else(|| nested_exception(body))
        .or_else(|| top_level_severity(body))
        .unwrap_or_default();

    let advisory = body
        .get("Alerts")
        .and_then(Value::as_array)
        .map(|alerts| alerts.iter().map(CounterException::from_alert).collect())
        .unwrap_or_default();

    ExceptionScan { blocking, advisory }
}

/// `Report_Header.Exceptions`; a single object is accepted in place of a list
fn header_exceptions(body: &Map<String, Value>) -> Option<Vec<CounterException>> {
    let header = body.get("Report_Header")?.as_object()?;
    let exceptions = match header.get("Exceptions").or_else(|| header.get("Exception"))? {
        Value::Array(items) => items
            .iter()
            .filter_map(CounterException::from_value)
            .collect::<Vec<_>>(),
        other => CounterException::from_value(other).into_iter().collect(),
    };
    if exceptions.is_empty() {
        None
    } else {
        Some(exceptions)
    }
}

fn top_level_code(body: &Map<String, Value>) -> Option<Vec<CounterException>> {
    if body.contains_key("Code") || body.contains_key("code") {
        let exception = CounterException::from_value(&Value::Object(body.clone()))?;
        return Some(vec![exception]);
    }
    None
}

fn nested_exception(body: &Map<String, Value>) -> Option<Vec<CounterException>> {
    let nested = body.get("Exception")?;
    nested.as_object()?.get("Severity")?;
    CounterException::from_value(nested).map(|e| vec![e])
}

fn top_level_severity(body: &Map<String, Value>) -> Option<Vec<CounterException>> {
    if !body.contains_key("Severity") {
        return None;
    }
    CounterException::from_value(&Value::Object(body.clone())).map(|e| vec![e])
}

/// Case-insensitive key lookup
fn get_ci<'a>(object: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    object.get(key).or_else(|| {
        object
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v)
    })
}

fn text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) if s.trim().is_empty() => None,
        Value::String(s) => Some(s.trim().to_string()),
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_report_header_exceptions_block() {
        let body = object(json!({
            "Report_Header": {
                "Report_ID": "TR",
                "Exceptions": [
                    {"Code": 3030, "Severity": "Error", "Message": "No Usage Available for Requested Dates"}
                ]
            },
            "Report_Items": []
        }));

        let scan = scan(&body);
        assert!(scan.is_blocking());
        assert_eq!(scan.blocking[0].code, Some(3030));
        assert!(scan.blocking[0].is_no_usage());
    }

    #[test]
    fn test_empty_header_exception_list_does_not_block() {
        let body = object(json!({"Report_Header": {"Exceptions": []}, "Report_Items": []}));
        assert!(!scan(&body).is_blocking());
    }

    #[test]
    fn test_bare_lowercase_code_body_blocks() {
        let body = object(json!({"code": "2000", "message": "Requestor Not Authorized"}));

        let scan = scan(&body);
        assert_eq!(scan.blocking.len(), 1);
        assert_eq!(scan.blocking[0].code, Some(2000));
        assert_eq!(scan.blocking[0].message.as_deref(), Some("Requestor Not Authorized"));
    }

    #[test]
    fn test_nested_exception_with_severity_blocks() {
        let body = object(json!({
            "Description": "Service status",
            "Exception": {"Code": 1000, "Severity": "Fatal", "Message": "Service Not Available"}
        }));

        let scan = scan(&body);
        assert_eq!(scan.blocking[0].code, Some(1000));
        assert!(!scan.blocking[0].is_no_usage());
    }

    #[test]
    fn test_nested_exception_without_severity_is_ignored() {
        let body = object(json!({"Exception": {"Message": "informational"}}));
        assert!(!scan(&body).is_blocking());
    }

    #[test]
    fn test_top_level_severity_blocks() {
        let body = object(json!({"Severity": "Error", "Message": "Invalid API Key"}));
        assert!(scan(&body).is_blocking());
    }

    #[test]
    fn test_alerts_are_advisory_only() {
        let body = object(json!({
            "Service_Active": true,
            "Alerts": [{"Date_Time": "2023-01-01T00:00:00Z", "Alert": "Maintenance on Sunday"}]
        }));

        let scan = scan(&body);
        assert!(!scan.is_blocking());
        assert_eq!(scan.advisory.len(), 1);
        assert_eq!(scan.advisory[0].message.as_deref(), Some("Maintenance on Sunday"));
    }

    #[test]
    fn test_display_includes_code_severity_and_data() {
        let exception = CounterException {
            code: Some(3031),
            severity: Some("Warning".to_string()),
            message: Some("Usage Not Ready for Requested Dates".to_string()),
            data: Some("2023-06".to_string()),
        };
        assert_eq!(
            exception.to_string(),
            "3031 (Warning): Usage Not Ready for Requested Dates [2023-06]"
        );
    }
}

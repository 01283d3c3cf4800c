//! Business rules evaluated after schema validation. Each rule scores one
//! quality category so rejections roll up into per-category metrics.

use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::quality::metrics::QualityCategory;
use crate::record::Record;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuleKind {
    /// Payload must not be JSON null.
    PayloadNotNull,
    /// Field must be present and non-empty (non-empty string, non-empty
    /// array/object, or any other non-null value).
    NonEmpty { field: String },
    /// Numeric field must fall within `[min, max]`.
    InRange { field: String, min: f64, max: f64 },
    /// String field must be one of the allowed values.
    OneOf { field: String, allowed: Vec<String> },
    /// Event time must not be ahead of ingestion by more than `tolerance`.
    EventTimeNotFuture { tolerance: Duration },
    /// Event time must not be older than `age` at evaluation time.
    MaxEventAge { age: Duration },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusinessRule {
    pub name: String,
    pub category: QualityCategory,
    pub kind: RuleKind,
}

impl BusinessRule {
    pub fn new(
        name: impl Into<String>,
        category: QualityCategory,
        kind: RuleKind,
    ) -> Self {
        Self {
            name: name.into(),
            category,
            kind,
        }
    }

    /// `None` when the rule passes, a failure message otherwise.
    pub fn evaluate(&self, record: &Record) -> Option<String> {
        match &self.kind {
            RuleKind::PayloadNotNull => {
                if record.data.is_null() {
                    return Some(format!("rule {}: payload is null", self.name));
                }
            }
            RuleKind::NonEmpty { field } => match record.data.get(field) {
                None | Some(Value::Null) => {
                    return Some(format!("rule {}: field '{field}' is missing", self.name));
                }
                Some(Value::String(s)) if s.is_empty() => {
                    return Some(format!("rule {}: field '{field}' is empty", self.name));
                }
                Some(Value::Array(a)) if a.is_empty() => {
                    return Some(format!("rule {}: field '{field}' is empty", self.name));
                }
                Some(Value::Object(o)) if o.is_empty() => {
                    return Some(format!("rule {}: field '{field}' is empty", self.name));
                }
                Some(_) => {}
            },
            RuleKind::InRange { field, min, max } => {
                let Some(value) = record.data.get(field).and_then(Value::as_f64) else {
                    return Some(format!(
                        "rule {}: field '{field}' is not a number",
                        self.name
                    ));
                };
                if value < *min || value > *max {
                    return Some(format!(
                        "rule {}: field '{field}' value {value} outside [{min}, {max}]",
                        self.name
                    ));
                }
            }
            RuleKind::OneOf { field, allowed } => {
                let Some(value) = record.data.get(field).and_then(Value::as_str) else {
                    return Some(format!(
                        "rule {}: field '{field}' is not a string",
                        self.name
                    ));
                };
                if !allowed.iter().any(|a| a == value) {
                    return Some(format!(
                        "rule {}: field '{field}' value '{value}' not allowed",
                        self.name
                    ));
                }
            }
            RuleKind::EventTimeNotFuture { tolerance } => {
                let tolerance = chrono::Duration::from_std(*tolerance).unwrap_or_default();
                if record.event_time > Utc::now() + tolerance {
                    return Some(format!(
                        "rule {}: event time {} is in the future",
                        self.name, record.event_time
                    ));
                }
            }
            RuleKind::MaxEventAge { age } => {
                let age = chrono::Duration::from_std(*age)
                    .unwrap_or_else(|_| chrono::Duration::MAX);
                if record.event_time < Utc::now() - age {
                    return Some(format!(
                        "rule {}: event time {} is too old",
                        self.name, record.event_time
                    ));
                }
            }
        }
        None
    }
}

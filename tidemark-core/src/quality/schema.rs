//! Schema validation over the JSON payload of a record: field presence and
//! type checks against a named schema definition.

use chrono::DateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::quality::CheckOutcome;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    String,
    Number,
    Boolean,
    /// RFC 3339 string or millisecond epoch number.
    Timestamp,
    Object,
    Array,
    Any,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    pub kind: FieldKind,
    pub required: bool,
}

impl FieldSpec {
    pub fn required(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            required: true,
        }
    }

    pub fn optional(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            required: false,
        }
    }

    fn matches(&self, value: &Value) -> bool {
        match self.kind {
            FieldKind::String => value.is_string(),
            FieldKind::Number => value.is_number(),
            FieldKind::Boolean => value.is_boolean(),
            FieldKind::Timestamp => match value {
                Value::String(s) => DateTime::parse_from_rfc3339(s).is_ok(),
                Value::Number(n) => n.is_i64() || n.is_u64(),
                _ => false,
            },
            FieldKind::Object => value.is_object(),
            FieldKind::Array => value.is_array(),
            FieldKind::Any => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaDefinition {
    pub name: String,
    pub fields: Vec<FieldSpec>,
}

impl SchemaDefinition {
    pub fn new(name: impl Into<String>, fields: Vec<FieldSpec>) -> Self {
        Self {
            name: name.into(),
            fields,
        }
    }

    /// A schema with no field constraints; accepts any payload.
    pub fn permissive(name: impl Into<String>) -> Self {
        Self::new(name, Vec::new())
    }

    pub fn validate(&self, data: &Value) -> CheckOutcome {
        if self.fields.is_empty() {
            return CheckOutcome::pass();
        }

        let Some(object) = data.as_object() else {
            return CheckOutcome::fail(vec![format!(
                "schema {}: payload is not an object",
                self.name
            )]);
        };

        let mut failures = Vec::new();
        for field in &self.fields {
            match object.get(&field.name) {
                None | Some(Value::Null) => {
                    if field.required {
                        failures.push(format!(
                            "schema {}: missing required field '{}'",
                            self.name, field.name
                        ));
                    }
                }
                Some(value) => {
                    if !field.matches(value) {
                        failures.push(format!(
                            "schema {}: field '{}' is not a {:?}",
                            self.name, field.name, field.kind
                        ));
                    }
                }
            }
        }
        CheckOutcome::from_failures(failures)
    }
}

//! Sparse partial-update payloads
//!
//! A step only ever writes the fields it owns, and only the ones the user
//! actually filled in. Absent values (null, empty strings, empty arrays, empty
//! objects) are dropped so a submission never blanks data stored by an earlier
//! visit or by another step. Nested groups are emitted only when at least one
//! nested field is present.

use serde_json::{Map, Value};
use thiserror::Error;

use crate::wizard::{FieldSpec, StepDefinition};

/// Field values supplied by the form layer for one step
pub type FieldValues = Map<String, Value>;

/// Sparse payload a step is about to write
pub type Payload = Map<String, Value>;

/// Whether a value carries user data
///
/// `false` and `0` are real answers and count as present.
pub fn is_present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(fields) => !fields.is_empty(),
        Value::Bool(_) | Value::Number(_) => true,
    }
}

/// Build the sparse payload for a step from the user's field values
///
/// Keys outside the step's owned fields are ignored.
pub fn encode(step: &StepDefinition, values: &FieldValues) -> Payload {
    encode_fields(&step.fields, values)
}

fn encode_fields(specs: &[FieldSpec], values: &FieldValues) -> Payload {
    let mut payload = Payload::new();

    for spec in specs {
        let Some(value) = values.get(&spec.name) else {
            continue;
        };

        if spec.is_group() {
            // A scalar where a group belongs is not the step's shape
            if let Value::Object(nested) = value {
                let sub = encode_fields(&spec.fields, nested);
                if !sub.is_empty() {
                    payload.insert(spec.name.clone(), Value::Object(sub));
                }
            }
        } else if is_present(value) {
            payload.insert(spec.name.clone(), value.clone());
        }
    }

    payload
}

/// Empty form values for a step: `""` for scalars, nested groups recursively
pub fn empty_defaults(step: &StepDefinition) -> FieldValues {
    defaults_for(&step.fields)
}

fn defaults_for(specs: &[FieldSpec]) -> FieldValues {
    specs
        .iter()
        .map(|spec| {
            let value = if spec.is_group() {
                Value::Object(defaults_for(&spec.fields))
            } else {
                Value::String(String::new())
            };
            (spec.name.clone(), value)
        })
        .collect()
}

/// Project a stored fragment onto a step's field shape
///
/// Owned fields missing from the fragment (or stored as null) fall back to
/// their empty default; fields the step does not own are dropped.
pub fn project(step: &StepDefinition, fragment: Option<&Map<String, Value>>) -> FieldValues {
    project_fields(&step.fields, fragment)
}

fn project_fields(specs: &[FieldSpec], stored: Option<&Map<String, Value>>) -> FieldValues {
    let mut values = FieldValues::new();

    for spec in specs {
        let stored_value = stored.and_then(|s| s.get(&spec.name));
        let value = if spec.is_group() {
            Value::Object(project_fields(
                &spec.fields,
                stored_value.and_then(Value::as_object),
            ))
        } else {
            match stored_value {
                Some(v) if !v.is_null() => v.clone(),
                _ => Value::String(String::new()),
            }
        };
        values.insert(spec.name.clone(), value);
    }

    values
}

/// Merge a sparse payload into a stored fragment
///
/// Nested objects merge recursively; any other value replaces the stored one.
pub fn deep_merge(target: &mut Map<String, Value>, payload: &Payload) {
    for (key, incoming) in payload {
        match (target.get_mut(key), incoming) {
            (Some(Value::Object(existing)), Value::Object(nested)) => {
                deep_merge(existing, nested);
            }
            _ => {
                target.insert(key.clone(), incoming.clone());
            }
        }
    }
}

/// Errors parsing `key=value` field assignments
#[derive(Debug, Error, PartialEq)]
pub enum AssignmentError {
    #[error("expected key=value or key:=json, got '{0}'")]
    MissingSeparator(String),

    #[error("empty field name in '{0}'")]
    EmptyKey(String),

    #[error("invalid JSON value for '{key}': {message}")]
    InvalidJson { key: String, message: String },

    #[error("'{0}' is already set to a non-object value")]
    PathConflict(String),
}

/// Parse one `key=value` or `key:=json` assignment into `values`
///
/// Dotted keys address nested groups: `address.city=Pune`.
pub fn parse_assignment(values: &mut FieldValues, raw: &str) -> Result<(), AssignmentError> {
    let Some(eq) = raw.find('=') else {
        return Err(AssignmentError::MissingSeparator(raw.to_string()));
    };
    let rest = &raw[eq + 1..];

    let (key, value) = if let Some(key) = raw[..eq].strip_suffix(':') {
        let value = serde_json::from_str(rest).map_err(|e| AssignmentError::InvalidJson {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        (key, value)
    } else {
        (&raw[..eq], Value::String(rest.to_string()))
    };

    let path: Vec<&str> = key.split('.').collect();
    if path.iter().any(|segment| segment.trim().is_empty()) {
        return Err(AssignmentError::EmptyKey(raw.to_string()));
    }

    insert_path(values, &path, value, key)
}

fn insert_path(
    values: &mut FieldValues,
    path: &[&str],
    value: Value,
    full_key: &str,
) -> Result<(), AssignmentError> {
    match path {
        [] => Ok(()),
        [last] => {
            values.insert((*last).to_string(), value);
            Ok(())
        }
        [head, rest @ ..] => {
            let entry = values
                .entry((*head).to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            match entry {
                Value::Object(nested) => insert_path(nested, rest, value, full_key),
                _ => Err(AssignmentError::PathConflict(full_key.to_string())),
            }
        }
    }
}

//! Step validation contract
//!
//! Concrete field rules belong to the form layer. The controller only needs a
//! `Validator` to call before it builds a payload; `RequiredFields` covers the
//! `required` flags declared in wizard definitions.

use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

use crate::merge::{is_present, FieldValues};
use crate::wizard::{FieldSpec, StepDefinition};

/// Outcome of validating one step's field values
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Validation {
    /// Field path -> message; empty when valid
    pub field_errors: BTreeMap<String, String>,
}

impl Validation {
    pub fn valid() -> Self {
        Self::default()
    }

    pub fn is_valid(&self) -> bool {
        self.field_errors.is_empty()
    }

    pub fn with_error(mut self, field: impl Into<String>, message: impl Into<String>) -> Self {
        self.field_errors.insert(field.into(), message.into());
        self
    }
}

/// Validates a step's field values before submission
pub trait Validator: Send + Sync {
    fn validate(&self, step: &StepDefinition, values: &FieldValues) -> Validation;
}

impl<F> Validator for F
where
    F: Fn(&StepDefinition, &FieldValues) -> Validation + Send + Sync,
{
    fn validate(&self, step: &StepDefinition, values: &FieldValues) -> Validation {
        self(step, values)
    }
}

/// Accepts everything
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl Validator for AcceptAll {
    fn validate(&self, _step: &StepDefinition, _values: &FieldValues) -> Validation {
        Validation::valid()
    }
}

/// Rejects submissions that leave a `required` field absent
///
/// A required group needs at least one present nested field.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequiredFields;

impl Validator for RequiredFields {
    fn validate(&self, step: &StepDefinition, values: &FieldValues) -> Validation {
        let mut validation = Validation::valid();
        check_required(&step.fields, values, "", &mut validation);
        validation
    }
}

fn check_required(
    specs: &[FieldSpec],
    values: &FieldValues,
    prefix: &str,
    validation: &mut Validation,
) {
    for spec in specs {
        let path = if prefix.is_empty() {
            spec.name.clone()
        } else {
            format!("{}.{}", prefix, spec.name)
        };
        let value = values.get(&spec.name);

        if spec.is_group() {
            let nested = value.and_then(Value::as_object);
            let any_present = nested.is_some_and(|n| group_has_present(&spec.fields, n));
            if spec.required && !any_present {
                validation
                    .field_errors
                    .insert(path.clone(), "at least one field is required".to_string());
            }
            // Nested required fields only bind once the group is being filled in
            if let Some(nested) = nested.filter(|_| any_present || spec.required) {
                check_required(&spec.fields, nested, &path, validation);
            }
        } else if spec.required && !value.is_some_and(is_present) {
            validation
                .field_errors
                .insert(path, "this field is required".to_string());
        }
    }
}

fn group_has_present(specs: &[FieldSpec], values: &FieldValues) -> bool {
    specs.iter().any(|spec| match values.get(&spec.name) {
        Some(Value::Object(nested)) if spec.is_group() => group_has_present(&spec.fields, nested),
        Some(value) => !spec.is_group() && is_present(value),
        None => false,
    })
}

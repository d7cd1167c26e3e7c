//! Static description of the steps that compose an entity

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors in a wizard definition or a step lookup against it
#[derive(Debug, Clone, Error, PartialEq)]
pub enum WizardError {
    #[error("wizard '{key}' is invalid: {}", .errors.join("; "))]
    Invalid { key: String, errors: Vec<String> },

    #[error("wizard '{wizard}' has no step named '{step}'")]
    UnknownStep { wizard: String, step: String },

    #[error("unknown wizard '{0}'")]
    UnknownWizard(String),
}

/// A field owned by a step: a scalar, or a nested group of fields
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FieldSpec {
    /// Field key in the fragment
    pub name: String,
    /// Help text for the field
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Whether the form must supply a value before submitting
    #[serde(default)]
    pub required: bool,
    /// Nested fields; empty for scalar fields
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<FieldSpec>,
}

impl FieldSpec {
    pub fn scalar(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            required: false,
            fields: Vec::new(),
        }
    }

    pub fn group(name: impl Into<String>, fields: Vec<FieldSpec>) -> Self {
        Self {
            name: name.into(),
            description: None,
            required: false,
            fields,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn is_group(&self) -> bool {
        !self.fields.is_empty()
    }

    /// Dotted paths of every scalar leaf under this field
    pub fn leaf_paths(&self) -> Vec<String> {
        if self.is_group() {
            self.fields
                .iter()
                .flat_map(FieldSpec::leaf_paths)
                .map(|leaf| format!("{}.{}", self.name, leaf))
                .collect()
        } else {
            vec![self.name.clone()]
        }
    }
}

/// One screen of a wizard, owning a disjoint fragment of the entity
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StepDefinition {
    /// Step identifier, also the fragment key on the record
    pub name: String,
    /// Human-readable step name
    #[serde(default)]
    pub display_name: Option<String>,
    /// Fields this step owns
    pub fields: Vec<FieldSpec>,
    /// Explicit terminal marker; only valid on the last step
    #[serde(default)]
    pub terminal: bool,
}

impl StepDefinition {
    pub fn new(name: impl Into<String>, fields: Vec<FieldSpec>) -> Self {
        Self {
            name: name.into(),
            display_name: None,
            fields,
            terminal: false,
        }
    }

    /// Get the display name, falling back to the step name
    pub fn display_name(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.name)
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// Ordered steps for one entity type
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WizardDefinition {
    /// Unique wizard key (e.g., "employee")
    pub key: String,
    /// Display name
    pub name: String,
    /// Brief description of the entity being built
    #[serde(default)]
    pub description: String,
    /// Backend collection path for this entity (e.g., "employees")
    pub resource: String,
    /// Steps in Create-mode order
    pub steps: Vec<StepDefinition>,
}

impl WizardDefinition {
    /// Parse a wizard definition from JSON
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Validate the definition for consistency
    pub fn validate(&self) -> Result<(), WizardError> {
        let mut errors = Vec::new();

        if self.steps.is_empty() {
            errors.push("at least one step is required".to_string());
        }

        if self.resource.trim().is_empty() {
            errors.push("resource must not be empty".to_string());
        }

        let mut seen_steps = std::collections::HashSet::new();
        let last = self.steps.len().saturating_sub(1);

        for (index, step) in self.steps.iter().enumerate() {
            if step.name.is_empty() {
                errors.push(format!("step {} has an empty name", index));
            }
            if !seen_steps.insert(step.name.as_str()) {
                errors.push(format!("duplicate step '{}'", step.name));
            }
            if step.terminal && index != last {
                errors.push(format!(
                    "step '{}' is marked terminal but is not the last step",
                    step.name
                ));
            }
            check_fields(&step.name, &step.fields, &mut errors);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(WizardError::Invalid {
                key: self.key.clone(),
                errors,
            })
        }
    }

    /// Get step by name
    pub fn step(&self, name: &str) -> Option<&StepDefinition> {
        self.steps.iter().find(|s| s.name == name)
    }

    /// Get step by name, or an `UnknownStep` error
    pub fn require_step(&self, name: &str) -> Result<(usize, &StepDefinition), WizardError> {
        self.steps
            .iter()
            .enumerate()
            .find(|(_, s)| s.name == name)
            .ok_or_else(|| WizardError::UnknownStep {
                wizard: self.key.clone(),
                step: name.to_string(),
            })
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.steps.iter().position(|s| s.name == name)
    }

    /// Get the first step (entry point)
    pub fn first_step(&self) -> Option<&StepDefinition> {
        self.steps.first()
    }

    /// Check whether completing the step at `index` completes a Create flow
    pub fn is_terminal(&self, index: usize) -> bool {
        index + 1 >= self.steps.len()
    }

    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.name.as_str()).collect()
    }
}

fn check_fields(step: &str, fields: &[FieldSpec], errors: &mut Vec<String>) {
    let mut seen = std::collections::HashSet::new();
    for field in fields {
        if field.name.is_empty() || field.name.contains('.') {
            errors.push(format!(
                "step '{}' has an invalid field name '{}'",
                step, field.name
            ));
        }
        if !seen.insert(field.name.as_str()) {
            errors.push(format!(
                "step '{}' declares field '{}' twice",
                step, field.name
            ));
        }
        check_fields(step, &field.fields, errors);
    }
}

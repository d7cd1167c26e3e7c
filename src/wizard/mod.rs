//! Wizard definitions: the ordered steps that build one composite entity

pub mod definition;
pub mod loader;

pub use definition::{FieldSpec, StepDefinition, WizardDefinition, WizardError};
pub use loader::WizardRegistry;

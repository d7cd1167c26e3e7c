//! Onboard - resumable, mode-aware onboarding wizards for composite records
//!
//! A wizard builds one backend record through several steps. Each step owns a
//! fragment of the record and submits only the fields the user filled in. The
//! same steps work in Create mode (sequential, the first step creates the
//! record) and Edit mode (any step, against an existing record).

pub mod api;
pub mod config;
pub mod controller;
pub mod logging;
pub mod merge;
pub mod navigation;
pub mod resume;
pub mod session;
pub mod state;
pub mod validate;
pub mod wizard;

pub use api::{EntityId, PersistenceClient, PersistenceError, Record};
pub use controller::{NextAction, Prefill, StepController, StepError, Submitted};
pub use merge::{FieldValues, Payload};
pub use navigation::{Accepted, HistoryNavigator, Navigator, Route, SessionDriver};
pub use resume::{hydrate, resume, ResumeError};
pub use session::{Handoff, Mode, WizardSession};
pub use validate::{RequiredFields, Validation, Validator};
pub use wizard::{FieldSpec, StepDefinition, WizardDefinition, WizardRegistry};

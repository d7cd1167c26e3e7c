//! Step lifecycle: prefill, validate, submit, decide where to go next

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::api::{PersistenceClient, PersistenceError, Record};
use crate::merge::{self, FieldValues, Payload};
use crate::session::{Handoff, Mode, SessionError, WizardSession};
use crate::validate::{Validation, Validator};
use crate::wizard::{StepDefinition, WizardDefinition, WizardError};

/// Errors from entering or submitting a step
#[derive(Debug, Error)]
pub enum StepError {
    #[error(transparent)]
    Wizard(#[from] WizardError),

    #[error("session belongs to wizard '{session}', not '{definition}'")]
    WrongWizard { session: String, definition: String },

    #[error("session is complete; start a new one or edit the record")]
    SessionComplete,

    #[error("step '{step}' is not reachable yet: submit '{missing}' first")]
    NotReachable { step: String, missing: String },

    #[error("step '{step}' has {} invalid field(s)", .validation.field_errors.len())]
    Validation { step: String, validation: Validation },

    #[error("failed to submit step '{step}': {source}")]
    Submission {
        step: String,
        #[source]
        source: PersistenceError,
    },

    #[error(transparent)]
    Session(#[from] SessionError),
}

/// Values to show when a step opens
#[derive(Debug, Clone, PartialEq)]
pub struct Prefill {
    pub values: FieldValues,
    /// Fetch failure; the step is still usable with empty defaults
    pub warning: Option<PersistenceError>,
}

/// Where the flow goes after a successful submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NextAction {
    /// Create mode: continue with the next step
    GoTo { index: usize, step: String },
    /// Edit mode: back to the record list
    ReturnToList,
    /// Create mode: the terminal step finished
    Complete,
}

/// Result of a successful submission
#[derive(Debug, Clone)]
pub struct Submitted {
    /// The updated session; the caller's original is left untouched
    pub session: WizardSession,
    /// Full record as returned by the backend
    pub record: Record,
    /// Sparse payload that was sent
    pub payload: Payload,
    pub next: NextAction,
}

impl Submitted {
    pub fn handoff(&self) -> Handoff {
        self.session.handoff()
    }
}

/// Drives single steps of one wizard against a persistence client
pub struct StepController<'a> {
    definition: &'a WizardDefinition,
    client: &'a dyn PersistenceClient,
    validator: &'a dyn Validator,
}

impl<'a> StepController<'a> {
    pub fn new(
        definition: &'a WizardDefinition,
        client: &'a dyn PersistenceClient,
        validator: &'a dyn Validator,
    ) -> Self {
        Self {
            definition,
            client,
            validator,
        }
    }

    pub fn definition(&self) -> &WizardDefinition {
        self.definition
    }

    /// Move the session to a step, enforcing reachability for its mode
    pub fn enter(&self, session: &WizardSession, step: &str) -> Result<WizardSession, StepError> {
        let (index, _) = self.resolve(session, step)?;
        let mut entered = session.clone();
        entered.set_current_step(index);
        debug!(wizard = %self.definition.key, step, mode = %session.mode(), "Entered step");
        Ok(entered)
    }

    /// Initial field values for a step
    ///
    /// With a bound entity the stored fragment is projected onto the step's
    /// fields; a failed fetch degrades to empty defaults plus a warning.
    pub async fn prefill(&self, session: &WizardSession, step: &str) -> Result<Prefill, StepError> {
        self.check_wizard(session)?;
        let (_, step_def) = self.definition.require_step(step)?;

        let Some(entity_id) = session.entity_id() else {
            return Ok(Prefill {
                values: merge::empty_defaults(step_def),
                warning: None,
            });
        };

        match self.client.fetch(entity_id).await {
            Ok(record) => Ok(Prefill {
                values: merge::project(step_def, record.fragment(&step_def.name)),
                warning: None,
            }),
            Err(err) => {
                warn!(%entity_id, step, error = %err, "Prefill fetch failed, using empty defaults");
                Ok(Prefill {
                    values: merge::empty_defaults(step_def),
                    warning: Some(err),
                })
            }
        }
    }

    /// Prefilled values with the user's edits laid over them
    ///
    /// Fields the user leaves alone keep their stored value, so validation
    /// sees the whole form rather than only the edited fields.
    pub async fn edit_values(
        &self,
        session: &WizardSession,
        step: &str,
        edits: &FieldValues,
    ) -> Result<Prefill, StepError> {
        let mut form = self.prefill(session, step).await?;
        merge::deep_merge(&mut form.values, edits);
        Ok(form)
    }

    /// Validate, encode and persist one step's values
    ///
    /// On any error the input session is unchanged and the caller stays on
    /// the same step.
    pub async fn submit(
        &self,
        session: &WizardSession,
        step: &str,
        values: &FieldValues,
    ) -> Result<Submitted, StepError> {
        let (index, step_def) = self.resolve(session, step)?;

        let validation = self.validator.validate(step_def, values);
        if !validation.is_valid() {
            debug!(step, errors = validation.field_errors.len(), "Validation failed");
            return Err(StepError::Validation {
                step: step.to_string(),
                validation,
            });
        }

        let payload = merge::encode(step_def, values);
        let record = self
            .persist(session, step_def, payload.clone())
            .await
            .map_err(|source| StepError::Submission {
                step: step.to_string(),
                source,
            })?;

        let mut next_session = session.clone();
        next_session.bind_entity(record.id.clone())?;

        let fragment = record
            .fragments
            .get(&step_def.name)
            .filter(|v| !v.is_null())
            .cloned()
            .unwrap_or_else(|| Value::Object(payload.clone()));
        next_session.record_fragment(&step_def.name, fragment);

        let next = match session.mode() {
            Mode::Edit => NextAction::ReturnToList,
            Mode::Create if self.definition.is_terminal(index) => {
                next_session.mark_complete();
                NextAction::Complete
            }
            Mode::Create => {
                next_session.set_current_step(index + 1);
                NextAction::GoTo {
                    index: index + 1,
                    step: self.definition.steps[index + 1].name.clone(),
                }
            }
        };

        info!(
            wizard = %self.definition.key,
            entity_id = %record.id,
            step,
            fields = payload.len(),
            next = ?next,
            "Step submitted"
        );

        Ok(Submitted {
            session: next_session,
            record,
            payload,
            next,
        })
    }

    /// Format step progress for display
    /// Returns something like: "basic > [company] > education > experience"
    pub fn progress(&self, session: &WizardSession) -> String {
        self.definition
            .steps
            .iter()
            .enumerate()
            .map(|(i, step)| {
                if i == session.current_step() && !session.is_complete() {
                    format!("[{}]", step.name)
                } else {
                    step.name.clone()
                }
            })
            .collect::<Vec<_>>()
            .join(" > ")
    }

    async fn persist(
        &self,
        session: &WizardSession,
        step: &StepDefinition,
        payload: Payload,
    ) -> Result<Record, PersistenceError> {
        match session.entity_id() {
            None => self.client.create(&step.name, payload).await,
            Some(entity_id) => self.client.update(entity_id, &step.name, payload).await,
        }
    }

    fn check_wizard(&self, session: &WizardSession) -> Result<(), StepError> {
        if session.wizard() == self.definition.key {
            Ok(())
        } else {
            Err(StepError::WrongWizard {
                session: session.wizard().to_string(),
                definition: self.definition.key.clone(),
            })
        }
    }

    /// Look up a step and check the session may act on it
    fn resolve(
        &self,
        session: &WizardSession,
        step: &str,
    ) -> Result<(usize, &'a StepDefinition), StepError> {
        self.check_wizard(session)?;
        if session.is_complete() {
            return Err(StepError::SessionComplete);
        }

        let definition: &'a WizardDefinition = self.definition;
        let (index, step_def) = definition.require_step(step)?;

        if !session.can_enter(definition, index) {
            let missing = definition.steps[..index]
                .iter()
                .find(|s| !session.is_submitted(&s.name))
                .map(|s| s.name.clone())
                .unwrap_or_default();
            return Err(StepError::NotReachable {
                step: step.to_string(),
                missing,
            });
        }

        Ok((index, step_def))
    }
}

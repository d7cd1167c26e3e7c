//! Wizard session: the state carried from one step to the next
//!
//! A session is a plain value. The controller never mutates the session it is
//! given; a successful submission produces a new session, so a failed call
//! leaves the caller's copy exactly as it was.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

use crate::api::EntityId;
use crate::wizard::WizardDefinition;

/// How the wizard is being traversed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Building a new entity; steps are reachable only in order
    Create,
    /// Editing an identified entity; every step is directly reachable
    Edit,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Create => f.write_str("create"),
            Mode::Edit => f.write_str("edit"),
        }
    }
}

/// The only session state that survives navigation between steps
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Handoff {
    pub entity_id: Option<EntityId>,
    pub mode: Mode,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("session already bound to entity '{current}', refusing '{attempted}'")]
    EntityIdChanged {
        current: EntityId,
        attempted: EntityId,
    },
}

/// Mutable state of one traversal of a wizard
#[derive(Debug, Clone, PartialEq)]
pub struct WizardSession {
    token: Uuid,
    wizard: String,
    entity_id: Option<EntityId>,
    mode: Mode,
    current_step: usize,
    prior_fragments: BTreeMap<String, Value>,
    complete: bool,
    started_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl WizardSession {
    /// Start a Create-mode session at the first step
    pub fn create(definition: &WizardDefinition) -> Self {
        Self::new(definition, None, Mode::Create)
    }

    /// Start an Edit-mode session for an existing entity
    pub fn edit(definition: &WizardDefinition, entity_id: EntityId) -> Self {
        Self::new(definition, Some(entity_id), Mode::Edit)
    }

    /// Continue a Create-mode session whose record already exists
    pub(crate) fn create_bound(definition: &WizardDefinition, entity_id: EntityId) -> Self {
        Self::new(definition, Some(entity_id), Mode::Create)
    }

    fn new(definition: &WizardDefinition, entity_id: Option<EntityId>, mode: Mode) -> Self {
        let now = Utc::now();
        Self {
            token: Uuid::new_v4(),
            wizard: definition.key.clone(),
            entity_id,
            mode,
            current_step: 0,
            prior_fragments: BTreeMap::new(),
            complete: false,
            started_at: now,
            updated_at: now,
        }
    }

    /// Identity of this session, used to discard responses meant for a replaced session
    pub fn token(&self) -> Uuid {
        self.token
    }

    pub fn wizard(&self) -> &str {
        &self.wizard
    }

    pub fn entity_id(&self) -> Option<&EntityId> {
        self.entity_id.as_ref()
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn current_step(&self) -> usize {
        self.current_step
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Last known fragment for a step, if it was submitted or fetched
    pub fn prior_fragment(&self, step: &str) -> Option<&Value> {
        self.prior_fragments.get(step)
    }

    pub fn prior_fragments(&self) -> &BTreeMap<String, Value> {
        &self.prior_fragments
    }

    /// Check whether a step has a recorded fragment in this session
    pub fn is_submitted(&self, step: &str) -> bool {
        self.prior_fragments.contains_key(step)
    }

    /// Check whether the step at `index` may be entered
    ///
    /// Edit sessions reach every step. Create sessions reach step K only once
    /// steps 0..K have all been submitted.
    pub fn can_enter(&self, definition: &WizardDefinition, index: usize) -> bool {
        if index >= definition.steps.len() {
            return false;
        }
        match self.mode {
            Mode::Edit => true,
            Mode::Create => definition.steps[..index]
                .iter()
                .all(|s| self.is_submitted(&s.name)),
        }
    }

    /// The state passed forward to the next step
    pub fn handoff(&self) -> Handoff {
        Handoff {
            entity_id: self.entity_id.clone(),
            mode: self.mode,
        }
    }

    /// Bind the backend identifier; binding a different one is refused
    pub(crate) fn bind_entity(&mut self, entity_id: EntityId) -> Result<(), SessionError> {
        match &self.entity_id {
            Some(current) if *current != entity_id => Err(SessionError::EntityIdChanged {
                current: current.clone(),
                attempted: entity_id,
            }),
            Some(_) => Ok(()),
            None => {
                self.entity_id = Some(entity_id);
                Ok(())
            }
        }
    }

    pub(crate) fn record_fragment(&mut self, step: &str, fragment: Value) {
        self.prior_fragments.insert(step.to_string(), fragment);
        self.touch();
    }

    pub(crate) fn set_current_step(&mut self, index: usize) {
        self.current_step = index;
        self.touch();
    }

    pub(crate) fn mark_complete(&mut self) {
        self.complete = true;
        self.touch();
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

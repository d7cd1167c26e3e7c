//! Rebuilding sessions from an entity identifier or a step hand-off
//!
//! Nothing but `{entity_id, mode}` survives navigation; everything else is
//! reconstructed from the backend record. A record may be missing any number
//! of fragments (an abandoned Create flow leaves it partial) and is still
//! resumable.

use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::api::{EntityId, PersistenceClient, PersistenceError, Record};
use crate::session::{Handoff, Mode, WizardSession};
use crate::wizard::{WizardDefinition, WizardError};

#[derive(Debug, Error)]
pub enum ResumeError {
    #[error("edit hand-off carries no entity id")]
    MissingEntity,

    #[error("step '{0}' cannot start a new record; begin at the first step")]
    NotFirstStep(String),

    #[error("record '{entity_id}' has no '{missing}' yet; resume there instead of '{step}'")]
    NotReachable {
        entity_id: EntityId,
        step: String,
        missing: String,
    },

    #[error(transparent)]
    Wizard(#[from] WizardError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

/// Build an Edit-mode session for an existing record
///
/// Succeeds whenever the fetch succeeds, whichever fragments are populated.
pub async fn hydrate(
    client: &dyn PersistenceClient,
    definition: &WizardDefinition,
    entity_id: &EntityId,
) -> Result<WizardSession, PersistenceError> {
    let record = client.fetch(entity_id).await?;
    let mut session = WizardSession::edit(definition, record.id.clone());
    load_fragments(&mut session, definition, &record);

    debug!(
        wizard = %definition.key,
        %entity_id,
        fragments = session.prior_fragments().len(),
        "Hydrated session"
    );
    Ok(session)
}

/// Rebuild a session from a hand-off, positioned at `step`
///
/// A Create hand-off only says which record is being built. The steps already
/// submitted are read back from the record, and `step` must not lie beyond
/// the first one it is missing.
pub async fn resume(
    client: &dyn PersistenceClient,
    definition: &WizardDefinition,
    handoff: &Handoff,
    step: &str,
) -> Result<WizardSession, ResumeError> {
    let (index, _) = definition.require_step(step)?;

    let mut session = match (handoff.mode, &handoff.entity_id) {
        (Mode::Edit, None) => return Err(ResumeError::MissingEntity),
        (Mode::Edit, Some(entity_id)) => hydrate(client, definition, entity_id).await?,
        (Mode::Create, None) if index == 0 => WizardSession::create(definition),
        (Mode::Create, None) => return Err(ResumeError::NotFirstStep(step.to_string())),
        (Mode::Create, Some(entity_id)) => {
            let record = client.fetch(entity_id).await?;
            let mut session = WizardSession::create_bound(definition, record.id.clone());
            load_fragments(&mut session, definition, &record);

            if let Some(missing) = definition.steps[..index]
                .iter()
                .find(|s| !session.is_submitted(&s.name))
            {
                return Err(ResumeError::NotReachable {
                    entity_id: record.id,
                    step: step.to_string(),
                    missing: missing.name.clone(),
                });
            }
            session
        }
    };

    session.set_current_step(index);
    Ok(session)
}

fn load_fragments(session: &mut WizardSession, definition: &WizardDefinition, record: &Record) {
    for step in &definition.steps {
        if let Some(fragment) = record.fragment(&step.name) {
            session.record_fragment(&step.name, Value::Object(fragment.clone()));
        }
    }
}

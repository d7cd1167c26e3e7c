//! End-to-end wizard flows against the in-memory backend
//!
//! Covers Create and Edit flows through `StepController`, resuming from a
//! hand-off, and the record-level guarantees of sparse submission.

use serde_json::{json, Value};

use onboard::api::memory::{MemoryClient, Operation};
use onboard::api::{EntityId, PersistenceClient, PersistenceError, Record};
use onboard::controller::{NextAction, StepController, StepError};
use onboard::merge::{encode, FieldValues};
use onboard::navigation::{Accepted, HistoryNavigator, Route, SessionDriver};
use onboard::resume::{hydrate, resume};
use onboard::session::{Handoff, Mode, WizardSession};
use onboard::validate::{AcceptAll, RequiredFields};
use onboard::wizard::{FieldSpec, StepDefinition, WizardDefinition, WizardRegistry};

// ─── Helpers ──────────────────────────────────────────────────────────────────

fn two_step() -> WizardDefinition {
    WizardDefinition {
        key: "employee".to_string(),
        name: "Employee".to_string(),
        description: String::new(),
        resource: "employees".to_string(),
        steps: vec![
            StepDefinition::new(
                "basic",
                vec![FieldSpec::scalar("name"), FieldSpec::scalar("email")],
            ),
            StepDefinition::new("company", vec![FieldSpec::scalar("dept")]),
        ],
    }
}

fn values(v: Value) -> FieldValues {
    v.as_object().cloned().unwrap()
}

async fn fetched(client: &MemoryClient, id: &str) -> Value {
    let record = client.fetch(&EntityId::from(id)).await.unwrap();
    Value::Object(record.fragments)
}

// ─── Scenarios ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_create_flow_builds_record() {
    let def = two_step();
    let client = MemoryClient::new();
    let controller = StepController::new(&def, &client, &AcceptAll);

    let first = controller
        .submit(
            &WizardSession::create(&def),
            "basic",
            &values(json!({"name": "A"})),
        )
        .await
        .unwrap();
    assert_eq!(first.record.id, EntityId::from("E1"));
    assert_eq!(first.handoff().entity_id, Some(EntityId::from("E1")));

    let second = controller
        .submit(&first.session, "company", &values(json!({"dept": "X"})))
        .await
        .unwrap();
    assert_eq!(second.next, NextAction::Complete);

    assert_eq!(
        fetched(&client, "E1").await,
        json!({"basic": {"name": "A"}, "company": {"dept": "X"}})
    );
    assert_eq!(client.calls_of(Operation::Create).len(), 1);
    assert_eq!(client.calls_of(Operation::Update).len(), 1);
}

#[tokio::test]
async fn test_edit_partial_record_opens_any_step() {
    let def = two_step();
    let client = MemoryClient::new();
    let mut record = Record::new(EntityId::from("E1"));
    record
        .fragments
        .insert("basic".to_string(), json!({"name": "A"}));
    client.insert(record);
    let controller = StepController::new(&def, &client, &AcceptAll);

    let session = hydrate(&client, &def, &EntityId::from("E1")).await.unwrap();
    let session = controller.enter(&session, "company").unwrap();

    let prefill = controller.prefill(&session, "company").await.unwrap();
    assert!(prefill.warning.is_none());
    assert_eq!(Value::Object(prefill.values), json!({"dept": ""}));

    let submitted = controller
        .submit(&session, "company", &values(json!({"dept": "Y"})))
        .await
        .unwrap();
    assert_eq!(submitted.next, NextAction::ReturnToList);
    assert_eq!(
        fetched(&client, "E1").await,
        json!({"basic": {"name": "A"}, "company": {"dept": "Y"}})
    );
}

#[tokio::test]
async fn test_blank_field_never_overwrites() {
    let def = two_step();
    let client = MemoryClient::new();
    let controller = StepController::new(&def, &client, &AcceptAll);

    let first = controller
        .submit(
            &WizardSession::create(&def),
            "basic",
            &values(json!({"name": "A", "email": "old@b.com"})),
        )
        .await
        .unwrap();

    let session = hydrate(&client, &def, &first.record.id).await.unwrap();
    let again = controller
        .submit(
            &session,
            "basic",
            &values(json!({"name": "", "email": "a@b.com"})),
        )
        .await
        .unwrap();

    assert_eq!(Value::Object(again.payload), json!({"email": "a@b.com"}));
    assert_eq!(
        fetched(&client, "E1").await,
        json!({"basic": {"name": "A", "email": "a@b.com"}})
    );
}

#[tokio::test]
async fn test_failed_update_keeps_session() {
    let def = two_step();
    let client = MemoryClient::new();
    let controller = StepController::new(&def, &client, &AcceptAll);

    let session = controller
        .submit(
            &WizardSession::create(&def),
            "basic",
            &values(json!({"name": "A"})),
        )
        .await
        .unwrap()
        .session;

    client.fail_next(
        Operation::Update,
        PersistenceError::network("local", "connection refused"),
    );
    let err = controller
        .submit(&session, "company", &values(json!({"dept": "X"})))
        .await
        .unwrap_err();

    assert!(matches!(err, StepError::Submission { .. }));
    assert_eq!(session.current_step(), 1);
    assert_eq!(session.entity_id(), Some(&EntityId::from("E1")));

    // Retrying the same step succeeds
    let retried = controller
        .submit(&session, "company", &values(json!({"dept": "X"})))
        .await
        .unwrap();
    assert_eq!(retried.next, NextAction::Complete);
}

#[tokio::test]
async fn test_edit_changes_one_field_of_required_step() {
    let registry = WizardRegistry::builtins().unwrap();
    let def = registry.get("employee").unwrap();
    let client = MemoryClient::new();
    let mut record = Record::new(EntityId::from("E1"));
    record.fragments.insert(
        "basic".to_string(),
        json!({"name": "Asha", "email": "asha@example.com"}),
    );
    client.insert(record);
    let controller = StepController::new(def, &client, &RequiredFields);

    let session = hydrate(&client, def, &EntityId::from("E1")).await.unwrap();
    let form = controller
        .edit_values(&session, "basic", &values(json!({"phone": "123"})))
        .await
        .unwrap();
    let submitted = controller
        .submit(&session, "basic", &form.values)
        .await
        .unwrap();

    assert_eq!(submitted.next, NextAction::ReturnToList);
    assert_eq!(
        fetched(&client, "E1").await,
        json!({"basic": {"name": "Asha", "email": "asha@example.com", "phone": "123"}})
    );
}

// ─── Properties ───────────────────────────────────────────────────────────────

#[test]
fn test_encode_keeps_only_present_fields() {
    let def = WizardRegistry::builtins().unwrap();
    let employee = def.get("employee").unwrap();
    let basic = employee.step("basic").unwrap();

    assert!(encode(basic, &FieldValues::new()).is_empty());

    let input = values(json!({
        "name": "A",
        "email": "",
        "phone": null,
        "address": {"line1": "", "city": "Pune"},
        "unknown": "ignored"
    }));
    assert_eq!(
        Value::Object(encode(basic, &input)),
        json!({"name": "A", "address": {"city": "Pune"}})
    );

    let blank_group = values(json!({"name": "A", "address": {"line1": "", "city": null}}));
    assert_eq!(Value::Object(encode(basic, &blank_group)), json!({"name": "A"}));
}

#[tokio::test]
async fn test_entity_id_is_never_rebound() {
    let def = two_step();
    let client = MemoryClient::new();
    let controller = StepController::new(&def, &client, &AcceptAll);

    let first = controller
        .submit(&WizardSession::create(&def), "basic", &FieldValues::new())
        .await
        .unwrap();
    let id = first.session.entity_id().cloned().unwrap();

    // A second record exists; the session must keep pointing at the first
    client
        .create("basic", values(json!({"name": "other"})))
        .await
        .unwrap();

    let second = controller
        .submit(&first.session, "company", &values(json!({"dept": "X"})))
        .await
        .unwrap();
    assert_eq!(second.session.entity_id(), Some(&id));

    let hydrated = hydrate(&client, &def, &id).await.unwrap();
    assert_eq!(hydrated.entity_id(), Some(&id));
}

#[tokio::test]
async fn test_create_steps_unlock_in_order() {
    let registry = WizardRegistry::builtins().unwrap();
    let def = registry.get("store").unwrap();
    let client = MemoryClient::new();
    let controller = StepController::new(def, &client, &AcceptAll);

    let mut session = WizardSession::create(def);
    for (k, step) in def.steps.iter().enumerate() {
        for later in &def.steps[k + 1..] {
            assert!(
                matches!(
                    controller.enter(&session, &later.name),
                    Err(StepError::NotReachable { .. })
                ),
                "'{}' reachable before '{}' was submitted",
                later.name,
                step.name
            );
        }
        session = controller
            .submit(&session, &step.name, &FieldValues::new())
            .await
            .unwrap()
            .session;
    }
    assert!(session.is_complete());
}

#[tokio::test]
async fn test_edit_reaches_every_step_of_any_record() {
    let registry = WizardRegistry::builtins().unwrap();
    let def = registry.get("employee").unwrap();
    let client = MemoryClient::new();
    client.insert(Record::new(EntityId::from("E9")));
    let controller = StepController::new(def, &client, &AcceptAll);

    let session = hydrate(&client, def, &EntityId::from("E9")).await.unwrap();
    assert!(session.prior_fragments().is_empty());
    for step in &def.steps {
        let entered = controller.enter(&session, &step.name).unwrap();
        assert_eq!(entered.mode(), Mode::Edit);
        let prefill = controller.prefill(&entered, &step.name).await.unwrap();
        assert!(prefill.warning.is_none());
    }
}

#[tokio::test]
async fn test_resubmission_is_idempotent() {
    let def = two_step();
    let client = MemoryClient::new();
    let controller = StepController::new(&def, &client, &AcceptAll);

    let first = controller
        .submit(&WizardSession::create(&def), "basic", &FieldValues::new())
        .await
        .unwrap();
    let input = values(json!({"dept": "X"}));

    controller
        .submit(&first.session, "company", &input)
        .await
        .unwrap();
    let once = fetched(&client, "E1").await;

    let session = hydrate(&client, &def, &first.record.id).await.unwrap();
    controller.submit(&session, "company", &input).await.unwrap();
    assert_eq!(fetched(&client, "E1").await, once);
}

// ─── Resume and navigation ────────────────────────────────────────────────────

#[tokio::test]
async fn test_resume_create_handoff_after_restart() {
    let registry = WizardRegistry::builtins().unwrap();
    let def = registry.get("employee").unwrap();
    let client = MemoryClient::new();
    let controller = StepController::new(def, &client, &RequiredFields);

    let first = controller
        .submit(
            &WizardSession::create(def),
            "basic",
            &values(json!({"name": "Asha", "email": "asha@example.com"})),
        )
        .await
        .unwrap();
    let handoff: Handoff = first.handoff();

    // Only the hand-off survives; everything else comes from the backend
    let wire = serde_json::to_string(&handoff).unwrap();
    let handoff: Handoff = serde_json::from_str(&wire).unwrap();

    let session = resume(&client, def, &handoff, "company").await.unwrap();
    assert_eq!(session.current_step(), 1);
    assert_eq!(
        session.prior_fragment("basic"),
        Some(&json!({"name": "Asha", "email": "asha@example.com"}))
    );

    let err = controller
        .submit(&session, "company", &values(json!({"department": "Ops"})))
        .await
        .unwrap_err();
    match err {
        StepError::Validation { validation, .. } => {
            assert!(validation.field_errors.contains_key("employee_code"));
        }
        other => panic!("Expected Validation, got {:?}", other),
    }
    assert!(client.calls_of(Operation::Update).is_empty());
}

#[tokio::test]
async fn test_driver_ignores_result_after_abandon() {
    let def = two_step();
    let client = MemoryClient::new();
    let controller = StepController::new(&def, &client, &AcceptAll);
    let mut driver = SessionDriver::new(HistoryNavigator::new());

    let session = WizardSession::create(&def);
    driver.begin(session.clone(), "basic").unwrap();
    driver.abandon();

    // The record is still created; only the navigation is dropped
    let late = controller
        .submit(&session, "basic", &values(json!({"name": "A"})))
        .await
        .unwrap();
    assert_eq!(driver.accept(late).unwrap(), Accepted::Stale);
    assert!(client.snapshot(&EntityId::from("E1")).is_some());
    assert_eq!(
        driver.navigator().current(),
        Some(&Route::Step {
            wizard: "employee".to_string(),
            step: "basic".to_string(),
            handoff: Handoff {
                entity_id: None,
                mode: Mode::Create,
            },
        })
    );
}

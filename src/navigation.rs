//! Navigation between steps and ownership of the active session
//!
//! A `Navigator` moves between routes and carries only the hand-off. The
//! `SessionDriver` owns the one active session: a submission result is applied
//! only if it belongs to that session. Requests are not cancelled when the user
//! navigates away; their late results are discarded here.

use anyhow::Result;
use tracing::{debug, info, warn};

use crate::controller::{NextAction, Submitted};
use crate::session::{Handoff, WizardSession};
use crate::wizard::WizardDefinition;

/// A place the user can be
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// A wizard step, with the state handed to it
    Step {
        wizard: String,
        step: String,
        handoff: Handoff,
    },
    /// The record list for a wizard's entity type
    List { wizard: String },
}

/// Route-level navigation primitives
pub trait Navigator {
    /// Move to a route
    fn navigate(&mut self, route: Route) -> Result<()>;

    /// Leave the current route for the previous one, if any
    fn go_back(&mut self) -> Result<Option<Route>>;

    fn go_to_step(&mut self, wizard: &str, step: &str, handoff: Handoff) -> Result<()> {
        self.navigate(Route::Step {
            wizard: wizard.to_string(),
            step: step.to_string(),
            handoff,
        })
    }

    fn return_to_list(&mut self, wizard: &str) -> Result<()> {
        self.navigate(Route::List {
            wizard: wizard.to_string(),
        })
    }
}

/// In-memory navigator keeping a stack of visited routes
#[derive(Debug, Default)]
pub struct HistoryNavigator {
    history: Vec<Route>,
}

impl HistoryNavigator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<&Route> {
        self.history.last()
    }

    pub fn history(&self) -> &[Route] {
        &self.history
    }
}

impl Navigator for HistoryNavigator {
    fn navigate(&mut self, route: Route) -> Result<()> {
        debug!(?route, "Navigate");
        self.history.push(route);
        Ok(())
    }

    fn go_back(&mut self) -> Result<Option<Route>> {
        if self.history.len() < 2 {
            return Ok(None);
        }
        self.history.pop();
        Ok(self.history.last().cloned())
    }
}

/// What happened to a submission result handed to the driver
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Accepted {
    /// Applied to the active session; the navigator moved to this route
    Applied(Route),
    /// The result belonged to a session that is no longer active
    Stale,
}

/// Owns the active session and forwards transitions to a navigator
pub struct SessionDriver<N: Navigator> {
    navigator: N,
    active: Option<WizardSession>,
}

impl<N: Navigator> SessionDriver<N> {
    pub fn new(navigator: N) -> Self {
        Self {
            navigator,
            active: None,
        }
    }

    pub fn navigator(&self) -> &N {
        &self.navigator
    }

    pub fn active(&self) -> Option<&WizardSession> {
        self.active.as_ref()
    }

    /// Make `session` the active one and show `step`
    ///
    /// Any previously active session is dropped; its in-flight results will
    /// be discarded.
    pub fn begin(&mut self, session: WizardSession, step: &str) -> Result<()> {
        if let Some(previous) = &self.active {
            debug!(token = %previous.token(), "Replacing active session");
        }
        self.navigator
            .go_to_step(session.wizard(), step, session.handoff())?;
        self.active = Some(session);
        Ok(())
    }

    /// Apply a submission result if it belongs to the active session
    pub fn accept(&mut self, submitted: Submitted) -> Result<Accepted> {
        let is_active = self
            .active
            .as_ref()
            .is_some_and(|s| s.token() == submitted.session.token());
        if !is_active {
            warn!(
                token = %submitted.session.token(),
                entity_id = %submitted.record.id,
                "Discarding result for inactive session"
            );
            return Ok(Accepted::Stale);
        }

        let wizard = submitted.session.wizard().to_string();
        let route = match &submitted.next {
            NextAction::GoTo { step, .. } => {
                let route = Route::Step {
                    wizard,
                    step: step.clone(),
                    handoff: submitted.handoff(),
                };
                self.active = Some(submitted.session);
                route
            }
            NextAction::ReturnToList | NextAction::Complete => {
                info!(entity_id = %submitted.record.id, next = ?submitted.next, "Session finished");
                self.active = None;
                Route::List { wizard }
            }
        };

        self.navigator.navigate(route.clone())?;
        Ok(Accepted::Applied(route))
    }

    /// Go back one route; the active session follows when it lands on one of its steps
    pub fn go_back(&mut self, definition: &WizardDefinition) -> Result<Option<Route>> {
        let route = self.navigator.go_back()?;

        if let (Some(Route::Step { wizard, step, .. }), Some(session)) = (&route, &mut self.active)
        {
            if *wizard == session.wizard() {
                if let Some(index) = definition.index_of(step) {
                    session.set_current_step(index);
                }
            }
        }

        Ok(route)
    }

    /// Drop the active session; the record stays as the backend has it
    pub fn abandon(&mut self) -> Option<WizardSession> {
        let session = self.active.take();
        if let Some(s) = &session {
            info!(
                wizard = s.wizard(),
                entity_id = ?s.entity_id(),
                "Session abandoned; record left partial"
            );
        }
        session
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::MemoryClient;
    use crate::controller::StepController;
    use crate::merge::FieldValues;
    use crate::session::Mode;
    use crate::validate::AcceptAll;
    use crate::wizard::{FieldSpec, StepDefinition};

    fn definition() -> WizardDefinition {
        WizardDefinition {
            key: "employee".to_string(),
            name: "Employee".to_string(),
            description: String::new(),
            resource: "employees".to_string(),
            steps: ["basic", "company"]
                .iter()
                .map(|n| StepDefinition::new(*n, vec![FieldSpec::scalar("x")]))
                .collect(),
        }
    }

    #[test]
    fn test_history_go_back() {
        let mut nav = HistoryNavigator::new();
        assert!(nav.go_back().unwrap().is_none());

        let handoff = Handoff {
            entity_id: None,
            mode: Mode::Create,
        };
        nav.go_to_step("employee", "basic", handoff.clone()).unwrap();
        nav.go_to_step("employee", "company", handoff).unwrap();

        let back = nav.go_back().unwrap();
        assert!(matches!(back, Some(Route::Step { ref step, .. }) if step == "basic"));
        assert_eq!(nav.history().len(), 1);
    }

    #[tokio::test]
    async fn test_accept_moves_to_next_step() {
        let def = definition();
        let client = MemoryClient::new();
        let controller = StepController::new(&def, &client, &AcceptAll);
        let mut driver = SessionDriver::new(HistoryNavigator::new());

        driver.begin(WizardSession::create(&def), "basic").unwrap();
        let session = driver.active().unwrap().clone();
        let submitted = controller
            .submit(&session, "basic", &FieldValues::new())
            .await
            .unwrap();

        let accepted = driver.accept(submitted).unwrap();
        match accepted {
            Accepted::Applied(Route::Step { step, handoff, .. }) => {
                assert_eq!(step, "company");
                assert_eq!(handoff.mode, Mode::Create);
                assert!(handoff.entity_id.is_some());
            }
            other => panic!("Expected step route, got {:?}", other),
        }
        assert_eq!(driver.active().unwrap().current_step(), 1);
    }

    #[tokio::test]
    async fn test_stale_result_is_discarded() {
        let def = definition();
        let client = MemoryClient::new();
        let controller = StepController::new(&def, &client, &AcceptAll);
        let mut driver = SessionDriver::new(HistoryNavigator::new());

        let first = WizardSession::create(&def);
        driver.begin(first.clone(), "basic").unwrap();
        // User walks away and starts over before the first request resolves
        driver.begin(WizardSession::create(&def), "basic").unwrap();

        let late = controller
            .submit(&first, "basic", &FieldValues::new())
            .await
            .unwrap();
        assert_eq!(driver.accept(late).unwrap(), Accepted::Stale);
        assert_eq!(driver.active().unwrap().current_step(), 0);
        assert!(driver.active().unwrap().entity_id().is_none());
        assert_eq!(driver.navigator().history().len(), 2);
    }

    #[tokio::test]
    async fn test_abandon_then_result_is_stale() {
        let def = definition();
        let client = MemoryClient::new();
        let controller = StepController::new(&def, &client, &AcceptAll);
        let mut driver = SessionDriver::new(HistoryNavigator::new());

        let session = WizardSession::create(&def);
        driver.begin(session.clone(), "basic").unwrap();
        assert!(driver.abandon().is_some());

        let late = controller
            .submit(&session, "basic", &FieldValues::new())
            .await
            .unwrap();
        assert_eq!(driver.accept(late).unwrap(), Accepted::Stale);
    }

    #[tokio::test]
    async fn test_complete_returns_to_list_and_go_back_follows() {
        let def = definition();
        let client = MemoryClient::new();
        let controller = StepController::new(&def, &client, &AcceptAll);
        let mut driver = SessionDriver::new(HistoryNavigator::new());

        driver.begin(WizardSession::create(&def), "basic").unwrap();
        let s = driver.active().unwrap().clone();
        let first = controller.submit(&s, "basic", &FieldValues::new()).await.unwrap();
        driver.accept(first).unwrap();

        // Back to basic, then forward again
        let back = driver.go_back(&def).unwrap();
        assert!(matches!(back, Some(Route::Step { ref step, .. }) if step == "basic"));
        assert_eq!(driver.active().unwrap().current_step(), 0);

        let s = driver.active().unwrap().clone();
        let again = controller.submit(&s, "basic", &FieldValues::new()).await.unwrap();
        driver.accept(again).unwrap();
        let s = driver.active().unwrap().clone();
        let last = controller.submit(&s, "company", &FieldValues::new()).await.unwrap();

        assert_eq!(
            driver.accept(last).unwrap(),
            Accepted::Applied(Route::List {
                wizard: "employee".to_string()
            })
        );
        assert!(driver.active().is_none());
    }
}

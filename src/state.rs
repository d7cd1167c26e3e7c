//! Saved wizard sessions
//!
//! The CLI has no long-lived process, so the hand-off between steps is kept
//! in `<state>/sessions.json`, one entry per wizard. Only `{entity_id, mode}`
//! plus the route (step and back-history) is stored.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::navigation::{Navigator, Route};
use crate::session::Handoff;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedSession {
    pub handoff: Handoff,
    /// Step the user is on
    pub step: String,
    /// Steps visited before `step`, oldest first
    #[serde(default)]
    pub history: Vec<String>,
    pub saved_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionsFile {
    #[serde(default)]
    pub sessions: BTreeMap<String, SavedSession>,
}

impl SessionsFile {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read sessions file: {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse sessions file: {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("Failed to create state directory")?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        fs::write(path, contents)
            .with_context(|| format!("Failed to write sessions file: {}", path.display()))?;
        Ok(())
    }
}

/// Navigator that persists the route of one wizard to the sessions file
pub struct FileNavigator {
    path: PathBuf,
    wizard: String,
    file: SessionsFile,
}

impl FileNavigator {
    pub fn open(path: PathBuf, wizard: &str) -> Result<Self> {
        let file = SessionsFile::load(&path)?;
        Ok(Self {
            path,
            wizard: wizard.to_string(),
            file,
        })
    }

    /// The saved session for this navigator's wizard
    pub fn saved(&self) -> Option<&SavedSession> {
        self.file.sessions.get(&self.wizard)
    }

    /// Forget the saved session without touching the record
    pub fn clear(&mut self) -> Result<Option<SavedSession>> {
        let removed = self.file.sessions.remove(&self.wizard);
        self.file.save(&self.path)?;
        Ok(removed)
    }
}

impl Navigator for FileNavigator {
    fn navigate(&mut self, route: Route) -> Result<()> {
        match route {
            Route::Step {
                wizard,
                step,
                handoff,
            } => {
                let history = match self.file.sessions.get(&wizard) {
                    Some(prev) if prev.step != step => {
                        let mut history = prev.history.clone();
                        history.push(prev.step.clone());
                        history
                    }
                    Some(prev) => prev.history.clone(),
                    None => Vec::new(),
                };
                debug!(%wizard, %step, "Saving session hand-off");
                self.file.sessions.insert(
                    wizard,
                    SavedSession {
                        handoff,
                        step,
                        history,
                        saved_at: Utc::now(),
                    },
                );
            }
            Route::List { wizard } => {
                debug!(%wizard, "Session finished, removing hand-off");
                self.file.sessions.remove(&wizard);
            }
        }
        self.file.save(&self.path)
    }

    fn go_back(&mut self) -> Result<Option<Route>> {
        let Some(saved) = self.file.sessions.get_mut(&self.wizard) else {
            return Ok(None);
        };
        let Some(previous) = saved.history.pop() else {
            return Ok(None);
        };

        saved.step = previous;
        saved.saved_at = Utc::now();
        let route = Route::Step {
            wizard: self.wizard.clone(),
            step: saved.step.clone(),
            handoff: saved.handoff.clone(),
        };
        self.file.save(&self.path)?;
        Ok(Some(route))
    }
}

//! Loading built-in and user-defined wizard definitions

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

use super::definition::{WizardDefinition, WizardError};

const BUILTIN_WIZARDS: &[(&str, &str)] = &[
    ("employee", include_str!("builtin/employee.json")),
    ("store", include_str!("builtin/store.json")),
];

/// All wizard definitions available to the application, keyed by wizard key
#[derive(Debug, Clone, Default)]
pub struct WizardRegistry {
    wizards: BTreeMap<String, WizardDefinition>,
}

impl WizardRegistry {
    /// Built-in definitions overlaid with user definitions from `user_dir`
    pub fn load(user_dir: &Path) -> Result<Self> {
        let mut wizards = load_builtins()?;
        for (key, definition) in load_user_wizards(user_dir)? {
            if wizards.contains_key(&key) {
                debug!("User wizard '{}' overrides builtin", key);
            }
            wizards.insert(key, definition);
        }
        Ok(Self { wizards })
    }

    pub fn builtins() -> Result<Self> {
        Ok(Self {
            wizards: load_builtins()?,
        })
    }

    pub fn insert(&mut self, definition: WizardDefinition) {
        self.wizards.insert(definition.key.clone(), definition);
    }

    pub fn get(&self, key: &str) -> Result<&WizardDefinition, WizardError> {
        self.wizards
            .get(key)
            .ok_or_else(|| WizardError::UnknownWizard(key.to_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &WizardDefinition> {
        self.wizards.values()
    }

    pub fn len(&self) -> usize {
        self.wizards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.wizards.is_empty()
    }
}

/// Load all built-in wizard definitions
pub fn load_builtins() -> Result<BTreeMap<String, WizardDefinition>> {
    let mut wizards = BTreeMap::new();

    for (name, json) in BUILTIN_WIZARDS {
        let definition = WizardDefinition::from_json(json)
            .with_context(|| format!("Failed to parse builtin wizard '{}'", name))?;
        definition.validate()?;
        debug!("Loaded builtin wizard: {}", definition.key);
        wizards.insert(definition.key.clone(), definition);
    }

    Ok(wizards)
}

/// Load user-defined wizards from a directory
///
/// Scans for *.json files; invalid files are logged as warnings and skipped.
pub fn load_user_wizards(path: &Path) -> Result<BTreeMap<String, WizardDefinition>> {
    let mut wizards = BTreeMap::new();

    if !path.exists() {
        debug!("User wizards directory does not exist: {}", path.display());
        return Ok(wizards);
    }

    let entries = fs::read_dir(path)
        .with_context(|| format!("Failed to read wizards directory: {}", path.display()))?;

    for entry in entries {
        let file_path = entry?.path();

        if file_path.is_dir() || file_path.extension().is_none_or(|e| e != "json") {
            continue;
        }

        match load_wizard_file(&file_path) {
            Ok(definition) => {
                debug!(
                    "Loaded user wizard: {} from {}",
                    definition.key,
                    file_path.display()
                );
                wizards.insert(definition.key.clone(), definition);
            }
            Err(e) => {
                warn!("Failed to load wizard from {}: {:#}", file_path.display(), e);
            }
        }
    }

    Ok(wizards)
}

/// Load and validate a single wizard definition file
pub fn load_wizard_file(path: &Path) -> Result<WizardDefinition> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read wizard file: {}", path.display()))?;
    let definition = WizardDefinition::from_json(&content)
        .with_context(|| format!("Failed to parse wizard file: {}", path.display()))?;
    definition.validate()?;
    Ok(definition)
}

//! In-memory records backend, optionally persisted to a JSON file
//!
//! Used for the `local` backend and as the test double for controller tests.
//! Updates deep-merge the sparse payload into the stored fragment, the same
//! way the remote records API does.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing::debug;

use super::{EntityId, PersistenceClient, PersistenceError, Record};
use crate::merge::{deep_merge, Payload};

const BACKEND_NAME: &str = "local";

/// Client operation, used for failure injection and the call log
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Create,
    Update,
    Fetch,
    List,
}

/// A recorded client call
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub operation: Operation,
    pub entity_id: Option<EntityId>,
    pub fragment: Option<String>,
    pub payload: Option<Payload>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Store {
    next_id: u64,
    records: BTreeMap<EntityId, Map<String, Value>>,
}

/// In-memory implementation of `PersistenceClient`
#[derive(Clone, Default)]
pub struct MemoryClient {
    store: Arc<Mutex<Store>>,
    path: Option<PathBuf>,
    id_prefix: String,
    /// Failures to return instead of running the next matching operation
    failures: Arc<Mutex<Vec<(Operation, PersistenceError)>>>,
    /// Record of calls made (for test assertions)
    pub calls: Arc<Mutex<Vec<Call>>>,
}

impl MemoryClient {
    /// Create an empty, purely in-memory backend issuing ids `E1`, `E2`, ...
    pub fn new() -> Self {
        Self {
            id_prefix: "E".to_string(),
            ..Self::default()
        }
    }

    /// Open a file-backed store, loading existing records if the file exists
    pub fn open(path: PathBuf) -> anyhow::Result<Self> {
        use anyhow::Context;

        let store = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read records file: {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse records file: {}", path.display()))?
        } else {
            Store::default()
        };

        Ok(Self {
            store: Arc::new(Mutex::new(store)),
            path: Some(path),
            ..Self::new()
        })
    }

    /// Seed a record directly (bypasses the call log)
    pub fn insert(&self, record: Record) {
        let mut store = self.store.lock().unwrap();
        store.records.insert(record.id, record.fragments);
    }

    /// Make the next call of `operation` fail with `error`
    pub fn fail_next(&self, operation: Operation, error: PersistenceError) {
        self.failures.lock().unwrap().push((operation, error));
    }

    /// Calls made so far of one operation
    pub fn calls_of(&self, operation: Operation) -> Vec<Call> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.operation == operation)
            .cloned()
            .collect()
    }

    /// Current record state without going through the client interface
    pub fn snapshot(&self, entity_id: &EntityId) -> Option<Record> {
        let store = self.store.lock().unwrap();
        store.records.get(entity_id).map(|fragments| Record {
            id: entity_id.clone(),
            fragments: fragments.clone(),
        })
    }

    fn log(&self, call: Call) -> Result<(), PersistenceError> {
        let operation = call.operation;
        self.calls.lock().unwrap().push(call);

        let mut failures = self.failures.lock().unwrap();
        if let Some(pos) = failures.iter().position(|(op, _)| *op == operation) {
            let (_, err) = failures.remove(pos);
            debug!(?operation, error = %err, "Injected failure");
            return Err(err);
        }
        Ok(())
    }

    fn save(&self, store: &Store) -> Result<(), PersistenceError> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| PersistenceError::network(BACKEND_NAME, e.to_string()))?;
        }
        let contents = serde_json::to_string_pretty(store)
            .map_err(|e| PersistenceError::decode(BACKEND_NAME, e.to_string()))?;
        fs::write(path, contents).map_err(|e| PersistenceError::network(BACKEND_NAME, e.to_string()))
    }
}

#[async_trait]
impl PersistenceClient for MemoryClient {
    fn name(&self) -> &str {
        BACKEND_NAME
    }

    async fn create(&self, fragment: &str, payload: Payload) -> Result<Record, PersistenceError> {
        self.log(Call {
            operation: Operation::Create,
            entity_id: None,
            fragment: Some(fragment.to_string()),
            payload: Some(payload.clone()),
        })?;

        // Changes are staged on a copy and only kept once they are saved
        let mut store = self.store.lock().unwrap();
        let mut staged = store.clone();
        staged.next_id += 1;
        let id = EntityId::new(format!("{}{}", self.id_prefix, staged.next_id));

        let mut fragments = Map::new();
        fragments.insert(fragment.to_string(), Value::Object(payload));
        staged.records.insert(id.clone(), fragments.clone());
        self.save(&staged)?;
        *store = staged;

        debug!(entity_id = %id, fragment, "Created record");
        Ok(Record { id, fragments })
    }

    async fn update(
        &self,
        entity_id: &EntityId,
        fragment: &str,
        payload: Payload,
    ) -> Result<Record, PersistenceError> {
        self.log(Call {
            operation: Operation::Update,
            entity_id: Some(entity_id.clone()),
            fragment: Some(fragment.to_string()),
            payload: Some(payload.clone()),
        })?;

        let mut store = self.store.lock().unwrap();
        let mut staged = store.clone();
        let fragments = staged
            .records
            .get_mut(entity_id)
            .ok_or_else(|| PersistenceError::not_found(BACKEND_NAME, entity_id.as_str()))?;

        let slot = fragments
            .entry(fragment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !slot.is_object() {
            *slot = Value::Object(Map::new());
        }
        if let Value::Object(stored) = slot {
            deep_merge(stored, &payload);
        }

        let record = Record {
            id: entity_id.clone(),
            fragments: fragments.clone(),
        };
        self.save(&staged)?;
        *store = staged;

        debug!(%entity_id, fragment, "Updated record");
        Ok(record)
    }

    async fn fetch(&self, entity_id: &EntityId) -> Result<Record, PersistenceError> {
        self.log(Call {
            operation: Operation::Fetch,
            entity_id: Some(entity_id.clone()),
            fragment: None,
            payload: None,
        })?;

        self.snapshot(entity_id)
            .ok_or_else(|| PersistenceError::not_found(BACKEND_NAME, entity_id.as_str()))
    }

    async fn list(&self) -> Result<Vec<Record>, PersistenceError> {
        self.log(Call {
            operation: Operation::List,
            entity_id: None,
            fragment: None,
            payload: None,
        })?;

        let store = self.store.lock().unwrap();
        Ok(store
            .records
            .iter()
            .map(|(id, fragments)| Record {
                id: id.clone(),
                fragments: fragments.clone(),
            })
            .collect())
    }
}

//! Persistence clients for composite records
//!
//! This module provides:
//! - The `PersistenceClient` trait every records backend implements
//! - `Record` and `EntityId`, the backend's view of a composite entity
//! - An HTTP client (`HttpClient`) and an in-memory/file-backed client (`MemoryClient`)

pub mod error;
pub mod http;
pub mod memory;

pub use error::PersistenceError;
pub use http::HttpClient;
pub use memory::MemoryClient;

use std::fmt;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::config::{BackendKind, Config};
use crate::merge::Payload;
use crate::wizard::WizardDefinition;

/// Opaque identifier assigned by the backend on the first successful step
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Full current state of a composite record
///
/// Every fragment written so far is present under its step name; fragments
/// that were never written are absent (or null when the backend says so).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: EntityId,
    #[serde(default)]
    pub fragments: Map<String, Value>,
}

impl Record {
    pub fn new(id: EntityId) -> Self {
        Self {
            id,
            fragments: Map::new(),
        }
    }

    /// Get a fragment by step name, ignoring null or non-object values
    pub fn fragment(&self, name: &str) -> Option<&Map<String, Value>> {
        self.fragments.get(name).and_then(Value::as_object)
    }

    /// Check whether a fragment holds at least one stored field
    pub fn has_fragment(&self, name: &str) -> bool {
        self.fragment(name).is_some_and(|f| !f.is_empty())
    }

    /// Parse a backend JSON object, taking the identifier from `id_field`
    ///
    /// Numeric identifiers are accepted and kept in their decimal form.
    pub fn from_json(backend: &str, id_field: &str, value: Value) -> Result<Self, PersistenceError> {
        let Value::Object(mut fields) = value else {
            return Err(PersistenceError::decode(backend, "record is not a JSON object"));
        };

        let id = match fields.remove(id_field) {
            Some(Value::String(s)) if !s.is_empty() => EntityId::new(s),
            Some(Value::Number(n)) => EntityId::new(n.to_string()),
            _ => {
                return Err(PersistenceError::decode(
                    backend,
                    format!("record has no '{}' field", id_field),
                ))
            }
        };

        Ok(Self {
            id,
            fragments: fields,
        })
    }

    /// Render as a backend JSON object with the identifier under `id_field`
    pub fn to_json(&self, id_field: &str) -> Value {
        let mut object = self.fragments.clone();
        object.insert(id_field.to_string(), Value::String(self.id.to_string()));
        Value::Object(object)
    }
}

/// Client for one entity type's records backend
///
/// Implementations must not merge fragments client-side: `update` sends only
/// the sparse payload and the backend merges it into the stored fragment.
#[async_trait]
pub trait PersistenceClient: Send + Sync {
    /// Get the backend name (e.g., "http", "local")
    fn name(&self) -> &str;

    /// Create a new record whose first fragment is `payload`
    async fn create(&self, fragment: &str, payload: Payload) -> Result<Record, PersistenceError>;

    /// Merge `payload` into the named fragment of an existing record
    async fn update(
        &self,
        entity_id: &EntityId,
        fragment: &str,
        payload: Payload,
    ) -> Result<Record, PersistenceError>;

    /// Fetch the full current record
    async fn fetch(&self, entity_id: &EntityId) -> Result<Record, PersistenceError>;

    /// List all records of this entity type
    async fn list(&self) -> Result<Vec<Record>, PersistenceError>;
}

/// Build the configured client for a wizard's backing resource
pub fn build_client(
    config: &Config,
    definition: &WizardDefinition,
) -> Result<Box<dyn PersistenceClient>> {
    match config.api.backend {
        BackendKind::Http => Ok(Box::new(HttpClient::from_config(
            &config.api,
            &definition.resource,
        )?)),
        BackendKind::Local => {
            let path = config
                .state_path()
                .join("records")
                .join(format!("{}.json", definition.resource));
            Ok(Box::new(MemoryClient::open(path)?))
        }
    }
}

//! HTTP records API client
//!
//! Wire format, per entity resource:
//! - `POST   {base}/{resource}`      body `{fragment: payload}` -> record
//! - `PATCH  {base}/{resource}/{id}` body `{fragment: payload}` -> record
//! - `GET    {base}/{resource}/{id}` -> record
//! - `GET    {base}/{resource}`      -> array of records

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde_json::{Map, Value};
use std::env;
use std::time::Duration;
use tracing::debug;

use super::{EntityId, PersistenceClient, PersistenceError, Record};
use crate::config::ApiConfig;
use crate::merge::Payload;

const BACKEND_NAME: &str = "http";

/// Records API client for one entity resource
pub struct HttpClient {
    base_url: String,
    resource: String,
    id_field: String,
    token: Option<String>,
    client: Client,
}

impl HttpClient {
    /// Create a client for `{base_url}/{resource}`
    pub fn new(base_url: impl Into<String>, resource: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            resource: resource.into().trim_matches('/').to_string(),
            id_field: "id".to_string(),
            token: None,
            client: Client::new(),
        }
    }

    /// Create from configuration
    ///
    /// The bearer token is read from the environment variable named by
    /// `api.token_env`; an unset variable means unauthenticated requests.
    pub fn from_config(config: &ApiConfig, resource: &str) -> Result<Self, PersistenceError> {
        let base_url = config
            .base_url
            .as_deref()
            .filter(|url| !url.is_empty())
            .ok_or_else(|| PersistenceError::not_configured(BACKEND_NAME, "api.base_url is not set"))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| PersistenceError::not_configured(BACKEND_NAME, e.to_string()))?;

        let token = env::var(&config.token_env).ok().filter(|t| !t.is_empty());

        Ok(Self {
            client,
            token,
            id_field: config.id_field.clone(),
            ..Self::new(base_url, resource)
        })
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_id_field(mut self, id_field: impl Into<String>) -> Self {
        self.id_field = id_field.into();
        self
    }

    fn collection_url(&self) -> String {
        format!("{}/{}", self.base_url, self.resource)
    }

    fn record_url(&self, entity_id: &EntityId) -> String {
        format!("{}/{}/{}", self.base_url, self.resource, entity_id)
    }

    fn fragment_body(fragment: &str, payload: Payload) -> Value {
        let mut body = Map::new();
        body.insert(fragment.to_string(), Value::Object(payload));
        Value::Object(body)
    }

    /// Send a request and decode a JSON response body
    async fn send(
        &self,
        request: RequestBuilder,
        entity_id: Option<&EntityId>,
    ) -> Result<Value, PersistenceError> {
        let request = match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        };

        let response = request
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| PersistenceError::network(BACKEND_NAME, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PersistenceError::from_status(
                BACKEND_NAME,
                status.as_u16(),
                entity_id.map(EntityId::as_str),
                body,
            ));
        }

        response
            .json()
            .await
            .map_err(|e| PersistenceError::decode(BACKEND_NAME, e.to_string()))
    }

    fn record(&self, value: Value) -> Result<Record, PersistenceError> {
        Record::from_json(BACKEND_NAME, &self.id_field, value)
    }
}

#[async_trait]
impl PersistenceClient for HttpClient {
    fn name(&self) -> &str {
        BACKEND_NAME
    }

    async fn create(&self, fragment: &str, payload: Payload) -> Result<Record, PersistenceError> {
        let url = self.collection_url();
        debug!(%url, fragment, fields = payload.len(), "POST record");

        let body = Self::fragment_body(fragment, payload);
        let value = self.send(self.client.post(&url).json(&body), None).await?;
        self.record(value)
    }

    async fn update(
        &self,
        entity_id: &EntityId,
        fragment: &str,
        payload: Payload,
    ) -> Result<Record, PersistenceError> {
        let url = self.record_url(entity_id);
        debug!(%url, fragment, fields = payload.len(), "PATCH record");

        let body = Self::fragment_body(fragment, payload);
        let value = self
            .send(self.client.patch(&url).json(&body), Some(entity_id))
            .await?;
        self.record(value)
    }

    async fn fetch(&self, entity_id: &EntityId) -> Result<Record, PersistenceError> {
        let url = self.record_url(entity_id);
        debug!(%url, "GET record");

        let value = self.send(self.client.get(&url), Some(entity_id)).await?;
        self.record(value)
    }

    async fn list(&self) -> Result<Vec<Record>, PersistenceError> {
        let url = self.collection_url();
        debug!(%url, "GET records");

        match self.send(self.client.get(&url), None).await? {
            Value::Array(items) => items.into_iter().map(|v| self.record(v)).collect(),
            _ => Err(PersistenceError::decode(
                BACKEND_NAME,
                "record list is not a JSON array",
            )),
        }
    }
}

//! Errors returned by persistence clients

use thiserror::Error;

/// Errors that can occur while talking to a records backend
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PersistenceError {
    /// 401 Unauthorized - token invalid or expired
    #[error("{backend}: unauthorized (401)")]
    Unauthorized { backend: String },

    /// 403 Forbidden - token lacks required permissions
    #[error("{backend}: forbidden (403) - insufficient permissions")]
    Forbidden { backend: String },

    /// 404 - no record with this identifier
    #[error("{backend}: record '{entity_id}' not found")]
    NotFound { backend: String, entity_id: String },

    /// 429 Rate Limited
    #[error("{backend}: rate limited")]
    RateLimited { backend: String },

    /// Network, timeout or connection error
    #[error("{backend}: network error - {message}")]
    Network { backend: String, message: String },

    /// Other non-success HTTP status
    #[error("{backend}: HTTP {status} - {message}")]
    Http {
        backend: String,
        status: u16,
        message: String,
    },

    /// Response body was not a record
    #[error("{backend}: malformed response - {message}")]
    Decode { backend: String, message: String },

    /// Backend not configured (missing base URL)
    #[error("{backend}: not configured - {message}")]
    NotConfigured { backend: String, message: String },
}

impl PersistenceError {
    /// Check if this is an authentication error (401 or 403)
    pub fn is_auth_error(&self) -> bool {
        matches!(
            self,
            PersistenceError::Unauthorized { .. } | PersistenceError::Forbidden { .. }
        )
    }

    /// Check if the failure is transient and a manual retry may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            PersistenceError::Network { .. } | PersistenceError::RateLimited { .. } => true,
            PersistenceError::Http { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Get the backend name for this error
    pub fn backend_name(&self) -> &str {
        match self {
            PersistenceError::Unauthorized { backend }
            | PersistenceError::Forbidden { backend }
            | PersistenceError::NotFound { backend, .. }
            | PersistenceError::RateLimited { backend }
            | PersistenceError::Network { backend, .. }
            | PersistenceError::Http { backend, .. }
            | PersistenceError::Decode { backend, .. }
            | PersistenceError::NotConfigured { backend, .. } => backend,
        }
    }

    pub fn unauthorized(backend: impl Into<String>) -> Self {
        PersistenceError::Unauthorized {
            backend: backend.into(),
        }
    }

    pub fn forbidden(backend: impl Into<String>) -> Self {
        PersistenceError::Forbidden {
            backend: backend.into(),
        }
    }

    pub fn not_found(backend: impl Into<String>, entity_id: impl Into<String>) -> Self {
        PersistenceError::NotFound {
            backend: backend.into(),
            entity_id: entity_id.into(),
        }
    }

    pub fn rate_limited(backend: impl Into<String>) -> Self {
        PersistenceError::RateLimited {
            backend: backend.into(),
        }
    }

    pub fn network(backend: impl Into<String>, message: impl Into<String>) -> Self {
        PersistenceError::Network {
            backend: backend.into(),
            message: message.into(),
        }
    }

    pub fn http(backend: impl Into<String>, status: u16, message: impl Into<String>) -> Self {
        PersistenceError::Http {
            backend: backend.into(),
            status,
            message: message.into(),
        }
    }

    pub fn decode(backend: impl Into<String>, message: impl Into<String>) -> Self {
        PersistenceError::Decode {
            backend: backend.into(),
            message: message.into(),
        }
    }

    pub fn not_configured(backend: impl Into<String>, message: impl Into<String>) -> Self {
        PersistenceError::NotConfigured {
            backend: backend.into(),
            message: message.into(),
        }
    }

    /// Map an HTTP status code to the matching error variant
    pub fn from_status(
        backend: impl Into<String>,
        status: u16,
        entity_id: Option<&str>,
        body: impl Into<String>,
    ) -> Self {
        let backend = backend.into();
        match status {
            401 => Self::unauthorized(backend),
            403 => Self::forbidden(backend),
            404 => Self::not_found(backend, entity_id.unwrap_or_default()),
            429 => Self::rate_limited(backend),
            _ => Self::http(backend, status, body),
        }
    }
}

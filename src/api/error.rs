//! Tracker API error types

use std::collections::BTreeMap;
use thiserror::Error;

/// Errors that can occur when talking to the tracker
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Unauthorized (401): token invalid or expired")]
    Unauthorized,

    #[error("Forbidden (403): insufficient permissions")]
    Forbidden,

    #[error("Not found (404): {0}")]
    NotFound(String),

    /// The tracker rejected a create or update (HTTP 400). Server-side
    /// messages are preserved verbatim.
    #[error("Tracker rejected the request: {}", format_validation(.messages, .field_errors))]
    Validation {
        messages: Vec<String>,
        field_errors: BTreeMap<String, String>,
    },

    #[error(
        "Field catalog is empty; check that the account has browse permission \
         on the project and that the tracker URL points at the right instance"
    )]
    EmptyFieldCatalog,

    #[error("Malformed response: {context}")]
    Malformed { context: String },

    #[error("{what} is not configured")]
    NotConfigured { what: String },

    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },
}

fn format_validation(messages: &[String], field_errors: &BTreeMap<String, String>) -> String {
    let mut parts: Vec<String> = messages.to_vec();
    parts.extend(field_errors.iter().map(|(f, m)| format!("{f}: {m}")));
    parts.join("; ")
}

impl ApiError {
    /// Stable tag for scripting against `--json` output
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Connection(_) => "connection",
            ApiError::Unauthorized => "unauthorized",
            ApiError::Forbidden => "forbidden",
            ApiError::NotFound(_) => "not-found",
            ApiError::Validation { .. } => "validation",
            ApiError::EmptyFieldCatalog => "empty-catalog",
            ApiError::Malformed { .. } => "malformed",
            ApiError::NotConfigured { .. } => "not-configured",
            ApiError::Http { .. } => "http",
        }
    }

    /// Check if this is an authentication error (401 or 403)
    pub fn is_auth_error(&self) -> bool {
        matches!(self, ApiError::Unauthorized | ApiError::Forbidden)
    }

    pub fn not_configured(what: impl Into<String>) -> Self {
        ApiError::NotConfigured { what: what.into() }
    }

    pub fn malformed(context: impl Into<String>) -> Self {
        ApiError::Malformed {
            context: context.into(),
        }
    }

    pub fn http(status: u16, message: impl Into<String>) -> Self {
        ApiError::Http {
            status,
            message: message.into(),
        }
    }
}

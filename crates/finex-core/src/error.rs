use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FinexError {
    #[error("Document unreadable ({source_name}): {reason}")]
    DocumentUnreadable { source_name: String, reason: String },

    #[error("Page {requested} out of range: document has {page_count} pages")]
    PageIndex { requested: u32, page_count: u32 },

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Schema validation failed: {0}")]
    SchemaValidation(SchemaViolations),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("External tool error ({tool}): {message}")]
    Tool { tool: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl FinexError {
    pub fn unreadable(source_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::DocumentUnreadable {
            source_name: source_name.into(),
            reason: reason.into(),
        }
    }

    /// Violations carried by a `SchemaValidation` error, if that is what this is.
    pub fn violations(&self) -> Option<&[FieldViolation]> {
        match self {
            Self::SchemaValidation(v) => Some(&v.0),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, FinexError>;

// --- Provider ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderErrorKind {
    Authentication,
    RateLimited,
    Timeout,
    Transport,
    Status,
    MalformedPayload,
    Refused,
}

impl ProviderErrorKind {
    /// Kinds worth another attempt when backoff is enabled.
    pub fn is_transient(self) -> bool {
        matches!(self, Self::RateLimited | Self::Timeout)
    }
}

#[derive(Error, Debug, Clone)]
#[error("{kind:?}: {message}")]
pub struct ProviderError {
    pub kind: ProviderErrorKind,
    pub status: Option<u16>,
    pub message: String,
}

impl ProviderError {
    pub fn new(kind: ProviderErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            status: None,
            message: message.into(),
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }
}

// --- Schema validation ---

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "violation", rename_all = "snake_case")]
pub enum FieldViolation {
    Missing { field: String },
    TypeMismatch { field: String, expected: String, found: String },
    Unexpected { field: String },
    NotAnObject { found: String },
    NotJson { message: String },
}

impl FieldViolation {
    pub fn field(&self) -> Option<&str> {
        match self {
            Self::Missing { field }
            | Self::TypeMismatch { field, .. }
            | Self::Unexpected { field } => Some(field),
            Self::NotAnObject { .. } | Self::NotJson { .. } => None,
        }
    }
}

impl fmt::Display for FieldViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing { field } => write!(f, "missing field `{field}`"),
            Self::TypeMismatch {
                field,
                expected,
                found,
            } => write!(f, "field `{field}` expected {expected}, found {found}"),
            Self::Unexpected { field } => write!(f, "undeclared field `{field}`"),
            Self::NotAnObject { found } => write!(f, "expected a JSON object, found {found}"),
            Self::NotJson { message } => write!(f, "response is not valid JSON: {message}"),
        }
    }
}

/// Every violation found in one response, in schema order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaViolations(pub Vec<FieldViolation>);

impl SchemaViolations {
    pub fn missing_fields(&self) -> Vec<&str> {
        self.0
            .iter()
            .filter_map(|v| match v {
                FieldViolation::Missing { field } => Some(field.as_str()),
                _ => None,
            })
            .collect()
    }
}

impl fmt::Display for SchemaViolations {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(ToString::to_string).collect();
        f.write_str(&parts.join("; "))
    }
}

//! Normalized outcome of an auth operation.

use serde::{Serialize, Serializer};
use serde_json::Value;
use std::collections::BTreeMap;

/// Shown when nothing more specific is known.
pub const UNEXPECTED_ERROR: &str = "An unexpected error occurred. Please try again.";
/// Shown when the backend could not be reached.
pub const NETWORK_ERROR: &str = "Network error. Please check your connection.";

/// One or many messages for a single field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum FieldMessages {
    One(String),
    Many(Vec<String>),
}

impl FieldMessages {
    fn joined(&self) -> String {
        match self {
            FieldMessages::One(message) => message.clone(),
            FieldMessages::Many(messages) => messages.join(", "),
        }
    }
}

/// Structured error details returned by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ErrorDetails {
    Messages(Vec<String>),
    Fields(BTreeMap<String, FieldMessages>),
}

impl ErrorDetails {
    /// Interpret an `errors` value (or a whole error body).
    ///
    /// Arrays become a message list and objects a field map; other values
    /// carry no details. Non-string entries are kept in their JSON form.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Array(items) => Some(ErrorDetails::Messages(
                items.iter().map(stringify).collect(),
            )),
            Value::Object(fields) => Some(ErrorDetails::Fields(
                fields
                    .iter()
                    .map(|(field, messages)| {
                        let messages = match messages {
                            Value::Array(items) => {
                                FieldMessages::Many(items.iter().map(stringify).collect())
                            }
                            other => FieldMessages::One(stringify(other)),
                        };
                        (field.clone(), messages)
                    })
                    .collect(),
            )),
            _ => None,
        }
    }
}

fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Why an auth operation failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthFailure {
    pub error: String,
    pub status: Option<u16>,
    pub details: Option<ErrorDetails>,
}

impl AuthFailure {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            status: None,
            details: None,
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_details(mut self, details: Option<ErrorDetails>) -> Self {
        self.details = details;
        self
    }

    /// The message a form shows for this failure.
    ///
    /// A non-empty message list replaces the error; field messages are
    /// appended as `field: a, b; other: c`.
    pub fn display_message(&self) -> String {
        let base = if self.error.is_empty() {
            UNEXPECTED_ERROR.to_string()
        } else {
            self.error.clone()
        };

        match &self.details {
            Some(ErrorDetails::Messages(messages)) => {
                let joined = messages.join("; ");
                if joined.is_empty() {
                    base
                } else {
                    joined
                }
            }
            Some(ErrorDetails::Fields(fields)) if !fields.is_empty() => {
                let joined = fields
                    .iter()
                    .map(|(field, messages)| format!("{}: {}", field, messages.joined()))
                    .collect::<Vec<_>>()
                    .join("; ");
                format!("{} {}", base, joined)
            }
            _ => base,
        }
    }
}

/// Outcome of an auth operation. Failures are values, never errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthResult<T> {
    Success { data: T },
    Failure(AuthFailure),
}

impl<T> AuthResult<T> {
    pub fn success(data: T) -> Self {
        AuthResult::Success { data }
    }

    pub fn failure(failure: AuthFailure) -> Self {
        AuthResult::Failure(failure)
    }

    pub fn is_success(&self) -> bool {
        matches!(self, AuthResult::Success { .. })
    }

    pub fn data(&self) -> Option<&T> {
        match self {
            AuthResult::Success { data } => Some(data),
            AuthResult::Failure(_) => None,
        }
    }

    pub fn failure_ref(&self) -> Option<&AuthFailure> {
        match self {
            AuthResult::Success { .. } => None,
            AuthResult::Failure(failure) => Some(failure),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> AuthResult<U> {
        match self {
            AuthResult::Success { data } => AuthResult::Success { data: f(data) },
            AuthResult::Failure(failure) => AuthResult::Failure(failure),
        }
    }

    pub fn into_result(self) -> Result<T, AuthFailure> {
        match self {
            AuthResult::Success { data } => Ok(data),
            AuthResult::Failure(failure) => Err(failure),
        }
    }
}

#[derive(Serialize)]
#[serde(untagged)]
enum Wire<'a, T> {
    Success {
        success: bool,
        data: &'a T,
    },
    Failure {
        success: bool,
        error: &'a str,
        #[serde(skip_serializing_if = "Option::is_none")]
        status: Option<u16>,
        #[serde(skip_serializing_if = "Option::is_none")]
        details: Option<&'a ErrorDetails>,
    },
}

// {"success":true,"data":..} or {"success":false,"error":..,"status"?:..,"details"?:..}
impl<T: Serialize> Serialize for AuthResult<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let wire = match self {
            AuthResult::Success { data } => Wire::Success {
                success: true,
                data,
            },
            AuthResult::Failure(failure) => Wire::Failure {
                success: false,
                error: &failure.error,
                status: failure.status,
                details: failure.details.as_ref(),
            },
        };
        wire.serialize(serializer)
    }
}

//! Auth operations over the shared pipeline.
//!
//! Each operation wraps exactly one pipeline call and folds every outcome
//! into an [`AuthResult`]: parsed data on 2xx, a mapped message otherwise.

use crate::result::{ErrorDetails, NETWORK_ERROR, UNEXPECTED_ERROR};
use crate::{AuthFailure, AuthResult, Session, SessionStore};
use kindearth_http::{endpoints, HttpError, HttpRequest, HttpResponse, HttpResult, Pipeline};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

/// Credentials for `login`.
#[derive(Clone, Serialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

impl LoginRequest {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginRequest")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Account type chosen at registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccountRole {
    Customer,
    Vendor,
}

/// Body for `register`.
#[derive(Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<AccountRole>,
    /// Sent for vendors only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store_name: Option<String>,
}

impl fmt::Debug for RegisterRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisterRequest")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .field("first_name", &self.first_name)
            .field("last_name", &self.last_name)
            .field("phone", &self.phone)
            .field("role", &self.role)
            .field("store_name", &self.store_name)
            .finish()
    }
}

/// Registration response envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub success: bool,
    #[serde(default)]
    pub message: String,
    /// The new user's id.
    #[serde(default)]
    pub data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<Value>,
    #[serde(default)]
    pub timestamp: Option<String>,
}

impl RegisterResponse {
    pub fn user_id(&self) -> Option<String> {
        match &self.data {
            Value::String(id) => Some(id.clone()),
            Value::Number(id) => Some(id.to_string()),
            _ => None,
        }
    }
}

/// The backend calls an auth result can come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Login,
    Register,
    Logout,
    RefreshToken,
    Csrf,
}

impl Operation {
    pub fn label(&self) -> &'static str {
        match self {
            Operation::Login => "Login",
            Operation::Register => "Registration",
            Operation::Logout => "Logout",
            Operation::RefreshToken => "Token refresh",
            Operation::Csrf => "CSRF token fetch",
        }
    }

    /// Default message for an error status with no usable body.
    pub fn status_message(&self, status: u16) -> String {
        let mapped = match (self, status) {
            (Operation::Login, 401) => Some("Invalid email or password"),
            (Operation::Login, 429) => Some("Too many login attempts. Please try again later."),
            (Operation::Register, 409) => Some("Email already exists"),
            (Operation::Register, 429) => {
                Some("Too many registration attempts. Please try again later.")
            }
            (Operation::Login | Operation::Register, 500) => {
                Some("Server error. Please try again later.")
            }
            _ => None,
        };

        mapped
            .map(str::to_string)
            .unwrap_or_else(|| format!("{} failed ({})", self.label(), status))
    }
}

/// Map a non-2xx response to a failure.
pub fn failure_from_response(operation: Operation, response: &HttpResponse) -> AuthFailure {
    let status = response.status.as_u16();
    let default = operation.status_message(status);

    let body = match response.json_value() {
        Some(Value::Object(body)) if body.contains_key("message") || body.contains_key("errors") => {
            body
        }
        _ => return AuthFailure::new(default).with_status(status),
    };

    let error = body
        .get("message")
        .and_then(Value::as_str)
        .filter(|message| !message.is_empty())
        .map(str::to_string)
        .unwrap_or(default);

    let details = match body.get("errors") {
        Some(errors) if !errors.is_null() => ErrorDetails::from_value(errors),
        _ => ErrorDetails::from_value(&Value::Object(body.clone())),
    };

    AuthFailure::new(error)
        .with_status(status)
        .with_details(details)
}

/// Map a pipeline error to a failure.
pub fn failure_from_error(error: &HttpError) -> AuthFailure {
    if error.is_no_response() {
        return AuthFailure::new(NETWORK_ERROR);
    }

    let message = error.to_string();
    if message.is_empty() {
        AuthFailure::new(UNEXPECTED_ERROR)
    } else {
        AuthFailure::new(message)
    }
}

/// Auth operations bound to one pipeline.
#[derive(Clone)]
pub struct AuthClient {
    pipeline: Arc<Pipeline>,
}

impl AuthClient {
    pub fn new(pipeline: Arc<Pipeline>) -> Self {
        Self { pipeline }
    }

    pub fn pipeline(&self) -> &Arc<Pipeline> {
        &self.pipeline
    }

    /// Sign in. The user may come back bare or wrapped as `{"data": user}`.
    pub async fn login(&self, credentials: &LoginRequest) -> AuthResult<Session> {
        let request = match HttpRequest::post(endpoints::LOGIN).with_json(credentials) {
            Ok(request) => request,
            Err(e) => return AuthResult::failure(failure_from_error(&e)),
        };
        self.call(Operation::Login, request, parse_user).await
    }

    pub async fn register(&self, body: &RegisterRequest) -> AuthResult<RegisterResponse> {
        let request = match HttpRequest::post(endpoints::REGISTER).with_json(body) {
            Ok(request) => request,
            Err(e) => return AuthResult::failure(failure_from_error(&e)),
        };
        self.call(Operation::Register, request, |response| response.json())
            .await
    }

    /// Server-side logout only. See [`AuthClient::sign_out`].
    pub async fn logout(&self) -> AuthResult<()> {
        self.call(Operation::Logout, HttpRequest::post(endpoints::LOGOUT), |_| Ok(()))
            .await
    }

    /// Clear the local session, then tell the backend. The local clear
    /// happens whatever the backend answers.
    pub async fn sign_out(&self, store: &SessionStore) -> AuthResult<()> {
        if let Err(e) = store.logout() {
            warn!(error = %e, "Failed to clear stored user");
        }
        self.logout().await
    }

    pub async fn refresh_token(&self) -> AuthResult<Value> {
        self.call(
            Operation::RefreshToken,
            HttpRequest::post(endpoints::REFRESH_TOKEN),
            body_value,
        )
        .await
    }

    pub async fn get_csrf(&self) -> AuthResult<Value> {
        self.call(
            Operation::Csrf,
            HttpRequest::get(endpoints::CSRF_TOKEN),
            body_value,
        )
        .await
    }

    async fn call<T>(
        &self,
        operation: Operation,
        request: HttpRequest,
        parse: impl FnOnce(&HttpResponse) -> HttpResult<T>,
    ) -> AuthResult<T> {
        let response = match self.pipeline.send(request).await {
            Ok(response) => response,
            Err(e) => {
                warn!(operation = operation.label(), error = %e, "Auth request failed");
                return AuthResult::failure(failure_from_error(&e));
            }
        };

        if !response.is_success() {
            let failure = failure_from_response(operation, &response);
            warn!(
                operation = operation.label(),
                status = response.status.as_u16(),
                error = %failure.error,
                "Auth request rejected"
            );
            return AuthResult::failure(failure);
        }

        match parse(&response) {
            Ok(data) => {
                info!(operation = operation.label(), "Auth request succeeded");
                AuthResult::success(data)
            }
            Err(e) => {
                warn!(
                    operation = operation.label(),
                    body = %response.body_summary(),
                    error = %e,
                    "Unreadable auth response"
                );
                AuthResult::failure(failure_from_error(&e))
            }
        }
    }
}

fn parse_user(response: &HttpResponse) -> HttpResult<Session> {
    let body: Value = response.json()?;
    let user = match body {
        Value::Object(mut fields) if !fields.contains_key("id") && fields.contains_key("data") => {
            fields.remove("data").unwrap_or(Value::Null)
        }
        other => other,
    };
    Ok(serde_json::from_value(user)?)
}

fn body_value(response: &HttpResponse) -> HttpResult<Value> {
    Ok(response.json_value().unwrap_or(Value::Null))
}

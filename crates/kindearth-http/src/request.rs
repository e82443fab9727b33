//! Request, response and in-flight envelope types.

use crate::{endpoints, HttpError, HttpResult};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use uuid::Uuid;

/// An outgoing request, before the pipeline's request steps run.
#[derive(Clone)]
pub struct HttpRequest {
    pub method: Method,
    /// Path relative to the base URL, or an absolute URL.
    pub path: String,
    pub headers: HeaderMap,
    pub body: Option<serde_json::Value>,
}

impl HttpRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            headers: HeaderMap::new(),
            body: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    /// Attach a JSON body.
    pub fn with_json<T: Serialize>(mut self, body: &T) -> HttpResult<Self> {
        self.body = Some(serde_json::to_value(body)?);
        Ok(self)
    }

    /// Set a header, replacing any previous value.
    pub fn set_header(&mut self, name: &str, value: &str) -> HttpResult<()> {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| HttpError::InvalidHeader(e.to_string()))?;
        let value =
            HeaderValue::from_str(value).map_err(|e| HttpError::InvalidHeader(e.to_string()))?;
        self.headers.insert(name, value);
        Ok(())
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn is_auth_endpoint(&self) -> bool {
        endpoints::is_auth_endpoint(&self.path)
    }
}

// Bodies carry passwords; never print them.
impl fmt::Debug for HttpRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpRequest")
            .field("method", &self.method)
            .field("path", &self.path)
            .field("headers", &self.headers.keys().collect::<Vec<_>>())
            .field("body", &self.body.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// A response received from the backend, whatever its status.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: StatusCode, body: impl Into<String>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status == StatusCode::UNAUTHORIZED
    }

    /// Deserialize the body.
    pub fn json<T: DeserializeOwned>(&self) -> HttpResult<T> {
        Ok(serde_json::from_str(&self.body)?)
    }

    /// The body as a JSON value, or None if it is empty or not JSON.
    pub fn json_value(&self) -> Option<serde_json::Value> {
        if self.body.trim().is_empty() {
            return None;
        }
        serde_json::from_str(&self.body).ok()
    }

    /// Length and digest of the body, for logs.
    pub fn body_summary(&self) -> String {
        summarize_body(&self.body)
    }
}

pub(crate) fn summarize_body(body: &str) -> String {
    let mut hasher = DefaultHasher::new();
    body.hash(&mut hasher);
    format!("len={},digest={:016x}", body.len(), hasher.finish())
}

/// An in-flight request as the pipeline tracks it.
///
/// The original request is kept untouched; request steps run on a fresh copy
/// for every dispatch, so a replay picks up a rotated CSRF token.
#[derive(Debug, Clone)]
pub struct RequestEnvelope {
    id: Uuid,
    request: HttpRequest,
    retried: bool,
    dispatches: u32,
    refresh_generation: u64,
}

impl RequestEnvelope {
    pub fn new(request: HttpRequest) -> Self {
        Self {
            id: Uuid::new_v4(),
            request,
            retried: false,
            dispatches: 0,
            refresh_generation: 0,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn request(&self) -> &HttpRequest {
        &self.request
    }

    /// Whether this request has already been replayed after a refresh.
    pub fn is_retried(&self) -> bool {
        self.retried
    }

    pub fn mark_retried(&mut self) {
        self.retried = true;
    }

    /// How many times this request has been handed to the transport.
    pub fn dispatches(&self) -> u32 {
        self.dispatches
    }

    pub(crate) fn mark_dispatched(&mut self) {
        self.dispatches += 1;
    }

    /// Refresh generation seen when the request was last dispatched.
    pub fn refresh_generation(&self) -> u64 {
        self.refresh_generation
    }

    pub fn observe_refresh_generation(&mut self, generation: u64) {
        self.refresh_generation = generation;
    }
}

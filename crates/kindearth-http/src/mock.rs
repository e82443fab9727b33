//! Scripted transport for tests.

use crate::{HttpError, HttpRequest, HttpResponse, HttpResult, Transport};
use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::StatusCode;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;

#[derive(Debug, Clone)]
enum Outcome {
    Response { status: u16, body: String },
    ConnectError,
    Timeout,
}

/// One canned answer.
#[derive(Debug, Clone)]
pub struct ScriptedResponse {
    outcome: Outcome,
    /// `None` removes the cookie.
    cookies: Vec<(String, Option<String>)>,
    delay: Option<Duration>,
}

impl ScriptedResponse {
    fn from_outcome(outcome: Outcome) -> Self {
        Self {
            outcome,
            cookies: Vec::new(),
            delay: None,
        }
    }

    /// A response with an empty body.
    pub fn status(status: u16) -> Self {
        Self::text(status, "")
    }

    pub fn text(status: u16, body: &str) -> Self {
        Self::from_outcome(Outcome::Response {
            status,
            body: body.to_string(),
        })
    }

    pub fn json(status: u16, body: serde_json::Value) -> Self {
        Self::text(status, &body.to_string())
    }

    pub fn connect_error() -> Self {
        Self::from_outcome(Outcome::ConnectError)
    }

    pub fn timeout() -> Self {
        Self::from_outcome(Outcome::Timeout)
    }

    /// Set a cookie in the jar when this answer is served.
    pub fn with_cookie(mut self, name: &str, value: &str) -> Self {
        self.cookies.push((name.to_string(), Some(value.to_string())));
        self
    }

    pub fn clearing_cookie(mut self, name: &str) -> Self {
        self.cookies.push((name.to_string(), None));
        self
    }

    /// Wait before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

/// Transport that answers from per-path scripts and records what it was sent.
///
/// Queued answers are served first, in order; after that the path's default
/// answer, if any; otherwise 404.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    queues: Mutex<HashMap<String, VecDeque<ScriptedResponse>>>,
    defaults: Mutex<HashMap<String, ScriptedResponse>>,
    cookies: Mutex<HashMap<String, String>>,
    requests: Mutex<Vec<HttpRequest>>,
}

fn key(path: &str) -> String {
    path.trim_start_matches('/').to_string()
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue one answer for `path`.
    pub fn push(&self, path: &str, response: ScriptedResponse) -> &Self {
        self.queues
            .lock()
            .entry(key(path))
            .or_default()
            .push_back(response);
        self
    }

    /// Answer every request to `path` that finds the queue empty.
    pub fn set_default(&self, path: &str, response: ScriptedResponse) -> &Self {
        self.defaults.lock().insert(key(path), response);
        self
    }

    pub fn set_cookie(&self, name: &str, value: &str) {
        self.cookies
            .lock()
            .insert(name.to_string(), value.to_string());
    }

    /// Every request sent, after the pipeline's request steps.
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().clone()
    }

    pub fn requests_to(&self, path: &str) -> Vec<HttpRequest> {
        let wanted = key(path);
        self.requests
            .lock()
            .iter()
            .filter(|r| key(&r.path) == wanted)
            .cloned()
            .collect()
    }

    pub fn count(&self, path: &str) -> usize {
        self.requests_to(path).len()
    }

    fn next_response(&self, path: &str) -> Option<ScriptedResponse> {
        let path = key(path);
        if let Some(response) = self.queues.lock().get_mut(&path).and_then(VecDeque::pop_front) {
            return Some(response);
        }
        self.defaults.lock().get(&path).cloned()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: &HttpRequest) -> HttpResult<HttpResponse> {
        self.requests.lock().push(request.clone());

        let Some(scripted) = self.next_response(&request.path) else {
            return Ok(HttpResponse::new(StatusCode::NOT_FOUND, ""));
        };

        if let Some(delay) = scripted.delay {
            tokio::time::sleep(delay).await;
        }

        {
            let mut cookies = self.cookies.lock();
            for (name, value) in &scripted.cookies {
                match value {
                    Some(value) => cookies.insert(name.clone(), value.clone()),
                    None => cookies.remove(name),
                };
            }
        }

        match scripted.outcome {
            Outcome::Response { status, body } => {
                let status = StatusCode::from_u16(status)
                    .map_err(|e| HttpError::Request(e.to_string()))?;
                Ok(HttpResponse::new(status, body))
            }
            Outcome::ConnectError => Err(HttpError::Connect("connection refused".to_string())),
            Outcome::Timeout => Err(HttpError::Timeout),
        }
    }

    fn cookie(&self, name: &str) -> Option<String> {
        self.cookies.lock().get(name).cloned()
    }

    fn clear_cookies(&self, names: &[&str]) {
        let mut cookies = self.cookies.lock();
        for name in names {
            cookies.remove(*name);
        }
    }
}

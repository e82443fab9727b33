//! CSRF token bootstrap and header attachment.
//!
//! The token is fetched once at startup by [`CsrfBootstrapper`], with
//! bounded retries. [`CsrfHeader`] echoes the current token back on every
//! request without ever waiting for the bootstrap: until a token is known,
//! requests go out without the header.

use crate::csrf_fsm::{CsrfMachine, CsrfMachineInput, CsrfStatus};
use crate::endpoints::{self, CSRF_COOKIE, CSRF_HEADER};
use crate::retry::{retry, RetryConfig, Sleeper, TokioSleeper};
use crate::{HttpError, HttpRequest, HttpResponse, HttpResult, Pipeline, RequestStep, Transport};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// JSON body fields a CSRF token may be returned in.
const TOKEN_FIELDS: [&str; 3] = ["token", "csrfToken", "csrf_token"];

/// Snapshot of the CSRF bootstrap state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CsrfState {
    pub token: Option<String>,
    pub loaded: bool,
    pub last_error: Option<String>,
}

/// Process-wide CSRF state. Only the bootstrapper writes to it.
pub struct CsrfStore {
    state: Mutex<CsrfState>,
    fsm: Mutex<CsrfMachine>,
    status_tx: watch::Sender<CsrfStatus>,
}

impl Default for CsrfStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CsrfStore {
    pub fn new() -> Self {
        let (status_tx, _) = watch::channel(CsrfStatus::Idle);
        Self {
            state: Mutex::new(CsrfState::default()),
            fsm: Mutex::new(CsrfMachine::new()),
            status_tx,
        }
    }

    pub fn snapshot(&self) -> CsrfState {
        self.state.lock().clone()
    }

    pub fn token(&self) -> Option<String> {
        self.state.lock().token.clone()
    }

    pub fn is_loaded(&self) -> bool {
        self.state.lock().loaded
    }

    pub fn last_error(&self) -> Option<String> {
        self.state.lock().last_error.clone()
    }

    pub fn status(&self) -> CsrfStatus {
        CsrfStatus::from(self.fsm.lock().state())
    }

    /// Watch status changes, e.g. to hold back work until `Ready` or `Failed`.
    pub fn subscribe(&self) -> watch::Receiver<CsrfStatus> {
        self.status_tx.subscribe()
    }

    pub(crate) fn transition(&self, input: &CsrfMachineInput) -> HttpResult<CsrfStatus> {
        let mut fsm = self.fsm.lock();
        let old_status = CsrfStatus::from(fsm.state());

        fsm.consume(input).map_err(|_| {
            HttpError::InvalidStateTransition(format!(
                "Cannot apply {:?} in state {:?}",
                input,
                fsm.state()
            ))
        })?;

        let new_status = CsrfStatus::from(fsm.state());
        drop(fsm);

        if old_status != new_status {
            debug!(old_status = ?old_status, new_status = ?new_status, "CSRF status transition");
            self.status_tx.send_replace(new_status);
        }
        Ok(new_status)
    }

    /// Best-effort transition for steps inside a running bootstrap.
    fn advance(&self, input: &CsrfMachineInput) {
        if let Err(e) = self.transition(input) {
            warn!(error = %e, "Ignoring CSRF status transition");
        }
    }

    /// A fetch succeeded. A token replaces the stored one; a success without
    /// a readable token keeps whatever was stored.
    pub(crate) fn record_success(&self, token: Option<String>) {
        let mut state = self.state.lock();
        if token.is_some() {
            state.token = token;
        }
        state.loaded = true;
        state.last_error = None;
    }

    /// Every attempt of a run failed. `loaded` drops back to false so it
    /// always agrees with the status; a previous token is kept for the header
    /// fallback.
    pub(crate) fn record_failure(&self, error: String) {
        let mut state = self.state.lock();
        state.loaded = false;
        state.last_error = Some(error);
    }
}

/// Request step that sets `X-CSRF-TOKEN`.
///
/// The live `csrf-cookie` wins over the stored token, since the backend may
/// rotate it on any response.
pub struct CsrfHeader {
    store: Arc<CsrfStore>,
}

impl CsrfHeader {
    pub fn new(store: Arc<CsrfStore>) -> Self {
        Self { store }
    }
}

impl RequestStep for CsrfHeader {
    fn name(&self) -> &'static str {
        "csrf_header"
    }

    fn apply(&self, request: &mut HttpRequest, transport: &dyn Transport) -> HttpResult<()> {
        let token = transport
            .cookie(CSRF_COOKIE)
            .or_else(|| self.store.token());

        match token {
            Some(token) => request.set_header(CSRF_HEADER, &token),
            None => Ok(()),
        }
    }
}

/// Fetches the CSRF token with bounded retries.
pub struct CsrfBootstrapper {
    pipeline: Arc<Pipeline>,
    store: Arc<CsrfStore>,
    config: RetryConfig,
    sleeper: Arc<dyn Sleeper>,
    /// One bootstrap run at a time.
    run_lock: tokio::sync::Mutex<()>,
}

impl CsrfBootstrapper {
    pub fn new(pipeline: Arc<Pipeline>, store: Arc<CsrfStore>) -> Self {
        Self {
            pipeline,
            store,
            config: RetryConfig::default(),
            sleeper: Arc::new(TokioSleeper),
            run_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn with_retry_config(mut self, config: RetryConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn store(&self) -> &Arc<CsrfStore> {
        &self.store
    }

    /// Fetch the token unless a previous run already succeeded.
    ///
    /// Returns the token (if the backend exposed one) on success, or
    /// [`HttpError::CsrfExhausted`] once every attempt failed. Never exits
    /// the process; the caller decides what a failure means.
    pub async fn bootstrap(&self) -> HttpResult<Option<String>> {
        let _guard = self.run_lock.lock().await;

        let input = match self.store.status() {
            CsrfStatus::Ready => return Ok(self.store.token()),
            CsrfStatus::Failed => CsrfMachineInput::ManualRetry,
            _ => CsrfMachineInput::Start,
        };
        self.run(input).await
    }

    /// Fetch again now, whatever the current status.
    pub async fn retry_now(&self) -> HttpResult<Option<String>> {
        let _guard = self.run_lock.lock().await;

        let input = match self.store.status() {
            CsrfStatus::Ready => CsrfMachineInput::Refetch,
            CsrfStatus::Failed => CsrfMachineInput::ManualRetry,
            _ => CsrfMachineInput::Start,
        };
        self.run(input).await
    }

    async fn run(&self, input: CsrfMachineInput) -> HttpResult<Option<String>> {
        self.store.transition(&input)?;

        let result = retry(&self.config, self.sleeper.as_ref(), move |attempt| async move {
            if attempt > 1 {
                self.store.advance(&CsrfMachineInput::BackoffElapsed);
            }
            debug!(attempt, "Fetching CSRF token");

            let result = self.fetch_once().await;
            if result.is_err() {
                self.store.advance(&CsrfMachineInput::FetchFailed);
            }
            result
        })
        .await;

        match result {
            Ok(token) => {
                self.store.record_success(token.clone());
                self.store.advance(&CsrfMachineInput::FetchSucceeded);
                info!(has_token = token.is_some(), "CSRF token loaded");
                Ok(token)
            }
            Err(exhausted) => {
                let last_error = exhausted.last_error.to_string();
                self.store.record_failure(last_error.clone());
                self.store.advance(&CsrfMachineInput::Exhausted);
                error!(
                    attempts = exhausted.attempts,
                    error = %last_error,
                    "CSRF token fetch failed"
                );
                Err(HttpError::CsrfExhausted {
                    attempts: exhausted.attempts,
                    last_error,
                })
            }
        }
    }

    async fn fetch_once(&self) -> HttpResult<Option<String>> {
        let response = self.pipeline.get(endpoints::CSRF_TOKEN).await?;
        if !response.is_success() {
            return Err(HttpError::Status(response.status.as_u16()));
        }

        Ok(self
            .pipeline
            .transport()
            .cookie(CSRF_COOKIE)
            .or_else(|| token_from_body(&response)))
    }
}

fn token_from_body(response: &HttpResponse) -> Option<String> {
    let body = response.json_value()?;
    TOKEN_FIELDS
        .iter()
        .find_map(|field| body.get(field)?.as_str().map(str::to_string))
        .filter(|token| !token.is_empty())
}

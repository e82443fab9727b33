//! Session refresh on 401 with a single replay.
//!
//! A 401 from any endpoint other than the auth endpoints means the access
//! cookie expired. [`SessionRefresh`] refreshes once and replays the request
//! once; if the refresh fails it drops the credential cookies and reports
//! the session as lost. Concurrent 401s share one refresh through
//! [`RefreshGate`].

use crate::endpoints::{self, CREDENTIAL_COOKIES};
use crate::{HttpError, HttpResponse, HttpResult, Pipeline, Recovery, RecoveryStep, RequestEnvelope};
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info, warn};

/// Renews the session cookies.
#[async_trait]
pub trait SessionRefresher: Send + Sync {
    async fn refresh(&self, pipeline: &Pipeline) -> HttpResult<()>;
}

/// Refreshes by posting to the refresh endpoint through the pipeline, so the
/// refresh request carries the CSRF header and the refresh cookie.
#[derive(Debug, Clone, Copy, Default)]
pub struct EndpointRefresher;

#[async_trait]
impl SessionRefresher for EndpointRefresher {
    async fn refresh(&self, pipeline: &Pipeline) -> HttpResult<()> {
        let response = pipeline.post(endpoints::REFRESH_TOKEN).await?;
        if response.is_success() {
            Ok(())
        } else {
            Err(HttpError::RefreshFailed(format!(
                "HTTP {}",
                response.status.as_u16()
            )))
        }
    }
}

/// Told when a session could not be refreshed and the user must sign in again.
pub trait SessionLostHandler: Send + Sync {
    fn on_session_lost(&self);
}

/// Handler that only logs.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSessionLost;

impl SessionLostHandler for LogSessionLost {
    fn on_session_lost(&self) {
        warn!("Session lost, login required");
    }
}

/// Result of passing through the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateOutcome {
    pub succeeded: bool,
    /// False when the outcome of another caller's refresh was reused.
    pub ran: bool,
}

/// Single-flight refresh gate.
///
/// Every completed refresh bumps the generation. A caller that observed an
/// older generation when its request went out reuses the latest outcome:
/// its 401 came from the same expired cookie. Callers that are current run
/// a new refresh, one at a time.
#[derive(Debug, Default)]
pub struct RefreshGate {
    generation: AtomicU64,
    last_succeeded: tokio::sync::Mutex<Option<bool>>,
}

impl RefreshGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of refreshes completed so far.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    pub async fn run<F, Fut>(&self, observed_generation: u64, refresh: F) -> GateOutcome
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = HttpResult<()>>,
    {
        let mut last_succeeded = self.last_succeeded.lock().await;

        if self.generation() > observed_generation {
            if let Some(succeeded) = *last_succeeded {
                debug!(succeeded, "Joining completed refresh");
                return GateOutcome {
                    succeeded,
                    ran: false,
                };
            }
        }

        let succeeded = match refresh().await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "Session refresh failed");
                false
            }
        };
        *last_succeeded = Some(succeeded);
        self.generation.fetch_add(1, Ordering::AcqRel);

        GateOutcome {
            succeeded,
            ran: true,
        }
    }
}

/// Recovery step that refreshes the session on 401 and replays once.
pub struct SessionRefresh {
    refresher: Arc<dyn SessionRefresher>,
    on_lost: Arc<dyn SessionLostHandler>,
    gate: RefreshGate,
}

impl SessionRefresh {
    pub fn new(refresher: Arc<dyn SessionRefresher>, on_lost: Arc<dyn SessionLostHandler>) -> Self {
        Self {
            refresher,
            on_lost,
            gate: RefreshGate::new(),
        }
    }
}

#[async_trait]
impl RecoveryStep for SessionRefresh {
    fn name(&self) -> &'static str {
        "session_refresh"
    }

    fn on_dispatch(&self, envelope: &mut RequestEnvelope) {
        envelope.observe_refresh_generation(self.gate.generation());
    }

    async fn recover(
        &self,
        pipeline: &Pipeline,
        envelope: &mut RequestEnvelope,
        response: HttpResponse,
    ) -> HttpResult<Recovery> {
        if !response.is_unauthorized() {
            return Ok(Recovery::Respond(response));
        }

        if envelope.request().is_auth_endpoint() {
            debug!(
                request_id = %envelope.id(),
                path = %envelope.request().path,
                "401 from auth endpoint, not refreshing"
            );
            return Ok(Recovery::Respond(response));
        }

        if envelope.is_retried() {
            warn!(
                request_id = %envelope.id(),
                path = %envelope.request().path,
                "401 after refresh, giving up"
            );
            return Ok(Recovery::Respond(response));
        }

        envelope.mark_retried();
        info!(
            request_id = %envelope.id(),
            path = %envelope.request().path,
            "Session expired, refreshing"
        );

        let refresher = self.refresher.clone();
        let outcome = self
            .gate
            .run(envelope.refresh_generation(), || async move {
                refresher.refresh(pipeline).await
            })
            .await;

        if outcome.succeeded {
            return Ok(Recovery::Replay);
        }

        if outcome.ran {
            pipeline.transport().clear_cookies(&CREDENTIAL_COOKIES);
            self.on_lost.on_session_lost();
        }
        Ok(Recovery::Respond(response))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    #[tokio::test]
    async fn test_gate_reuses_outcome_for_stale_generation() {
        let gate = RefreshGate::new();
        let calls = AtomicU32::new(0);
        let observed = gate.generation();

        let first = gate
            .run(observed, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await;
        let second = gate
            .run(observed, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await;

        assert_eq!(first, GateOutcome { succeeded: true, ran: true });
        assert_eq!(second, GateOutcome { succeeded: true, ran: false });
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(gate.generation(), 1);
    }

    #[tokio::test]
    async fn test_gate_runs_again_for_current_generation() {
        let gate = RefreshGate::new();

        let first = gate
            .run(gate.generation(), || async {
                Err(HttpError::RefreshFailed("HTTP 401".to_string()))
            })
            .await;
        assert_eq!(first, GateOutcome { succeeded: false, ran: true });

        let later = gate.run(gate.generation(), || async { Ok(()) }).await;
        assert_eq!(later, GateOutcome { succeeded: true, ran: true });
        assert_eq!(gate.generation(), 2);
    }

    #[tokio::test]
    async fn test_stale_caller_shares_failure() {
        let gate = RefreshGate::new();
        gate.run(0, || async {
            Err(HttpError::RefreshFailed("HTTP 403".to_string()))
        })
        .await;

        let joined = gate.run(0, || async { Ok(()) }).await;
        assert_eq!(joined, GateOutcome { succeeded: false, ran: false });
    }
}

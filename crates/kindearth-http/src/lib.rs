//! CSRF-aware HTTP client core for the KindEarth storefront.
//!
//! One shared [`Pipeline`] carries every backend call:
//! - [`CsrfHeader`] echoes the CSRF token as `X-CSRF-TOKEN`
//! - [`SessionRefresh`] turns a 401 into one refresh and one replay
//!
//! [`CsrfBootstrapper`] fetches the CSRF token once at startup with bounded
//! retries and exponential backoff.

pub mod csrf;
pub mod csrf_fsm;
pub mod endpoints;
mod error;
pub mod pipeline;
pub mod refresh;
mod request;
pub mod retry;
mod transport;

#[cfg(any(test, feature = "test-util"))]
pub mod mock;

#[cfg(test)]
mod tests;

pub use csrf::{CsrfBootstrapper, CsrfHeader, CsrfState, CsrfStore};
pub use csrf_fsm::CsrfStatus;
pub use error::{HttpError, HttpResult};
pub use pipeline::{Pipeline, PipelineBuilder, Recovery, RecoveryStep, RequestStep};
pub use refresh::{
    EndpointRefresher, LogSessionLost, RefreshGate, SessionLostHandler, SessionRefresh,
    SessionRefresher,
};
pub use request::{HttpRequest, HttpResponse, RequestEnvelope};
pub use retry::{retry, RetryConfig, RetryExhausted, Sleeper, TokioSleeper};
pub use transport::{ReqwestTransport, Transport};

pub use reqwest::{Method, StatusCode};

use std::sync::Arc;

/// Build the standard pipeline: CSRF header on every request, session
/// refresh on 401.
pub fn standard_pipeline(
    transport: Arc<dyn Transport>,
    csrf: Arc<CsrfStore>,
    on_session_lost: Arc<dyn SessionLostHandler>,
) -> Pipeline {
    Pipeline::builder(transport)
        .request_step(Arc::new(CsrfHeader::new(csrf)))
        .recovery_step(Arc::new(SessionRefresh::new(
            Arc::new(EndpointRefresher),
            on_session_lost,
        )))
        .build()
}

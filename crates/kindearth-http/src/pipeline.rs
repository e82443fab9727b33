//! The shared request pipeline.
//!
//! Every request goes through the same ordered stages:
//!
//! ```text
//! HttpRequest ──► RequestStep* ──► Transport ──► RecoveryStep* ──► caller
//!                     ▲                               │
//!                     └──────────── Replay ───────────┘
//! ```
//!
//! Request steps decorate a fresh copy of the caller's request on every
//! dispatch. Recovery steps look at the response and either pass a response
//! on or ask for the same envelope to be dispatched again.

use crate::{HttpRequest, HttpResponse, HttpResult, RequestEnvelope, Transport};
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Decorates an outgoing request before it is sent.
pub trait RequestStep: Send + Sync {
    fn name(&self) -> &'static str;

    fn apply(&self, request: &mut HttpRequest, transport: &dyn Transport) -> HttpResult<()>;
}

/// What a recovery step decided about a response.
#[derive(Debug)]
pub enum Recovery {
    /// Hand this response to the next step, or to the caller.
    Respond(HttpResponse),
    /// Dispatch the envelope again and start the recovery stage over.
    Replay,
}

/// Inspects a received response and may recover from it.
///
/// A step that returns [`Recovery::Replay`] is responsible for bounding how
/// often it does so for one envelope.
#[async_trait]
pub trait RecoveryStep: Send + Sync {
    fn name(&self) -> &'static str;

    /// Called right before each dispatch of an envelope.
    fn on_dispatch(&self, _envelope: &mut RequestEnvelope) {}

    async fn recover(
        &self,
        pipeline: &Pipeline,
        envelope: &mut RequestEnvelope,
        response: HttpResponse,
    ) -> HttpResult<Recovery>;
}

/// One shared pipeline for all backend calls.
pub struct Pipeline {
    transport: Arc<dyn Transport>,
    request_steps: Vec<Arc<dyn RequestStep>>,
    recovery_steps: Vec<Arc<dyn RecoveryStep>>,
}

impl Pipeline {
    pub fn builder(transport: Arc<dyn Transport>) -> PipelineBuilder {
        PipelineBuilder::new(transport)
    }

    pub fn transport(&self) -> &dyn Transport {
        self.transport.as_ref()
    }

    /// Send a request through every stage.
    pub async fn send(&self, request: HttpRequest) -> HttpResult<HttpResponse> {
        self.execute(RequestEnvelope::new(request)).await
    }

    pub async fn get(&self, path: &str) -> HttpResult<HttpResponse> {
        self.send(HttpRequest::get(path)).await
    }

    /// POST without a body.
    pub async fn post(&self, path: &str) -> HttpResult<HttpResponse> {
        self.send(HttpRequest::post(path)).await
    }

    pub async fn post_json<T: Serialize + Sync>(
        &self,
        path: &str,
        body: &T,
    ) -> HttpResult<HttpResponse> {
        self.send(HttpRequest::post(path).with_json(body)?).await
    }

    /// Run an envelope to completion.
    pub async fn execute(&self, mut envelope: RequestEnvelope) -> HttpResult<HttpResponse> {
        'dispatch: loop {
            let mut response = self.dispatch(&mut envelope).await?;

            for step in &self.recovery_steps {
                match step.recover(self, &mut envelope, response).await? {
                    Recovery::Respond(next) => response = next,
                    Recovery::Replay => {
                        info!(
                            request_id = %envelope.id(),
                            path = %envelope.request().path,
                            step = step.name(),
                            "Replaying request"
                        );
                        continue 'dispatch;
                    }
                }
            }

            return Ok(response);
        }
    }

    async fn dispatch(&self, envelope: &mut RequestEnvelope) -> HttpResult<HttpResponse> {
        let mut request = envelope.request().clone();
        for step in &self.request_steps {
            step.apply(&mut request, self.transport.as_ref())?;
        }

        for step in &self.recovery_steps {
            step.on_dispatch(envelope);
        }
        envelope.mark_dispatched();
        debug!(
            request_id = %envelope.id(),
            method = %request.method,
            path = %request.path,
            dispatch = envelope.dispatches(),
            "Dispatching request"
        );

        match self.transport.send(&request).await {
            Ok(response) => {
                debug!(
                    request_id = %envelope.id(),
                    path = %request.path,
                    status = response.status.as_u16(),
                    body = %response.body_summary(),
                    "Response received"
                );
                Ok(response)
            }
            Err(e) => {
                warn!(
                    request_id = %envelope.id(),
                    path = %request.path,
                    error = %e,
                    "Request failed"
                );
                Err(e)
            }
        }
    }
}

/// Assembles a [`Pipeline`]. Steps run in the order they are added.
pub struct PipelineBuilder {
    transport: Arc<dyn Transport>,
    request_steps: Vec<Arc<dyn RequestStep>>,
    recovery_steps: Vec<Arc<dyn RecoveryStep>>,
}

impl PipelineBuilder {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            request_steps: Vec::new(),
            recovery_steps: Vec::new(),
        }
    }

    pub fn request_step(mut self, step: Arc<dyn RequestStep>) -> Self {
        self.request_steps.push(step);
        self
    }

    pub fn recovery_step(mut self, step: Arc<dyn RecoveryStep>) -> Self {
        self.recovery_steps.push(step);
        self
    }

    pub fn build(self) -> Pipeline {
        debug!(
            request_steps = ?self.request_steps.iter().map(|s| s.name()).collect::<Vec<_>>(),
            recovery_steps = ?self.recovery_steps.iter().map(|s| s.name()).collect::<Vec<_>>(),
            "Pipeline assembled"
        );
        Pipeline {
            transport: self.transport,
            request_steps: self.request_steps,
            recovery_steps: self.recovery_steps,
        }
    }
}

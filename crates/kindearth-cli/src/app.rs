//! Client wiring and command handlers.

use std::sync::Arc;

use anyhow::Result;
use clap::Args;
use kindearth_auth::validation::{
    validate_login_form, validate_registration_form, FieldErrors, RegistrationForm,
};
use kindearth_auth::{
    AccountRole, AuthClient, AuthFailure, AuthResult, ErrorDetails, FieldMessages, LoginRequest,
    RegisterRequest, SessionStore,
};
use kindearth_config::{Config, Paths};
use kindearth_http::{
    standard_pipeline, CsrfBootstrapper, CsrfStore, ReqwestTransport, RetryConfig, Transport,
};
use kindearth_storage::{create_durable_storage, create_ephemeral_storage};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{info, warn};

const INVALID_FORM: &str = "Please fix the highlighted fields";

/// Arguments for `register`.
#[derive(Args, Debug, Clone)]
pub struct RegisterArgs {
    #[arg(short, long)]
    pub email: String,
    #[arg(short, long)]
    pub password: String,
    /// Defaults to the password
    #[arg(long)]
    pub confirm_password: Option<String>,
    #[arg(long)]
    pub first_name: String,
    #[arg(long)]
    pub last_name: String,
    #[arg(long)]
    pub phone: String,
    /// Register a vendor account (requires --store-name)
    #[arg(long)]
    pub vendor: bool,
    #[arg(long)]
    pub store_name: Option<String>,
}

/// What a command printed and whether it succeeded.
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    pub ok: bool,
    pub output: Value,
    /// Human-readable failure, for stderr.
    pub message: Option<String>,
}

impl Outcome {
    fn from_result<T: Serialize>(result: &AuthResult<T>) -> Result<Self> {
        Ok(Self {
            ok: result.is_success(),
            output: serde_json::to_value(result)?,
            message: result.failure_ref().map(AuthFailure::display_message),
        })
    }

    fn invalid(errors: FieldErrors) -> Result<Self> {
        let fields = errors
            .into_iter()
            .map(|(field, message)| (field.to_string(), FieldMessages::One(message)))
            .collect();
        let result: AuthResult<()> = AuthResult::failure(
            AuthFailure::new(INVALID_FORM).with_details(Some(ErrorDetails::Fields(fields))),
        );
        Self::from_result(&result)
    }
}

/// One client instance: session store, CSRF state and the shared pipeline.
pub struct App {
    store: Arc<SessionStore>,
    csrf: Arc<CsrfStore>,
    bootstrapper: CsrfBootstrapper,
    client: AuthClient,
}

impl App {
    pub fn new(paths: &Paths, config: &Config) -> Result<Self> {
        let transport = ReqwestTransport::new(config.api_base_url()?, config.request_timeout())?;
        info!(api_url = %transport.base_url(), "Using backend");
        Ok(Self::with_transport(paths, config, Arc::new(transport)))
    }

    pub fn with_transport(paths: &Paths, config: &Config, transport: Arc<dyn Transport>) -> Self {
        let store = Arc::new(SessionStore::new(
            create_durable_storage(paths.session_file()),
            create_ephemeral_storage(),
        ));
        let csrf = Arc::new(CsrfStore::new());
        let pipeline = Arc::new(standard_pipeline(transport, csrf.clone(), store.clone()));

        let retry = RetryConfig {
            max_attempts: config.csrf_max_attempts.max(1),
            initial_delay_ms: config.csrf_initial_backoff_ms,
            ..RetryConfig::default()
        };
        let bootstrapper =
            CsrfBootstrapper::new(pipeline.clone(), csrf.clone()).with_retry_config(retry);

        Self {
            store,
            csrf,
            bootstrapper,
            client: AuthClient::new(pipeline),
        }
    }

    #[cfg(test)]
    fn with_sleeper(mut self, sleeper: Arc<dyn kindearth_http::Sleeper>) -> Self {
        self.bootstrapper = self.bootstrapper.with_sleeper(sleeper);
        self
    }

    /// Restore any stored session, fetching the CSRF token first when the
    /// command will talk to the backend.
    ///
    /// A failed bootstrap is logged and the command still runs; requests then
    /// go out without the CSRF header.
    pub async fn start(&self, fetch_csrf: bool) -> Result<()> {
        if fetch_csrf {
            match self.bootstrapper.bootstrap().await {
                Ok(token) => info!(has_token = token.is_some(), "CSRF bootstrap complete"),
                Err(e) => warn!(error = %e, "Continuing without CSRF token"),
            }
        }

        if let Some(user) = self.store.load_on_startup()? {
            info!(user_id = %user.id, remembered = self.store.is_remembered(), "Session restored");
        }
        Ok(())
    }

    pub async fn login(&self, email: &str, password: &str, remember: bool) -> Result<Outcome> {
        let errors = validate_login_form(email, password);
        if !errors.is_empty() {
            return Outcome::invalid(errors);
        }

        let result = self.client.login(&LoginRequest::new(email, password)).await;
        if let Some(user) = result.data() {
            self.store.set_user(Some(user.clone()), remember)?;
            info!(user_id = %user.id, remember, "Signed in");
        }
        Outcome::from_result(&result)
    }

    pub async fn register(&self, args: RegisterArgs) -> Result<Outcome> {
        let role = if args.vendor {
            AccountRole::Vendor
        } else {
            AccountRole::Customer
        };
        let form = RegistrationForm {
            confirm_password: args
                .confirm_password
                .unwrap_or_else(|| args.password.clone()),
            first_name: args.first_name,
            last_name: args.last_name,
            email: args.email,
            phone: args.phone,
            password: args.password,
            role: Some(role),
            store_name: args.store_name,
        };

        let errors = validate_registration_form(&form);
        if !errors.is_empty() {
            return Outcome::invalid(errors);
        }

        let request = RegisterRequest {
            email: form.email,
            password: form.password,
            first_name: form.first_name,
            last_name: form.last_name,
            phone: form.phone,
            role: form.role,
            store_name: form.store_name.filter(|_| role == AccountRole::Vendor),
        };
        let result = self.client.register(&request).await;
        Outcome::from_result(&result)
    }

    pub async fn logout(&self) -> Result<Outcome> {
        let result = self.client.sign_out(&self.store).await;
        Outcome::from_result(&result)
    }

    pub fn whoami(&self) -> Result<Outcome> {
        let user = self.store.user();
        Ok(Outcome {
            ok: user.is_some(),
            output: json!({
                "authenticated": user.is_some(),
                "remembered": self.store.is_remembered(),
                "user": user,
            }),
            message: None,
        })
    }

    pub fn csrf(&self) -> Result<Outcome> {
        let state = self.csrf.snapshot();
        Ok(Outcome {
            ok: state.token.is_some(),
            output: json!({
                "status": self.csrf.status(),
                "state": state,
            }),
            message: self.csrf.last_error(),
        })
    }
}

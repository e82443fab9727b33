//! Session store and auth operations for the KindEarth storefront client.
//!
//! This crate provides:
//! - [`SessionStore`]: the signed-in user, persisted durably or per-process
//! - [`AuthClient`]: login, register, logout, token refresh and CSRF fetch,
//!   each returning a normalized [`AuthResult`]
//! - [`validation`]: the form checks run before login and register

mod error;
mod operations;
mod result;
mod session;
pub mod validation;

#[cfg(test)]
mod tests;

pub use error::{SessionError, SessionResult};
pub use operations::{
    failure_from_error, failure_from_response, AccountRole, AuthClient, LoginRequest, Operation,
    RegisterRequest, RegisterResponse,
};
pub use result::{
    AuthFailure, AuthResult, ErrorDetails, FieldMessages, NETWORK_ERROR, UNEXPECTED_ERROR,
};
pub use session::{ChangeReason, Session, SessionCallback, SessionChange, SessionStore};

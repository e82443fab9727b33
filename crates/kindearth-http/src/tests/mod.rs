//! Scenario tests for the request pipeline.
//!
//! - `harness.rs`        - scripted backend, session-lost recorder, wiring
//! - `csrf_bootstrap.rs` - token fetch, retries and backoff, manual retry
//! - `csrf_header.rs`    - header attachment and token rotation
//! - `refresh_retry.rs`  - 401 handling, single replay, session loss

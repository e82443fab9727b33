//! Auth operations against a scripted backend.

mod auth_flows;

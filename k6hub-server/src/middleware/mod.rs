//! Request middleware

mod auth;

pub use auth::{agent_credential, require_operator};

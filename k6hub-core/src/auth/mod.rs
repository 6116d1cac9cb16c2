//! Bearer-token authentication for the admin API

mod config;
mod context;
mod error;
mod validator;

pub use config::AdminAuthConfig;
pub use context::{Operator, Role};
pub use error::AuthError;
pub use validator::{TokenValidator, bearer_token};

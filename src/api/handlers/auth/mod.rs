//! Credential login.

pub mod login;
mod state;
mod types;

pub use state::{AuthConfig, AuthState};
pub use types::{LoginRequest, LoginResponse};

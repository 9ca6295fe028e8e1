//! Secret verification and session token issuance.

pub mod password;
pub mod token;

pub use token::{SessionClaims, TokenError, TokenIssuer};

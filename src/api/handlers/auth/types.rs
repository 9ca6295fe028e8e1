use crate::account::{PublicAccount, Role};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Login body. Not `Debug`: it holds the plaintext password.
#[derive(ToSchema, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct LoginResponse {
    pub details: PublicAccount,
    pub role: Role,
}

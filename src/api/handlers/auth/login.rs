//! `POST /api/auth/login`.
//!
//! Flow: take username and password from the parsed body, look the account
//! up, verify the password against the stored hash, issue a signed session
//! token and hand it back as the `access_token` cookie together with the
//! public view of the account.
//!
//! Unknown usernames and wrong passwords are reported with distinct status
//! codes (404 and 400).

use super::{
    state::{AuthState, SESSION_COOKIE_NAME},
    types::{LoginRequest, LoginResponse},
};
use crate::{
    account::PublicAccount,
    api::{
        error::{ApiError, ErrorEnvelope},
        middleware::JsonBody,
    },
    credentials::password,
};
use axum::{extract::Extension, http::StatusCode, response::Json};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use secrecy::SecretString;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info, instrument, Span};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoginStage {
    Received,
    Lookup,
    NotFound,
    VerifySecret,
    Rejected,
    Accepted,
    RespondOk,
}

impl LoginStage {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::Lookup => "lookup",
            Self::NotFound => "not_found",
            Self::VerifySecret => "verify_secret",
            Self::Rejected => "rejected",
            Self::Accepted => "accepted",
            Self::RespondOk => "respond_ok",
        }
    }

    fn enter(self) {
        Span::current().record("login.stage", self.as_str());
        debug!(stage = self.as_str(), "login stage");
    }
}

struct Credential {
    username: String,
    password: SecretString,
}

fn credential(body: Option<&JsonBody>) -> Result<Credential, ApiError> {
    let value = body
        .map(|JsonBody(value)| value)
        .ok_or_else(|| ApiError::client_input("username and password are required"))?;

    // serde errors quote the offending value, so they never reach the detail.
    let request = LoginRequest::deserialize(value).map_err(|_| {
        ApiError::client_input("username and password are required")
            .with_detail("username and password must be strings")
    })?;

    if request.username.is_empty() {
        return Err(ApiError::client_input("username must not be empty"));
    }

    Ok(Credential {
        username: request.username,
        password: SecretString::from(request.password),
    })
}

#[utoipa::path(
    post,
    path = "/api/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 201, description = "Logged in; session cookie set.", body = LoginResponse),
        (status = 400, description = "Malformed input or wrong password.", body = ErrorEnvelope),
        (status = 404, description = "Unknown username.", body = ErrorEnvelope),
        (status = 413, description = "Body too large.", body = ErrorEnvelope),
        (status = 429, description = "Too many requests from this address.", body = ErrorEnvelope),
        (status = 503, description = "Datastore unavailable.", body = ErrorEnvelope)
    ),
    tag = "auth"
)]
#[instrument(skip_all, fields(login.stage = tracing::field::Empty))]
pub async fn login(
    Extension(auth): Extension<Arc<AuthState>>,
    Extension(jar): Extension<CookieJar>,
    body: Option<Extension<JsonBody>>,
) -> Result<(StatusCode, CookieJar, Json<LoginResponse>), ApiError> {
    LoginStage::Received.enter();
    let credential = credential(body.as_ref().map(|Extension(body)| body))?;

    LoginStage::Lookup.enter();
    let Some(account) = auth.store().find_by_username(&credential.username).await? else {
        LoginStage::NotFound.enter();
        return Err(ApiError::account_not_found());
    };

    LoginStage::VerifySecret.enter();
    let matched = password::verify_blocking(credential.password, account.password_hash.clone())
        .await
        .map_err(ApiError::unexpected)?;
    if !matched {
        LoginStage::Rejected.enter();
        return Err(ApiError::invalid_credential());
    }

    LoginStage::Accepted.enter();
    let token = auth.issuer().issue(account.id, account.role)?;

    let cookie = Cookie::build((SESSION_COOKIE_NAME, token))
        .http_only(true)
        .path("/")
        .same_site(SameSite::Lax)
        .secure(auth.config().cookie_secure())
        .build();

    LoginStage::RespondOk.enter();
    info!(role = %account.role, "login succeeded");

    Ok((
        StatusCode::CREATED,
        jar.add(cookie),
        Json(LoginResponse {
            details: PublicAccount::from(&account),
            role: account.role,
        }),
    ))
}

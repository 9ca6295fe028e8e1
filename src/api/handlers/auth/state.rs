//! Auth state shared by the login handler.

use crate::{account::AccountStore, credentials::TokenIssuer};
use std::{fmt, sync::Arc};

pub const SESSION_COOKIE_NAME: &str = "access_token";

#[derive(Clone, Debug, Default)]
pub struct AuthConfig {
    cookie_secure: bool,
}

impl AuthConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn with_cookie_secure(mut self, secure: bool) -> Self {
        self.cookie_secure = secure;
        self
    }

    #[must_use]
    pub const fn cookie_secure(&self) -> bool {
        self.cookie_secure
    }
}

pub struct AuthState {
    config: AuthConfig,
    store: Arc<dyn AccountStore>,
    issuer: TokenIssuer,
}

impl fmt::Debug for AuthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthState")
            .field("config", &self.config)
            .field("issuer", &self.issuer)
            .finish_non_exhaustive()
    }
}

impl AuthState {
    #[must_use]
    pub fn new(config: AuthConfig, store: Arc<dyn AccountStore>, issuer: TokenIssuer) -> Self {
        Self {
            config,
            store,
            issuer,
        }
    }

    #[must_use]
    pub const fn config(&self) -> &AuthConfig {
        &self.config
    }

    #[must_use]
    pub fn store(&self) -> &dyn AccountStore {
        self.store.as_ref()
    }

    #[must_use]
    pub const fn issuer(&self) -> &TokenIssuer {
        &self.issuer
    }
}

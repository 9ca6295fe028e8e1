//! # Warden (credential login service)
//!
//! `warden` accepts a username and password over HTTP, verifies them against
//! stored account records and issues a signed session token as an `HttpOnly`
//! cookie.
//!
//! ## Request pipeline
//!
//! Every request passes through an ordered chain of interceptors before it
//! reaches a route: request logging, cross-origin policy, security headers,
//! cookie parsing, per-address rate limiting and bounded JSON body parsing.
//! Stages return `Result<Response, ApiError>`; failures travel back up the
//! chain as values and are turned into a uniform JSON envelope by the error
//! normalizer.
//!
//! ## Login
//!
//! `POST /api/auth/login` looks the account up by username, compares the
//! password against the stored bcrypt or Argon2 hash, signs an HS256 token
//! carrying the account id and role, and answers `201` with the public
//! projection of the account. The stored hash, internal id and bookkeeping
//! fields never leave the service.
//!
//! ## Lifecycle
//!
//! The datastore connection and the signing key are established before the
//! socket is bound; both are fatal when missing. `SIGTERM`/`Ctrl-C` stops new
//! connections, drains in-flight requests within a grace period and closes the
//! datastore last.

pub mod account;
pub mod api;
pub mod cli;
pub mod credentials;
pub mod lifecycle;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

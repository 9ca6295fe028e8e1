//! One-way password verification.
//!
//! Stored hashes are either bcrypt (`$2a$`, `$2b$`, `$2y$`) or Argon2 PHC
//! strings (`$argon2...`); the scheme is picked from the prefix. Both
//! libraries compare digests in constant time.

use secrecy::{ExposeSecret, SecretString};
use tracing::debug;

/// Verify `password` against `stored_hash`.
///
/// Malformed hashes and unknown schemes never match; this function does not
/// fail.
#[must_use]
pub fn verify(password: &str, stored_hash: &str) -> bool {
    if stored_hash.starts_with("$argon2") {
        verify_argon2(password, stored_hash)
    } else if stored_hash.starts_with("$2") {
        verify_bcrypt(password, stored_hash)
    } else {
        debug!("unknown password hash scheme");
        false
    }
}

/// Run [`verify`] on the blocking pool so the hash computation does not stall
/// the async workers.
///
/// # Errors
/// Returns an error only if the blocking task panicked or was cancelled.
pub async fn verify_blocking(
    password: SecretString,
    stored_hash: SecretString,
) -> Result<bool, tokio::task::JoinError> {
    tokio::task::spawn_blocking(move || verify(password.expose_secret(), stored_hash.expose_secret()))
        .await
}

/// Hash a password with bcrypt at the given cost.
///
/// # Errors
/// Returns an error when the cost is outside bcrypt's accepted range.
pub fn hash_password(password: &str, cost: u32) -> Result<String, bcrypt::BcryptError> {
    bcrypt::hash(password, cost)
}

fn verify_bcrypt(password: &str, stored_hash: &str) -> bool {
    match bcrypt::verify(password, stored_hash) {
        Ok(matched) => matched,
        Err(err) => {
            debug!("bcrypt hash rejected: {err}");
            false
        }
    }
}

fn verify_argon2(password: &str, stored_hash: &str) -> bool {
    use argon2::{
        password_hash::{PasswordHash, PasswordVerifier},
        Argon2,
    };

    match PasswordHash::new(stored_hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(err) => {
            debug!("argon2 hash rejected: {err}");
            false
        }
    }
}

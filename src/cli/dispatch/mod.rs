//! Maps parsed arguments to the action the binary runs.

use crate::cli::actions::{server::Args, Action};
use crate::cli::commands::{auth, http, ARG_DSN, ARG_PORT};
use anyhow::{Context, Result};
use secrecy::SecretString;

/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>(ARG_PORT).copied().unwrap_or(8080);
    let dsn = matches
        .get_one::<String>(ARG_DSN)
        .filter(|dsn| !dsn.trim().is_empty())
        .cloned()
        .map(SecretString::from)
        .context("missing required argument: --dsn")?;

    let auth_opts = auth::Options::parse(matches)?;
    let http_opts = http::Options::parse(matches)?;

    Ok(Action::Server(Args {
        port,
        dsn,
        jwt_key: auth_opts.jwt_key,
        cookie_secure: auth_opts.cookie_secure,
        http: http_opts,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn server_action_from_env() {
        temp_env::with_vars(
            [
                ("WARDEN_PORT", Some("8443")),
                ("WARDEN_DSN", Some("postgres://warden@localhost:5432/warden")),
                ("WARDEN_JWT_KEY", Some("key")),
                ("WARDEN_COOKIE_SECURE", Some("true")),
                ("WARDEN_RATE_LIMIT_MAX", Some("7")),
            ],
            || {
                let matches = crate::cli::commands::new().get_matches_from(vec!["warden"]);
                let result = handler(&matches);
                assert!(result.is_ok());
                if let Ok(Action::Server(args)) = result {
                    assert_eq!(args.port, 8443);
                    assert_eq!(
                        args.dsn.expose_secret(),
                        "postgres://warden@localhost:5432/warden"
                    );
                    assert!(args.cookie_secure);
                    assert_eq!(args.http.rate_limit_max, 7);
                }
            },
        );
    }

    #[test]
    fn blank_dsn_is_rejected() {
        temp_env::with_vars(
            [("WARDEN_DSN", Some(" ")), ("WARDEN_JWT_KEY", Some("key"))],
            || {
                let matches = crate::cli::commands::new().get_matches_from(vec!["warden"]);
                let result = handler(&matches);
                assert!(result.is_err());
                if let Err(err) = result {
                    assert!(err.to_string().contains("missing required argument: --dsn"));
                }
            },
        );
    }
}

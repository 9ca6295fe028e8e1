use crate::{
    account::{AccountStore, ConnectOptions, PgAccountStore},
    api::{
        self,
        handlers::auth::{AuthConfig, AuthState},
        middleware::{FixedWindowLimiter, Origins, RateLimiter},
        ApiConfig,
    },
    cli::commands::http,
    credentials::TokenIssuer,
    lifecycle::{self, Lifecycle},
};
use anyhow::{Context, Result};
use secrecy::{ExposeSecret, SecretString};
use std::{
    net::{Ipv6Addr, SocketAddr},
    sync::Arc,
    time::Duration,
};
use tokio::net::TcpListener;
use tracing::info;
use url::Url;

const MAX_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: SecretString,
    pub jwt_key: SecretString,
    pub cookie_secure: bool,
    pub http: http::Options,
}

/// Execute the server action.
/// # Errors
/// Returns an error if the signing key is unusable, the datastore cannot be
/// reached, the port cannot be bound or the server stops unexpectedly.
pub async fn execute(args: Args) -> Result<()> {
    log_startup_args(&args);

    let issuer = TokenIssuer::new(&args.jwt_key).context("invalid JWT signing key")?;

    let store: Arc<dyn AccountStore> = Arc::new(
        PgAccountStore::connect(&args.dsn, &ConnectOptions::default())
            .await
            .context("failed to connect to the datastore")?,
    );

    let window = args.http.rate_limit_window;
    let limiter: Arc<dyn RateLimiter> =
        Arc::new(FixedWindowLimiter::new(args.http.rate_limit_max, window));

    let auth = Arc::new(AuthState::new(
        AuthConfig::new().with_cookie_secure(args.cookie_secure),
        store.clone(),
        issuer,
    ));

    let config = ApiConfig::new()
        .with_origins(Origins::from_list(args.http.cors_origins.clone()))
        .with_body_limit(args.http.body_limit_bytes)
        .with_trust_proxy(args.http.trust_proxy)
        .with_expose_error_detail(args.http.expose_error_detail);

    let pipeline = api::pipeline(&config, auth, store.clone(), limiter.clone());

    let address = SocketAddr::from((Ipv6Addr::UNSPECIFIED, args.port));
    let listener = TcpListener::bind(address)
        .await
        .with_context(|| format!("failed to bind {address}"))?;

    Lifecycle::new(store)
        .with_limiter(limiter, window.min(MAX_SWEEP_INTERVAL))
        .with_grace(args.http.shutdown_grace)
        .with_monitor_interval(args.http.db_monitor_interval)
        .run(
            listener,
            api::app(Arc::new(pipeline)),
            lifecycle::shutdown_signal(),
        )
        .await
}

fn log_startup_args(args: &Args) {
    let origins = if args.http.cors_origins.is_empty() {
        "*".to_string()
    } else {
        args.http.cors_origins.join(",")
    };
    let entries = [
        ("listen", format!("tcp:{}", args.port)),
        ("dsn", redact_dsn(args.dsn.expose_secret())),
        ("cors_origins", origins),
        (
            "rate_limit",
            format!(
                "{}/{}s",
                args.http.rate_limit_max,
                args.http.rate_limit_window.as_secs()
            ),
        ),
        ("body_limit_bytes", args.http.body_limit_bytes.to_string()),
        ("trust_proxy", args.http.trust_proxy.to_string()),
        ("cookie_secure", args.cookie_secure.to_string()),
        (
            "expose_error_detail",
            args.http.expose_error_detail.to_string(),
        ),
        (
            "shutdown_grace",
            format!("{}s", args.http.shutdown_grace.as_secs()),
        ),
    ];
    log_entries("Startup configuration", &entries);
}

fn redact_dsn(dsn: &str) -> String {
    match Url::parse(dsn) {
        Ok(mut parsed) => {
            if parsed.password().is_some() {
                let _ = parsed.set_password(Some("REDACTED"));
            }
            parsed.to_string()
        }
        Err(_) => "invalid-dsn".to_string(),
    }
}

fn log_entries(title: &str, entries: &[(&str, String)]) {
    let max_key_len = entries.iter().map(|(key, _)| key.len()).max().unwrap_or(0);
    let mut message = format!(
        "warden {} - {}\n\n{title}:",
        env!("CARGO_PKG_VERSION"),
        short_commit(crate::GIT_COMMIT_HASH)
    );
    for (key, value) in entries {
        let padding = " ".repeat(max_key_len.saturating_sub(key.len()));
        let _ =
            std::fmt::Write::write_fmt(&mut message, format_args!("\n  {key}:{padding} {value}"));
    }
    info!("{message}");
}

fn short_commit(hash: &str) -> String {
    let trimmed = hash.trim();
    trimmed.chars().take(7).collect()
}

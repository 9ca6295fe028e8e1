use clap::{builder::BoolishValueParser, Arg, ArgAction, ArgMatches, Command};
use std::time::Duration;

pub const ARG_CORS_ORIGIN: &str = "cors-origin";
pub const ARG_RATE_LIMIT_MAX: &str = "rate-limit-max";
pub const ARG_RATE_LIMIT_WINDOW_SECONDS: &str = "rate-limit-window-seconds";
pub const ARG_BODY_LIMIT_BYTES: &str = "body-limit-bytes";
pub const ARG_TRUST_PROXY: &str = "trust-proxy";
pub const ARG_EXPOSE_ERROR_DETAIL: &str = "expose-error-detail";
pub const ARG_SHUTDOWN_GRACE_SECONDS: &str = "shutdown-grace-seconds";
pub const ARG_DB_MONITOR_SECONDS: &str = "db-monitor-seconds";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Options {
    pub cors_origins: Vec<String>,
    pub rate_limit_max: u32,
    pub rate_limit_window: Duration,
    pub body_limit_bytes: usize,
    pub trust_proxy: bool,
    pub expose_error_detail: bool,
    pub shutdown_grace: Duration,
    pub db_monitor_interval: Duration,
}

impl Options {
    /// # Errors
    /// Returns an error when a window or interval is zero.
    pub fn parse(matches: &ArgMatches) -> anyhow::Result<Self> {
        let seconds = |id: &str, default: u64| -> anyhow::Result<Duration> {
            let value = matches.get_one::<u64>(id).copied().unwrap_or(default);
            if value == 0 {
                anyhow::bail!("--{id} must be greater than zero");
            }
            Ok(Duration::from_secs(value))
        };

        let cors_origins = matches
            .get_many::<String>(ARG_CORS_ORIGIN)
            .map(|values| {
                values
                    .map(|origin| origin.trim().to_string())
                    .filter(|origin| !origin.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            cors_origins,
            rate_limit_max: matches
                .get_one::<u32>(ARG_RATE_LIMIT_MAX)
                .copied()
                .unwrap_or(100),
            rate_limit_window: seconds(ARG_RATE_LIMIT_WINDOW_SECONDS, 900)?,
            body_limit_bytes: matches
                .get_one::<usize>(ARG_BODY_LIMIT_BYTES)
                .copied()
                .unwrap_or(100 * 1024),
            trust_proxy: matches.get_flag(ARG_TRUST_PROXY),
            expose_error_detail: matches
                .get_one::<bool>(ARG_EXPOSE_ERROR_DETAIL)
                .copied()
                .unwrap_or(true),
            shutdown_grace: Duration::from_secs(
                matches
                    .get_one::<u64>(ARG_SHUTDOWN_GRACE_SECONDS)
                    .copied()
                    .unwrap_or(30),
            ),
            db_monitor_interval: seconds(ARG_DB_MONITOR_SECONDS, 10)?,
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_CORS_ORIGIN)
                .long(ARG_CORS_ORIGIN)
                .help("Allowed CORS origin, repeatable or comma separated (default: any)")
                .env("WARDEN_CORS_ORIGINS")
                .action(ArgAction::Append)
                .value_delimiter(','),
        )
        .arg(
            Arg::new(ARG_RATE_LIMIT_MAX)
                .long(ARG_RATE_LIMIT_MAX)
                .help("Requests allowed per client address per window")
                .env("WARDEN_RATE_LIMIT_MAX")
                .default_value("100")
                .value_parser(clap::value_parser!(u32)),
        )
        .arg(
            Arg::new(ARG_RATE_LIMIT_WINDOW_SECONDS)
                .long(ARG_RATE_LIMIT_WINDOW_SECONDS)
                .help("Rate limit window in seconds")
                .env("WARDEN_RATE_LIMIT_WINDOW_SECONDS")
                .default_value("900")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new(ARG_BODY_LIMIT_BYTES)
                .long(ARG_BODY_LIMIT_BYTES)
                .help("Maximum JSON body size in bytes")
                .env("WARDEN_BODY_LIMIT_BYTES")
                .default_value("102400")
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            Arg::new(ARG_TRUST_PROXY)
                .long(ARG_TRUST_PROXY)
                .help("Take the client address from X-Forwarded-For / X-Real-IP")
                .env("WARDEN_TRUST_PROXY")
                .action(ArgAction::SetTrue)
                .value_parser(BoolishValueParser::new()),
        )
        .arg(
            Arg::new(ARG_EXPOSE_ERROR_DETAIL)
                .long(ARG_EXPOSE_ERROR_DETAIL)
                .help("Include failure detail in error responses")
                .env("WARDEN_EXPOSE_ERROR_DETAIL")
                .num_args(0..=1)
                .default_value("true")
                .default_missing_value("true")
                .value_parser(BoolishValueParser::new()),
        )
        .arg(
            Arg::new(ARG_SHUTDOWN_GRACE_SECONDS)
                .long(ARG_SHUTDOWN_GRACE_SECONDS)
                .help("Seconds in-flight requests get to finish after a shutdown signal")
                .env("WARDEN_SHUTDOWN_GRACE_SECONDS")
                .default_value("30")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new(ARG_DB_MONITOR_SECONDS)
                .long(ARG_DB_MONITOR_SECONDS)
                .help("Seconds between datastore health pings")
                .env("WARDEN_DB_MONITOR_SECONDS")
                .default_value("10")
                .value_parser(clap::value_parser!(u64)),
        )
}

use clap::{builder::ValueParser, Arg, ArgMatches, Command};
use std::path::PathBuf;

pub const ARG_VERBOSITY: &str = "verbosity";
pub const ARG_LOG_DIR: &str = "log-dir";
pub const ARG_LOG_MAX_FILES: &str = "log-max-files";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Options {
    pub verbosity: u8,
    pub dir: PathBuf,
    pub max_files: usize,
}

impl Options {
    #[must_use]
    pub fn parse(matches: &ArgMatches) -> Self {
        Self {
            verbosity: matches.get_one::<u8>(ARG_VERBOSITY).copied().unwrap_or(0),
            dir: matches
                .get_one::<PathBuf>(ARG_LOG_DIR)
                .cloned()
                .unwrap_or_else(|| PathBuf::from("logs")),
            max_files: matches
                .get_one::<usize>(ARG_LOG_MAX_FILES)
                .copied()
                .unwrap_or(14),
        }
    }

    /// Console level; `None` keeps the default (ERROR).
    #[must_use]
    pub const fn level(&self) -> Option<tracing::Level> {
        match self.verbosity {
            0 => None,
            1 => Some(tracing::Level::WARN),
            2 => Some(tracing::Level::INFO),
            3 => Some(tracing::Level::DEBUG),
            _ => Some(tracing::Level::TRACE),
        }
    }
}

#[must_use]
pub fn validator_log_level() -> ValueParser {
    ValueParser::from(move |level: &str| -> std::result::Result<u8, String> {
        if let Ok(parsed) = level.parse::<u8>() {
            if parsed <= 5 {
                return Ok(parsed);
            }
        }

        match level.to_lowercase().as_str() {
            "error" => Ok(0),
            "warn" => Ok(1),
            "info" => Ok(2),
            "debug" => Ok(3),
            "trace" => Ok(4),
            _ => Err("invalid log level".to_string()),
        }
    })
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_VERBOSITY)
                .short('v')
                .long("verbose")
                .help("Verbosity level: ERROR, WARN, INFO, DEBUG, TRACE (default: ERROR)")
                .env("WARDEN_LOG_LEVEL")
                .global(true)
                .action(clap::ArgAction::Count)
                .value_parser(validator_log_level()),
        )
        .arg(
            Arg::new(ARG_LOG_DIR)
                .long(ARG_LOG_DIR)
                .help("Directory for the JSON request/error log")
                .env("WARDEN_LOG_DIR")
                .default_value("logs")
                .value_parser(clap::value_parser!(PathBuf)),
        )
        .arg(
            Arg::new(ARG_LOG_MAX_FILES)
                .long(ARG_LOG_MAX_FILES)
                .help("Number of daily log files to keep")
                .env("WARDEN_LOG_MAX_FILES")
                .default_value("14")
                .value_parser(clap::value_parser!(usize)),
        )
}

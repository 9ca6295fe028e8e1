use crate::cli::{actions::Action, commands, dispatch, telemetry};
use anyhow::Result;

/// Main entry point for the CLI, returns the action and the telemetry guard
/// the binary must hold until exit.
///
/// # Errors
///
/// Returns an error if argument parsing, telemetry initialization, or action dispatch fails
pub fn start() -> Result<(Action, telemetry::TelemetryGuard)> {
    let matches = commands::new().get_matches();

    let logging = commands::logging::Options::parse(&matches);
    let guard = telemetry::init(&logging)?;

    let action = dispatch::handler(&matches)?;

    Ok((action, guard))
}

use crate::{api::middleware::ACCESS_TARGET, cli::commands::logging};
use anyhow::{Context, Result};
use opentelemetry::{trace::TracerProvider as _, KeyValue};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{trace::SdkTracerProvider, Resource};
use std::{env::var, time::Duration};
use tracing::{debug, Level};
use tracing_appender::{
    non_blocking::{NonBlocking, WorkerGuard},
    rolling::{RollingFileAppender, Rotation},
};
use tracing_subscriber::{
    filter::LevelFilter, fmt, layer::SubscriberExt, EnvFilter, Layer, Registry,
};
use ulid::Ulid;

const LOG_FILE_PREFIX: &str = "warden";
const LOG_FILE_SUFFIX: &str = "log";

/// Keeps the file writer and the span exporter alive. Call
/// [`TelemetryGuard::shutdown`] before the process exits to flush both.
pub struct TelemetryGuard {
    file: WorkerGuard,
    provider: Option<SdkTracerProvider>,
}

impl TelemetryGuard {
    pub fn shutdown(self) {
        if let Some(provider) = self.provider {
            debug!("shutting down tracer provider");
            if let Err(err) = provider.shutdown() {
                eprintln!("tracer provider shutdown failed: {err}");
            }
        }
        drop(self.file);
    }
}

fn normalize_endpoint(ep: String) -> String {
    if ep.starts_with("http://") || ep.starts_with("https://") {
        ep
    } else {
        format!("https://{}", ep.trim_end_matches('/'))
    }
}

fn init_provider(endpoint: String) -> Result<SdkTracerProvider> {
    let endpoint = normalize_endpoint(endpoint);

    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .with_timeout(Duration::from_secs(3))
        .build()
        .context("failed to build OTLP span exporter")?;

    let instance_id = var("OTEL_SERVICE_INSTANCE_ID").unwrap_or_else(|_| Ulid::new().to_string());

    Ok(SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .with_resource(
            Resource::builder_empty()
                .with_attributes(vec![
                    KeyValue::new("service.name", env!("CARGO_PKG_NAME")),
                    KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
                    KeyValue::new("service.instance.id", instance_id),
                ])
                .build(),
        )
        .build())
}

/// Daily rolling JSON log writer under `opts.dir`, keeping at most
/// `opts.max_files` files.
fn file_writer(opts: &logging::Options) -> Result<(NonBlocking, WorkerGuard)> {
    let appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(LOG_FILE_PREFIX)
        .filename_suffix(LOG_FILE_SUFFIX)
        .max_log_files(opts.max_files.max(1))
        .build(&opts.dir)
        .with_context(|| format!("failed to open log directory {}", opts.dir.display()))?;

    Ok(tracing_appender::non_blocking(appender))
}

fn file_filter() -> Result<EnvFilter> {
    Ok(EnvFilter::try_new(format!("warn,{ACCESS_TARGET}=info"))?)
}

/// Initialize console logging, the JSON log file and (optional) tracing exporter.
/// Tracing is enabled if `OTEL_EXPORTER_OTLP_ENDPOINT` is set (gRPC only).
///
/// # Errors
///
/// Returns an error if the log directory, tracer or subscriber cannot be initialized
pub fn init(opts: &logging::Options) -> Result<TelemetryGuard> {
    let verbosity_level = opts.level().unwrap_or(Level::ERROR);

    let console_filter = EnvFilter::builder()
        .with_default_directive(verbosity_level.into())
        .from_env_lossy()
        .add_directive("hyper=error".parse()?)
        .add_directive("tokio=error".parse()?)
        .add_directive("opentelemetry_sdk=warn".parse()?);

    let console = fmt::layer()
        .with_file(false)
        .with_line_number(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_target(false)
        .pretty()
        .with_filter(console_filter);

    let (writer, file_guard) = file_writer(opts)?;
    let file = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(false)
        .with_writer(writer)
        .with_filter(file_filter()?);

    let provider = match var("OTEL_EXPORTER_OTLP_ENDPOINT") {
        Ok(endpoint) => Some(init_provider(endpoint)?),
        Err(_) => None,
    };
    let otel = provider.as_ref().map(|provider| {
        tracing_opentelemetry::layer()
            .with_tracer(provider.tracer(env!("CARGO_PKG_NAME")))
            .with_filter(LevelFilter::INFO)
    });

    let subscriber = Registry::default().with(console).with(file).with(otel);
    tracing::subscriber::set_global_default(subscriber)
        .context("failed to install tracing subscriber")?;

    Ok(TelemetryGuard {
        file: file_guard,
        provider,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn endpoint_without_scheme_defaults_to_https() {
        assert_eq!(
            normalize_endpoint("collector:4317/".to_string()),
            "https://collector:4317"
        );
        assert_eq!(
            normalize_endpoint("http://localhost:4317".to_string()),
            "http://localhost:4317"
        );
    }

    #[test]
    fn file_writer_emits_json_lines() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let opts = logging::Options {
            verbosity: 0,
            dir: dir.path().to_path_buf(),
            max_files: 3,
        };

        let (writer, guard) = file_writer(&opts)?;
        let subscriber = Registry::default().with(
            fmt::layer()
                .json()
                .with_writer(writer)
                .with_filter(file_filter()?),
        );
        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(target: "warden::access", status = 201, "request completed");
            tracing::info!("dropped by the file filter");
            tracing::error!("store unreachable");
        });
        drop(guard);

        let files: Vec<PathBuf> = std::fs::read_dir(dir.path())?
            .filter_map(|entry| entry.ok().map(|entry| entry.path()))
            .collect();
        assert_eq!(files.len(), 1);
        let name = files[0]
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or_default()
            .to_string();
        assert!(name.starts_with("warden."));
        assert!(name.ends_with(".log"));

        let contents = std::fs::read_to_string(&files[0])?;
        let lines: Vec<serde_json::Value> = contents
            .lines()
            .map(serde_json::from_str)
            .collect::<Result<_, _>>()?;
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["fields"]["status"], 201);
        assert_eq!(lines[1]["level"], "ERROR");
        Ok(())
    }

    #[test]
    fn file_writer_rejects_unusable_directory() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"x")?;

        let opts = logging::Options {
            verbosity: 0,
            dir: blocker,
            max_files: 3,
        };
        assert!(file_writer(&opts).is_err());
        Ok(())
    }
}

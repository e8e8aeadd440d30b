use std::io::{self, IsTerminal};
use std::sync::OnceLock;
use std::time::Duration;

use bon::Builder;
use indicatif::ProgressStyle;
use opentelemetry::global;
use opentelemetry::trace::TracerProvider as _;
use tracing::Metadata;
use tracing::level_filters::LevelFilter;
use tracing_indicatif::{IndicatifLayer, TickSettings};
use tracing_opentelemetry::OpenTelemetryLayer;
use tracing_subscriber::filter::{self, EnvFilter};
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::Layer;

use crate::error::TelemetryError;

const CRATE_TARGET: &str = "gatt_dispatch";
const DEFAULT_DIRECTIVES: &str = "warn";
const SPINNER_TICK: Duration = Duration::from_millis(90);
/// Span field set by `#[progress]`.
const PROGRESS_FIELD: &str = "progress";

static SUBSCRIBER: OnceLock<Result<(), TelemetryError>> = OnceLock::new();

/// How the process-wide subscriber is installed.
#[derive(Debug, Clone, Builder)]
pub(crate) struct TelemetryConfig<'a> {
    service_name: &'a str,
    /// Whether stderr is rendered for a person rather than a log collector.
    #[builder(default)]
    interactive: bool,
    /// Overrides `RUST_LOG` for this crate; other crates stay at `warn`.
    log_level: Option<LevelFilter>,
}

/// Installs JSON logs, or pretty logs with progress spinners on a terminal, plus an
/// OpenTelemetry layer.
///
/// Only the first call in a process installs anything; later calls return its outcome.
pub(crate) fn initialise_tracing(
    config: &TelemetryConfig<'_>,
) -> Result<(), &'static TelemetryError> {
    SUBSCRIBER
        .get_or_init(|| install(config))
        .as_ref()
        .copied()
}

fn install(config: &TelemetryConfig<'_>) -> Result<(), TelemetryError> {
    let provider = opentelemetry_sdk::trace::SdkTracerProvider::builder().build();
    let tracer = provider.tracer(config.service_name.to_owned());
    global::set_tracer_provider(provider);
    let directives = env_filter(config.log_level);

    if !(config.interactive && io::stderr().is_terminal()) {
        let json_layer = fmt::layer()
            .json()
            .with_current_span(false)
            .with_target(true)
            .with_filter(directives);
        tracing_subscriber::registry()
            .with(json_layer)
            .with(OpenTelemetryLayer::new(tracer))
            .try_init()?;
        return Ok(());
    }

    let spinners = IndicatifLayer::new()
        .with_progress_style(spinner_style())
        .with_tick_settings(TickSettings {
            default_tick_interval: Some(SPINNER_TICK),
            ..TickSettings::default()
        });
    let pretty_layer = fmt::layer()
        .pretty()
        .with_target(false)
        .with_writer(spinners.get_stderr_writer())
        .with_filter(directives);

    tracing_subscriber::registry()
        .with(pretty_layer)
        .with(spinners.with_filter(filter::filter_fn(progress_span_filter)))
        .with(OpenTelemetryLayer::new(tracer))
        .try_init()?;
    Ok(())
}

fn env_filter(log_level: Option<LevelFilter>) -> EnvFilter {
    match log_level {
        Some(level) => EnvFilter::new(format!("{DEFAULT_DIRECTIVES},{CRATE_TARGET}={level}")),
        None => EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVES)),
    }
}

fn spinner_style() -> ProgressStyle {
    ProgressStyle::with_template("{spinner:.cyan.bold} {span_name:.bold} {msg}")
        .unwrap_or_else(|_error| ProgressStyle::default_spinner())
}

/// Only spans marked by `#[progress]` in this crate get a spinner.
fn progress_span_filter(metadata: &Metadata<'_>) -> bool {
    metadata.is_span()
        && metadata.target().starts_with(CRATE_TARGET)
        && metadata.fields().field(PROGRESS_FIELD).is_some()
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn only_progress_spans_get_spinners() {
        tracing::subscriber::with_default(tracing_subscriber::registry(), || {
            let marked = tracing::info_span!("discover", progress = true);
            let plain = tracing::info_span!("read");

            assert_eq!(Some(true), marked.metadata().map(progress_span_filter));
            assert_eq!(Some(false), plain.metadata().map(progress_span_filter));
        });
    }
}

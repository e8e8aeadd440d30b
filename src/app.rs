use std::io;

use anyhow::Result;
use gatt_dispatch_macros::progress;
use owo_colors::OwoColorize;
use tracing::instrument;
use tracing_indicatif::span_ext::IndicatifSpanExt;

use crate::cli::{Command, FakeArgs, LogLevel, OutputFormat, SessionSettings};
use crate::hw::{
    DeviceSession, HardwareClient, fake_hardware_client as build_fake_hardware_client,
    real_hardware_client as build_real_hardware_client,
};
use crate::telemetry::{self, TelemetryConfig};
use crate::terminal::{SystemTerminalClient, TerminalClient};

const SERVICE_NAME: &str = "gatt-dispatch";

/// Creates a hardware client backed by the real BLE transport.
#[must_use]
pub fn real_hardware_client() -> Box<dyn HardwareClient> {
    build_real_hardware_client()
}

/// Creates a hardware client backed by a fake GATT table.
#[must_use]
pub fn fake_hardware_client(fake_args: FakeArgs) -> Box<dyn HardwareClient> {
    build_fake_hardware_client(fake_args.into_backend_config())
}

/// Session-level app helper for connecting and wrapping a peripheral in a dispatcher.
pub struct SessionHandler<'a> {
    hardware_client: Box<dyn HardwareClient>,
    settings: &'a SessionSettings,
}

impl<'a> SessionHandler<'a> {
    /// Creates a session handler for the given settings.
    ///
    /// ```
    /// use std::sync::Arc;
    ///
    /// let settings = gatt_dispatch::SessionSettings::builder()
    ///     .subscription(Arc::new(gatt_dispatch::PeripheralSubscription::default()))
    ///     .name_prefix("Clock")
    ///     .build();
    /// let handler =
    ///     gatt_dispatch::SessionHandler::new(gatt_dispatch::real_hardware_client(), &settings);
    /// let _ = handler;
    /// ```
    #[must_use]
    pub fn new(hardware_client: Box<dyn HardwareClient>, settings: &'a SessionSettings) -> Self {
        Self {
            hardware_client,
            settings,
        }
    }

    /// Connects to the first matching peripheral. Discovery has not started yet.
    ///
    /// # Errors
    ///
    /// Returns an error if scanning or connection fails.
    #[progress(
        message = "Scanning for a matching peripheral and connecting",
        finished = format!("{} Connected", "✓".green()),
    )]
    #[instrument(skip(self), level = "info", fields(name_prefix = %self.settings.name_prefix()))]
    pub async fn connect_first(self) -> Result<DeviceSession> {
        match self
            .hardware_client
            .connect_first_device(self.settings.name_prefix())
            .await
        {
            Ok(connected) => Ok(DeviceSession::new(
                connected,
                self.settings.subscription().clone(),
            )),
            Err(error) => {
                let finish_message = format!("{} Connection failed", "✗".red());
                tracing::Span::current().pb_set_finish_message(&finish_message);
                Err(error.into())
            }
        }
    }
}

/// Runs the CLI command with an explicit telemetry log-level override.
///
/// ```
/// # async fn run() -> anyhow::Result<()> {
/// use clap::Parser;
///
/// let args = gatt_dispatch::Args::try_parse_from([
///     "gatt-dispatch",
///     "--log-level",
///     "debug",
///     "--fake",
///     "--fake-gatt",
///     "180f=2a19:64",
///     "inspect",
/// ])?;
/// let log_level = args.log_level();
/// let settings = gatt_dispatch::SessionSettings::builder()
///     .subscription(std::sync::Arc::new(gatt_dispatch::PeripheralSubscription::from_json(
///         r#"{"services":[{"uuid":"0000180f-0000-1000-8000-00805f9b34fb"}]}"#,
///     )?))
///     .build();
/// let (command, maybe_fake_args) = args.into_command_and_fake_args()?;
/// let hardware_client = match maybe_fake_args {
///     Some(fake_args) => gatt_dispatch::fake_hardware_client(fake_args),
///     None => gatt_dispatch::real_hardware_client(),
/// };
/// let mut out = Vec::new();
/// gatt_dispatch::run_with_log_level(
///     command,
///     &mut out,
///     hardware_client,
///     &settings,
///     log_level,
///     gatt_dispatch::OutputFormat::Json,
/// )
/// .await?;
/// # Ok(())
/// # }
/// ```
///
/// # Errors
///
/// Returns an error if tracing initialisation fails, BLE interaction fails, or
/// output writing fails.
pub async fn run_with_log_level<W>(
    command: Command,
    out: &mut W,
    hardware_client: Box<dyn HardwareClient>,
    settings: &SessionSettings,
    log_level: Option<LogLevel>,
    output_format: OutputFormat,
) -> Result<()>
where
    W: io::Write,
{
    run_with_clients_and_log_level(
        command,
        out,
        &SystemTerminalClient,
        hardware_client,
        settings,
        log_level,
        output_format,
    )
    .await
}

/// Runs the CLI command with injected clients.
///
/// # Errors
///
/// Returns an error if tracing initialisation fails, BLE interaction fails, or
/// output writing fails.
pub async fn run_with_clients<W>(
    command: Command,
    out: &mut W,
    terminal_client: &dyn TerminalClient,
    hardware_client: Box<dyn HardwareClient>,
    settings: &SessionSettings,
    output_format: OutputFormat,
) -> Result<()>
where
    W: io::Write,
{
    run_with_clients_and_log_level(
        command,
        out,
        terminal_client,
        hardware_client,
        settings,
        None,
        output_format,
    )
    .await
}

/// Runs the CLI command with injected clients and explicit telemetry settings.
///
/// # Errors
///
/// Returns an error if tracing initialisation fails, BLE interaction fails, or
/// output writing fails.
#[instrument(
    skip(out, terminal_client, hardware_client, settings),
    level = "info",
    fields(command = %command_name(&command), ?log_level)
)]
pub async fn run_with_clients_and_log_level<W>(
    command: Command,
    out: &mut W,
    terminal_client: &dyn TerminalClient,
    hardware_client: Box<dyn HardwareClient>,
    settings: &SessionSettings,
    log_level: Option<LogLevel>,
    output_format: OutputFormat,
) -> Result<()>
where
    W: io::Write,
{
    telemetry::initialise_tracing(
        &TelemetryConfig::builder()
            .service_name(SERVICE_NAME)
            .interactive(terminal_client.stderr_is_terminal())
            .maybe_log_level(log_level.map(LogLevel::as_level_filter))
            .build(),
    )?;

    match command {
        Command::Inspect => {
            crate::cli::inspect::run(hardware_client, settings, out, terminal_client, output_format)
                .await
        }
        Command::Read(args) => {
            crate::cli::operate::read(
                hardware_client,
                settings,
                &args,
                out,
                terminal_client,
                output_format,
            )
            .await
        }
        Command::Write(args) => {
            crate::cli::operate::write(
                hardware_client,
                settings,
                &args,
                out,
                terminal_client,
                output_format,
            )
            .await
        }
    }
}

fn command_name(command: &Command) -> &'static str {
    match command {
        Command::Inspect => "inspect",
        Command::Read(_args) => "read",
        Command::Write(_args) => "write",
    }
}

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use bon::Builder;
use clap::{Args as ClapArgs, Parser, Subcommand, ValueEnum};
use tracing::level_filters::LevelFilter;
use uuid::Uuid;

use crate::dispatch::WriteMode;
use crate::error::{CliConfigError, FixtureError, SubscriptionError};
use crate::hw::{FakeBackendConfig, GattFixture};
use crate::subscription::PeripheralSubscription;
use crate::utils;

const DEFAULT_DISCOVERY_TIMEOUT: Duration = Duration::from_secs(30);

/// Command-line options for the GATT discovery tool.
#[derive(Debug, Parser)]
#[command(
    name = "gatt-dispatch",
    about = "Discover subscribed GATT services on a BLE peripheral and operate on them."
)]
pub struct Args {
    /// JSON subscription document; defaults to `subscription.json` in the user config directory.
    #[arg(long, global = true)]
    subscription: Option<PathBuf>,
    /// Local-name prefix of the peripheral to connect to; empty matches any peripheral.
    #[arg(long, global = true, default_value = "")]
    name_prefix: String,
    /// Maximum time to wait for discovery to complete (e.g. `10s`, `1m`).
    #[arg(long, global = true, value_parser = parse_duration)]
    timeout: Option<Duration>,
    /// Log level override; `RUST_LOG` applies when omitted.
    #[arg(long, global = true, value_enum)]
    log_level: Option<LogLevel>,
    /// Output format; defaults to pretty on a terminal and JSON otherwise.
    #[arg(long, global = true, value_enum)]
    output: Option<OutputFormat>,
    /// Uses the fake BLE backend with a fixture-driven GATT table.
    #[arg(long, global = true)]
    fake: bool,
    /// Fake GATT table in the form `service=char[:hex][+desc...],char;service=...`.
    #[arg(long, global = true, requires = "fake", required_if_eq("fake", "true"))]
    fake_gatt: Option<GattFixture>,
    /// Advertised local name of the fake peripheral.
    #[arg(long, global = true, requires = "fake")]
    fake_name: Option<String>,
    /// Artificial delay before each fake transport callback (e.g. `20ms`).
    #[arg(long, global = true, requires = "fake", value_parser = parse_duration)]
    fake_delay: Option<Duration>,
    /// Makes the fake peripheral fail service discovery.
    #[arg(long, global = true, requires = "fake", hide = true)]
    fake_fail_discovery: bool,
    #[command(subcommand)]
    command: Command,
}

impl Args {
    /// Creates argument values directly without CLI parsing.
    ///
    /// ```
    /// use gatt_dispatch::{Args, Command};
    ///
    /// let inspect = Args::new(Command::Inspect);
    /// let _ = inspect;
    /// ```
    #[must_use]
    pub fn new(command: Command) -> Self {
        Self {
            subscription: None,
            name_prefix: String::new(),
            timeout: None,
            log_level: None,
            output: None,
            fake: false,
            fake_gatt: None,
            fake_name: None,
            fake_delay: None,
            fake_fail_discovery: false,
            command,
        }
    }

    /// Enables fake backend mode with pre-parsed fake configuration.
    #[must_use]
    pub fn with_fake(mut self, fake: FakeArgs) -> Self {
        let FakeArgs {
            gatt,
            device_name,
            delay,
            fail_service_discovery,
        } = fake;

        self.fake = true;
        self.fake_gatt = Some(gatt);
        self.fake_name = device_name;
        self.fake_delay = Some(delay);
        self.fake_fail_discovery = fail_service_discovery;
        self
    }

    /// Sets the subscription document path.
    #[must_use]
    pub fn with_subscription_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.subscription = Some(path.into());
        self
    }

    /// Returns the requested log level override.
    #[must_use]
    pub fn log_level(&self) -> Option<LogLevel> {
        self.log_level
    }

    /// Returns the requested output format.
    #[must_use]
    pub fn output_format(&self) -> Option<OutputFormat> {
        self.output
    }

    /// Loads the subscription and builds session settings from the global flags.
    ///
    /// # Errors
    ///
    /// Returns an error if the subscription document cannot be read or is invalid.
    pub fn session_settings(&self) -> Result<SessionSettings, SubscriptionError> {
        let subscription = PeripheralSubscription::load(self.subscription.as_deref())?;
        Ok(SessionSettings::builder()
            .subscription(Arc::new(subscription))
            .name_prefix(self.name_prefix.clone())
            .timeout(self.timeout.unwrap_or(DEFAULT_DISCOVERY_TIMEOUT))
            .build())
    }

    /// Splits parsed CLI arguments into command and optional fake-client settings.
    ///
    /// # Errors
    ///
    /// Returns an error if CLI backend configuration is invalid.
    pub fn into_command_and_fake_args(self) -> anyhow::Result<(Command, Option<FakeArgs>)> {
        let Args {
            fake,
            fake_gatt,
            fake_name,
            fake_delay,
            fake_fail_discovery,
            command,
            ..
        } = self;

        let fake_args = if fake {
            let Some(gatt) = fake_gatt else {
                return Err(CliConfigError::MissingFakeGattFixture.into());
            };
            Some(FakeArgs {
                gatt,
                device_name: fake_name,
                delay: fake_delay.unwrap_or(Duration::ZERO),
                fail_service_discovery: fake_fail_discovery,
            })
        } else {
            None
        };

        Ok((command, fake_args))
    }
}

/// Connection and discovery settings shared by every command.
#[derive(Debug, Clone, Builder)]
pub struct SessionSettings {
    subscription: Arc<PeripheralSubscription>,
    #[builder(into, default)]
    name_prefix: String,
    #[builder(default = DEFAULT_DISCOVERY_TIMEOUT)]
    timeout: Duration,
}

impl SessionSettings {
    #[must_use]
    pub fn subscription(&self) -> &Arc<PeripheralSubscription> {
        &self.subscription
    }

    #[must_use]
    pub fn name_prefix(&self) -> &str {
        &self.name_prefix
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

/// Fake backend arguments for programmatic runs.
#[derive(Debug, Builder)]
pub struct FakeArgs {
    #[builder(with = |value: &str| -> std::result::Result<_, FixtureError> { value.parse() })]
    gatt: GattFixture,
    #[builder(into)]
    device_name: Option<String>,
    #[builder(default)]
    delay: Duration,
    #[builder(default)]
    fail_service_discovery: bool,
}

impl FakeArgs {
    pub(crate) fn into_backend_config(self) -> FakeBackendConfig {
        let Self {
            gatt,
            device_name,
            delay,
            fail_service_discovery,
        } = self;

        FakeBackendConfig::builder()
            .gatt(gatt)
            .maybe_device_name(device_name)
            .event_delay(delay)
            .fail_service_discovery(fail_service_discovery)
            .build()
    }
}

/// Supported CLI commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Connect to the first matching peripheral, discover the subscribed GATT tree, and print it.
    Inspect,
    /// Discover, then read one characteristic.
    Read(CharacteristicArgs),
    /// Discover, then write one characteristic.
    Write(WriteArgs),
}

/// Addresses one characteristic by service and characteristic UUID.
#[derive(Debug, Clone, ClapArgs)]
pub struct CharacteristicArgs {
    /// Service UUID (full or 16-bit short form).
    #[arg(long, value_parser = parse_uuid)]
    service: Uuid,
    /// Characteristic UUID (full or 16-bit short form).
    #[arg(long, value_parser = parse_uuid)]
    characteristic: Uuid,
}

impl CharacteristicArgs {
    #[must_use]
    pub fn new(service: Uuid, characteristic: Uuid) -> Self {
        Self {
            service,
            characteristic,
        }
    }

    #[must_use]
    pub fn service(&self) -> Uuid {
        self.service
    }

    #[must_use]
    pub fn characteristic(&self) -> Uuid {
        self.characteristic
    }
}

/// Arguments for the `write` command.
#[derive(Debug, Clone, ClapArgs)]
pub struct WriteArgs {
    #[command(flatten)]
    target: CharacteristicArgs,
    /// Value to write as hexadecimal bytes.
    #[arg(long)]
    value: HexPayload,
    /// Writes without waiting for a response from the peripheral.
    #[arg(long)]
    without_response: bool,
}

impl WriteArgs {
    /// Creates write arguments directly without CLI parsing.
    ///
    /// # Errors
    ///
    /// Returns an error if the value is not valid hexadecimal.
    pub fn new(target: CharacteristicArgs, value: &str) -> Result<Self, FixtureError> {
        Ok(Self {
            target,
            value: value.parse()?,
            without_response: false,
        })
    }

    #[must_use]
    pub fn target(&self) -> &CharacteristicArgs {
        &self.target
    }

    #[must_use]
    pub fn value(&self) -> &[u8] {
        &self.value.0
    }

    #[must_use]
    pub fn mode(&self) -> WriteMode {
        if self.without_response {
            WriteMode::WithoutResponse
        } else {
            WriteMode::WithResponse
        }
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
struct HexPayload(Vec<u8>);

impl FromStr for HexPayload {
    type Err = FixtureError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Ok(Self(utils::parse_hex(value)?))
    }
}

/// Log verbosity accepted by `--log-level`.
#[derive(Debug, Clone, Copy, Eq, PartialEq, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub(crate) fn as_level_filter(self) -> LevelFilter {
        match self {
            Self::Error => LevelFilter::ERROR,
            Self::Warn => LevelFilter::WARN,
            Self::Info => LevelFilter::INFO,
            Self::Debug => LevelFilter::DEBUG,
            Self::Trace => LevelFilter::TRACE,
        }
    }
}

/// Rendering of command results.
#[derive(Debug, Clone, Copy, Eq, PartialEq, ValueEnum)]
pub enum OutputFormat {
    Pretty,
    Json,
}

fn parse_duration(value: &str) -> Result<Duration, String> {
    humantime::parse_duration(value).map_err(|error| error.to_string())
}

fn parse_uuid(value: &str) -> Result<Uuid, String> {
    utils::parse_uuid(value).map_err(|error| error.to_string())
}

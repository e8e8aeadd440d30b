pub(crate) mod command;
pub(crate) mod inspect;
pub(crate) mod operate;
pub(crate) mod ui;

use tracing::{debug, instrument};
use tokio_util::sync::CancellationToken;

pub use self::command::{
    Args, CharacteristicArgs, Command, FakeArgs, LogLevel, OutputFormat, SessionSettings,
    WriteArgs,
};
use crate::error::InteractionError;
use crate::hw::{DeviceSession, DiscoveryReport};

/// Runs discovery until ready, the settings timeout, or Ctrl+C.
#[instrument(skip_all, level = "debug")]
pub(crate) async fn discover_until_ready(
    session: &mut DeviceSession,
    settings: &SessionSettings,
) -> Result<DiscoveryReport, InteractionError> {
    let cancel = CancellationToken::new();
    let interrupt = tokio::spawn({
        let cancel = cancel.clone();
        async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => cancel.cancel(),
                Err(error) => debug!(?error, "failed to listen for Ctrl+C"),
            }
        }
    });

    let result = session.discover(Some(settings.timeout()), &cancel).await;
    interrupt.abort();
    result
}

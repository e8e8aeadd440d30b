use std::io;

use anyhow::Result;
use tracing::{instrument, warn};

use crate::cli::{OutputFormat, SessionSettings};
use crate::error::InteractionError;
use crate::hw::HardwareClient;
use crate::terminal::TerminalClient;

use super::ui::{DiscoveryReportView, Painter};

/// Executes the `inspect` command.
///
/// A discovery timeout still prints the partial tree so stalled branches are visible.
#[instrument(skip_all, level = "info", fields(?output_format))]
pub(crate) async fn run<W>(
    client: Box<dyn HardwareClient>,
    settings: &SessionSettings,
    out: &mut W,
    terminal_client: &dyn TerminalClient,
    output_format: OutputFormat,
) -> Result<()>
where
    W: io::Write,
{
    let mut session = crate::SessionHandler::new(client, settings).connect_first().await?;
    let (report, outcome) = match super::discover_until_ready(&mut session, settings).await {
        Ok(report) => (report, Ok(())),
        Err(error @ InteractionError::DiscoveryTimedOut { .. }) => {
            warn!(%error, "printing partial entity tree");
            (session.report(), Err(error))
        }
        Err(error) => return Err(error.into()),
    };
    session.close().await?;

    match output_format {
        OutputFormat::Pretty => {
            let painter = Painter::new(terminal_client.stdout_is_terminal());
            writeln!(out, "{}", DiscoveryReportView::new(&report, &painter))?;
        }
        OutputFormat::Json => {
            serde_json::to_writer_pretty(&mut *out, &report)?;
            writeln!(out)?;
        }
    }

    outcome?;
    Ok(())
}

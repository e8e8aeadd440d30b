use std::io;

use anyhow::Result;
use tracing::instrument;

use crate::cli::{CharacteristicArgs, OutputFormat, SessionSettings, WriteArgs};
use crate::error::OperationKind;
use crate::hw::{HardwareClient, ValueReport};
use crate::terminal::TerminalClient;

use super::ui::{Painter, ValueReportView};

/// Executes the `read` command.
#[instrument(skip_all, level = "info", fields(service = %args.service(), characteristic = %args.characteristic()))]
pub(crate) async fn read<W>(
    client: Box<dyn HardwareClient>,
    settings: &SessionSettings,
    args: &CharacteristicArgs,
    out: &mut W,
    terminal_client: &dyn TerminalClient,
    output_format: OutputFormat,
) -> Result<()>
where
    W: io::Write,
{
    let mut session = crate::SessionHandler::new(client, settings).connect_first().await?;
    super::discover_until_ready(&mut session, settings).await?;
    let value = session.read(args.service(), args.characteristic()).await?;
    session.close().await?;

    let report = ValueReport::new(
        OperationKind::Read,
        args.service(),
        args.characteristic(),
        &value,
    );
    render(&report, out, terminal_client, output_format)
}

/// Executes the `write` command.
#[instrument(skip_all, level = "info", fields(mode = %args.mode(), len = args.value().len()))]
pub(crate) async fn write<W>(
    client: Box<dyn HardwareClient>,
    settings: &SessionSettings,
    args: &WriteArgs,
    out: &mut W,
    terminal_client: &dyn TerminalClient,
    output_format: OutputFormat,
) -> Result<()>
where
    W: io::Write,
{
    let target = args.target();
    let mut session = crate::SessionHandler::new(client, settings).connect_first().await?;
    super::discover_until_ready(&mut session, settings).await?;
    session
        .write(
            target.service(),
            target.characteristic(),
            args.value().to_vec(),
            args.mode(),
        )
        .await?;
    session.close().await?;

    let report = ValueReport::new(
        OperationKind::Write,
        target.service(),
        target.characteristic(),
        args.value(),
    );
    render(&report, out, terminal_client, output_format)
}

fn render<W>(
    report: &ValueReport,
    out: &mut W,
    terminal_client: &dyn TerminalClient,
    output_format: OutputFormat,
) -> Result<()>
where
    W: io::Write,
{
    match output_format {
        OutputFormat::Pretty => {
            let painter = Painter::new(terminal_client.stdout_is_terminal());
            writeln!(out, "{}", ValueReportView::new(report, &painter))?;
        }
        OutputFormat::Json => {
            serde_json::to_writer_pretty(&mut *out, report)?;
            writeln!(out)?;
        }
    }
    Ok(())
}

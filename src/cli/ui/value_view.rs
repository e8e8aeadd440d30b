use std::fmt::{self, Display, Formatter};

use crate::error::OperationKind;
use crate::hw::ValueReport;
use crate::utils::{format_hex, parse_hex};

use super::painter::Painter;
use super::table::Table;

/// Renders the outcome of a characteristic read or write.
pub(crate) struct ValueReportView<'a> {
    report: &'a ValueReport,
    painter: &'a Painter,
}

impl<'a> ValueReportView<'a> {
    pub(crate) fn new(report: &'a ValueReport, painter: &'a Painter) -> Self {
        Self { report, painter }
    }

    fn heading(&self) -> String {
        let text = match self.report.operation() {
            OperationKind::Write => "✓ Write acknowledged",
            OperationKind::Read | OperationKind::Notify => "✓ Read completed",
        };
        self.painter.success(text)
    }
}

impl Display for ValueReportView<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let bytes = parse_hex(self.report.value()).unwrap_or_default();
        let table = Table::key_value(
            self.painter,
            vec![
                ("service", self.painter.value(self.report.service().to_string())),
                (
                    "characteristic",
                    self.painter.value(self.report.characteristic().to_string()),
                ),
                ("bytes", self.painter.value(bytes.len().to_string())),
                ("value", self.painter.value(format_hex(&bytes))),
            ],
        );
        write!(f, "{}\n{table}", self.heading())
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;

    #[test]
    fn read_view_shows_spaced_hex() {
        let report = ValueReport::new(OperationKind::Read, Uuid::nil(), Uuid::nil(), &[0x64, 0x01]);
        let painter = Painter::new(false);
        let rendered = ValueReportView::new(&report, &painter).to_string();

        assert!(rendered.starts_with("✓ Read completed"));
        assert!(rendered.contains("64 01"));
    }

    #[test]
    fn write_view_names_the_operation() {
        let report = ValueReport::new(OperationKind::Write, Uuid::nil(), Uuid::nil(), &[]);
        let painter = Painter::new(false);
        let rendered = ValueReportView::new(&report, &painter).to_string();

        assert!(rendered.starts_with("✓ Write acknowledged"));
        assert!(rendered.contains("<empty>"));
    }
}

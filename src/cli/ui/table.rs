use std::fmt::{self, Display, Formatter};

use tabled::builder::Builder;
use tabled::settings::object::Columns;
use tabled::settings::{Alignment, Modify, Style as TableStyle};

use super::painter::Painter;

const INDENT: &str = "  ";

/// Rounded table rendered through `Display`.
#[derive(Debug)]
pub(crate) struct Table {
    headers: Option<Vec<String>>,
    rows: Vec<Vec<String>>,
    right_aligned: Option<usize>,
}

impl Table {
    /// Creates a table with a header row.
    pub(crate) fn grid(
        headers: impl IntoIterator<Item = impl Into<String>>,
        rows: Vec<Vec<String>>,
    ) -> Self {
        Self {
            headers: Some(headers.into_iter().map(Into::into).collect()),
            rows,
            right_aligned: None,
        }
    }

    /// Creates a header-less two-column table with muted field names.
    pub(crate) fn key_value(painter: &Painter, rows: Vec<(&str, String)>) -> Self {
        Self {
            headers: None,
            rows: rows
                .into_iter()
                .map(|(field, value)| vec![painter.muted(field), value])
                .collect(),
            right_aligned: None,
        }
    }

    /// Creates a grid whose `column` is indented by each row's depth.
    pub(crate) fn tree(
        headers: impl IntoIterator<Item = impl Into<String>>,
        column: usize,
        rows: Vec<(usize, Vec<String>)>,
    ) -> Self {
        let rows = rows
            .into_iter()
            .map(|(depth, mut cells)| {
                if let Some(cell) = cells.get_mut(column) {
                    *cell = format!("{}{cell}", INDENT.repeat(depth));
                }
                cells
            })
            .collect();
        Self::grid(headers, rows)
    }

    /// Right-aligns one column, typically a handle or count.
    pub(crate) fn align_right(mut self, column: usize) -> Self {
        self.right_aligned = Some(column);
        self
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl Display for Table {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let mut builder = Builder::default();
        if let Some(headers) = &self.headers {
            builder.push_record(headers);
        }
        for row in &self.rows {
            builder.push_record(row);
        }

        let mut table = builder.build();
        if self.headers.is_some() {
            table.with(TableStyle::rounded());
        } else {
            table.with(TableStyle::rounded().remove_horizontals());
        }
        if let Some(column) = self.right_aligned {
            table.with(Modify::new(Columns::one(column)).with(Alignment::right()));
        }
        write!(f, "{table}")
    }
}

use std::fmt::{self, Display, Formatter};

use tabled::{builder::Builder, settings::Style as TableStyle};

use super::painter::Painter;

/// Rounded terminal table rendered through `Display`.
#[derive(Debug)]
pub(crate) struct Table {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Table {
    pub(crate) fn grid(
        headers: impl IntoIterator<Item = impl Into<String>>,
        rows: Vec<Vec<String>>,
    ) -> Self {
        Self {
            headers: headers.into_iter().map(Into::into).collect(),
            rows,
        }
    }

    /// Two columns of field names (muted) and values.
    pub(crate) fn key_value(painter: &Painter, rows: Vec<(&str, String)>) -> Self {
        let records = rows
            .into_iter()
            .map(|(field, value)| vec![painter.muted(field), value])
            .collect();
        Self::grid(["field", "value"], records)
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl Display for Table {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let mut builder = Builder::default();
        builder.push_record(&self.headers);
        for row in &self.rows {
            builder.push_record(row);
        }
        let mut table = builder.build();
        table.with(TableStyle::rounded());
        write!(f, "{table}")
    }
}

#[cfg(test)]
mod tests {
    use insta::assert_snapshot;

    use super::*;

    #[test]
    fn grid_renders_headers_and_rows() {
        let table = Table::grid(
            ["endpoint", "byte"],
            vec![
                vec!["speed".into(), "200".into()],
                vec!["turn".into(), "90".into()],
            ],
        );

        assert_snapshot!(table.to_string(), @r"
        ╭──────────┬──────╮
        │ endpoint │ byte │
        ├──────────┼──────┤
        │ speed    │ 200  │
        │ turn     │ 90   │
        ╰──────────┴──────╯
        ");
    }

    #[test]
    fn key_value_uses_field_and_value_columns() {
        let painter = Painter::new(false);
        let table = Table::key_value(&painter, vec![("device_id", "AA:BB:CC".into())]);

        assert_snapshot!(table.to_string(), @r"
        ╭───────────┬──────────╮
        │ field     │ value    │
        ├───────────┼──────────┤
        │ device_id │ AA:BB:CC │
        ╰───────────┴──────────╯
        ");
        assert!(!table.is_empty());
    }
}

//! Tabular (CSV) rendering of outcome records

use std::io::Write;

use csv::{QuoteStyle, WriterBuilder};
use serde_json::{Map, Value};

use crate::error::E2eResult;

/// Header plus one row of cells per record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    /// Columns come from the first record's keys, in insertion order. Later
    /// records are projected onto those columns: missing keys give empty
    /// cells and keys outside the header are not emitted.
    ///
    /// Returns `None` when there are no records.
    pub fn from_records(records: &[Map<String, Value>]) -> Option<Self> {
        let first = records.first()?;
        let header: Vec<String> = first.keys().cloned().collect();

        let rows = records
            .iter()
            .map(|record| {
                header
                    .iter()
                    .map(|key| record.get(key).map(cell_text).unwrap_or_default())
                    .collect()
            })
            .collect();

        Some(Self { header, rows })
    }

    /// Write header and rows.
    ///
    /// A cell containing the delimiter, a double quote, or a line break is
    /// wrapped in double quotes with inner quotes doubled.
    pub fn write_to<W: Write>(&self, out: W) -> E2eResult<()> {
        let mut writer = WriterBuilder::new()
            .quote_style(QuoteStyle::Necessary)
            .from_writer(out);

        writer.write_record(&self.header)?;
        for row in &self.rows {
            writer.write_record(row)?;
        }
        writer.flush()?;
        Ok(())
    }

    pub fn to_csv_string(&self) -> E2eResult<String> {
        let mut buf = Vec::new();
        self.write_to(&mut buf)?;
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }
}

/// Textual form of a JSON value as it appears in a cell
pub fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn record(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            other => panic!("not an object: {}", other),
        }
    }

    #[test]
    fn test_empty_records_have_no_table() {
        assert!(Table::from_records(&[]).is_none());
    }

    #[test]
    fn test_header_follows_first_record_key_order() {
        let records = vec![
            record(json!({ "user": "Jo", "status": "started", "screenshot": null })),
            record(json!({ "status": "completed", "user": "Jo", "screenshot": "a.png", "extra": 1 })),
        ];
        let table = Table::from_records(&records).unwrap();
        assert_eq!(table.header, vec!["user", "status", "screenshot"]);
        assert_eq!(table.rows[0], vec!["Jo", "started", ""]);
        assert_eq!(table.rows[1], vec!["Jo", "completed", "a.png"]);
    }

    #[test]
    fn test_cell_text_forms() {
        assert_eq!(cell_text(&json!(null)), "");
        assert_eq!(cell_text(&json!(3)), "3");
        assert_eq!(cell_text(&json!(true)), "true");
        assert_eq!(cell_text(&json!({ "a": [1, 2] })), r#"{"a":[1,2]}"#);
    }

    #[test]
    fn test_quotes_only_when_needed() {
        let records = vec![record(json!({ "user": "Jo", "note": "a, \"b\"" }))];
        let csv = Table::from_records(&records).unwrap().to_csv_string().unwrap();
        assert_eq!(csv, "user,note\nJo,\"a, \"\"b\"\"\"\n");
    }

    proptest! {
        #[test]
        fn prop_cells_round_trip(value in "[a-z ,\"\\n]{0,16}") {
            let records = vec![record(json!({ "user": "x", "value": value.clone() }))];
            let text = Table::from_records(&records).unwrap().to_csv_string().unwrap();

            if value.contains(',') || value.contains('"') {
                let expected = format!("\"{}\"", value.replace('"', "\"\""));
                prop_assert!(text.contains(&expected));
            }

            let mut reader = csv::ReaderBuilder::new().from_reader(text.as_bytes());
            let parsed: Vec<csv::StringRecord> = reader.records().collect::<Result<_, _>>().unwrap();
            prop_assert_eq!(parsed.len(), 1);
            prop_assert_eq!(&parsed[0][1], value.as_str());
        }
    }
}

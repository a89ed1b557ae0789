//! Row source loading from a header-first CSV file

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use csv::{ReaderBuilder, Trim};
use tracing::{debug, error, info, warn};

use crate::error::{E2eError, E2eResult};
use crate::row::{column, RowRecord};

const BOM: char = '\u{feff}';

/// Parsed contents of a data file
#[derive(Debug, Clone)]
pub struct RowTable {
    pub columns: Vec<String>,
    pub rows: Vec<RowRecord>,
}

/// Loads row records from a CSV file on disk
#[derive(Debug, Clone)]
pub struct RowSource {
    path: PathBuf,
}

impl RowSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read and parse the file.
    ///
    /// A missing file is fatal for the whole run, so it is checked before
    /// anything else is attempted.
    pub fn load(&self) -> E2eResult<Vec<RowRecord>> {
        if !self.path.is_file() {
            error!("Missing data file at: {}", self.path.display());
            return Err(E2eError::DataFileMissing(self.path.clone()));
        }

        let bytes = std::fs::read(&self.path)?;
        let text = String::from_utf8(bytes).map_err(|e| E2eError::Encoding {
            path: self.path.clone(),
            reason: e.utf8_error().to_string(),
        })?;

        let table = parse_table(&text)?;

        info!("Data file columns: {:?}", table.columns);
        info!("Total rows found: {}", table.rows.len());

        if !table.columns.is_empty() && !table.columns.iter().any(|c| c == column::URL) {
            warn!(
                "Data file {} has no '{}' column; every row will fail validation",
                self.path.display(),
                column::URL
            );
        }

        Ok(table.rows)
    }
}

/// Parse CSV text whose first line names the columns.
///
/// Blank and whitespace-only lines are skipped, cells are trimmed, and short
/// lines are tolerated: trailing cells that are missing stay absent from the
/// record. A line holding only delimiters becomes a row of empty cells.
pub fn parse_table(text: &str) -> E2eResult<RowTable> {
    let text = text.strip_prefix(BOM).unwrap_or(text);

    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(text.as_bytes());

    let columns: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
    let mut rows = Vec::new();

    for record in reader.records() {
        let record = record?;

        // Whitespace-only line. A line of bare delimiters is still a row.
        if record.len() == 1 && record.get(0).map_or(true, str::is_empty) {
            continue;
        }

        if record.len() > columns.len() {
            debug!(
                "Ignoring {} extra cell(s) on data line {}",
                record.len() - columns.len(),
                rows.len() + 1
            );
        }

        let fields: BTreeMap<String, String> = columns
            .iter()
            .zip(record.iter())
            .map(|(name, value)| (name.clone(), value.to_string()))
            .collect();

        rows.push(RowRecord::new(rows.len() + 1, fields));
    }

    Ok(RowTable { columns, rows })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_strips_bom_and_trims() {
        let text = "\u{feff}url , firstName\n  https://example.test/app ,  Jo  \n";
        let table = parse_table(text).unwrap();
        assert_eq!(table.columns, vec!["url", "firstName"]);
        assert_eq!(table.rows.len(), 1);
        assert_eq!(table.rows[0].get("url"), Some("https://example.test/app"));
        assert_eq!(table.rows[0].get("firstName"), Some("Jo"));
    }

    #[test]
    fn test_short_rows_leave_trailing_columns_absent() {
        let text = "url,firstName,lastName\nhttps://a.test,Jo\nhttps://b.test,Al,Smith\n";
        let table = parse_table(text).unwrap();
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[0].get("lastName"), None);
        assert_eq!(table.rows[1].get("lastName"), Some("Smith"));
    }

    #[test]
    fn test_blank_lines_are_skipped_and_indices_follow_data_order() {
        let text = "url,firstName\n\nhttps://a.test,Jo\n   \nhttps://b.test,Al\n\n";
        let table = parse_table(text).unwrap();
        let indices: Vec<usize> = table.rows.iter().map(|r| r.index()).collect();
        let names: Vec<&str> = table.rows.iter().map(|r| r.subject()).collect();
        assert_eq!(indices, vec![1, 2]);
        assert_eq!(names, vec!["Jo", "Al"]);
    }

    #[test]
    fn test_delimiter_only_lines_are_kept_as_rows() {
        let text = "url,firstName,lastName\nhttps://a.test,Jo,X\n,,\n , \nhttps://b.test,Al,Y\n";
        let table = parse_table(text).unwrap();
        assert_eq!(table.rows.len(), 4);
        assert_eq!(table.rows[1].index(), 2);
        assert_eq!(table.rows[1].get("url"), Some(""));
        assert_eq!(table.rows[2].get("url"), Some(""));
        assert_eq!(table.rows[3].subject(), "Al");
    }

    #[test]
    fn test_extra_cells_are_ignored() {
        let table = parse_table("url\nhttps://a.test,surplus\n").unwrap();
        assert_eq!(table.rows[0].fields().len(), 1);
    }

    #[test]
    fn test_quoted_cells_keep_commas() {
        let table = parse_table("url,selectedAddress\nhttps://a.test,\"12A Brushfield Street, London\"\n").unwrap();
        assert_eq!(
            table.rows[0].get("selectedAddress"),
            Some("12A Brushfield Street, London")
        );
    }

    #[test]
    fn test_missing_file_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let err = RowSource::new(dir.path().join("test-data.csv")).load().unwrap_err();
        assert!(matches!(err, E2eError::DataFileMissing(_)));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_invalid_utf8_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test-data.csv");
        std::fs::write(&path, b"url\n\xff\xfe\n").unwrap();
        let err = RowSource::new(&path).load().unwrap_err();
        assert!(matches!(err, E2eError::Encoding { .. }));
    }

    #[test]
    fn test_load_reads_rows_in_file_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test-data.csv");
        std::fs::write(
            &path,
            "url,firstName\nhttps://a.test,One\nhttps://b.test,Two\nhttps://c.test\n",
        )
        .unwrap();
        let rows = RowSource::new(&path).load().unwrap();
        let urls: Vec<&str> = rows.iter().filter_map(|r| r.get("url")).collect();
        assert_eq!(urls, vec!["https://a.test", "https://b.test", "https://c.test"]);
    }
}

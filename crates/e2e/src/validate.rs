//! Per-row structural validation

use tracing::error;

use crate::error::{E2eError, E2eResult};
use crate::row::{column, RowRecord};

/// A row whose navigation target has been checked.
#[derive(Debug, Clone, Copy)]
pub struct ValidatedRow<'a> {
    pub record: &'a RowRecord,
    pub url: &'a str,
}

/// Check that the row carries a non-empty target URL.
///
/// Failures are logged with the row index and full row content so the
/// offending line can be found in the data file.
pub fn validate_row(record: &RowRecord) -> E2eResult<ValidatedRow<'_>> {
    match record.non_empty(column::URL) {
        Some(url) => Ok(ValidatedRow { record, url }),
        None => {
            error!(row = record.index(), "DATA ERROR at Row {}", record.index());
            error!(row = record.index(), "Record Content: {}", record);
            Err(E2eError::RowValidation {
                row: record.index(),
                field: column::URL.to_string(),
                content: record.to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use test_case::test_case;

    fn record(index: usize, url: Option<&str>) -> RowRecord {
        let mut fields = BTreeMap::new();
        fields.insert("firstName".to_string(), "Jo".to_string());
        if let Some(url) = url {
            fields.insert("url".to_string(), url.to_string());
        }
        RowRecord::new(index, fields)
    }

    #[test_case("https://example.test/app" ; "absolute url")]
    #[test_case("http://localhost:8080" ; "localhost")]
    #[test_case("/relative/path" ; "any non empty text")]
    fn test_accepts_non_empty_url(url: &str) {
        let r = record(1, Some(url));
        let valid = validate_row(&r).unwrap();
        assert_eq!(valid.url, url);
        assert_eq!(valid.record.index(), 1);
    }

    #[test_case(None, 4 ; "column missing")]
    #[test_case(Some(""), 7 ; "blank cell")]
    fn test_rejects_missing_url_with_row_index(url: Option<&str>, index: usize) {
        let r = record(index, url);
        let err = validate_row(&r).unwrap_err();
        let message = err.to_string();
        assert!(message.contains(&format!("Row {}", index)), "{}", message);
        assert!(message.contains("Jo"), "{}", message);
        assert!(matches!(err, E2eError::RowValidation { row, .. } if row == index));
    }
}

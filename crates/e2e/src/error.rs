//! Error types for E2E runs

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum E2eError {
    #[error("Missing data file at: {}", .0.display())]
    DataFileMissing(PathBuf),

    #[error("Data file {} is not valid UTF-8: {reason}", path.display())]
    Encoding { path: PathBuf, reason: String },

    #[error("Row {row} is missing a {field} value. Check your CSV headers! Row content: {content}")]
    RowValidation {
        row: usize,
        field: String,
        content: String,
    },

    #[error("Row {row} has no value for column '{field}'")]
    MissingField { row: usize, field: String },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Playwright not found. Install with: npm install playwright && npx playwright install")]
    PlaywrightNotFound,

    #[error("Playwright error: {0}")]
    Playwright(String),

    #[error("Step failed: {step} - {reason}")]
    StepFailed { step: String, reason: String },

    #[error("Post-condition failed: {0}")]
    PostCondition(String),

    #[error("Timeout waiting for: {0}")]
    Timeout(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl E2eError {
    /// Whether this error must abort the whole run rather than a single row.
    ///
    /// I/O failures count as fatal: inside a row they are folded into the
    /// row's result and never reach the caller.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            E2eError::DataFileMissing(_)
                | E2eError::Encoding { .. }
                | E2eError::Io(_)
                | E2eError::Csv(_)
                | E2eError::Config(_)
                | E2eError::PlaywrightNotFound
                | E2eError::Toml(_)
        )
    }
}

pub type E2eResult<T> = Result<T, E2eError>;

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(E2eError::DataFileMissing(PathBuf::from("test-data.csv")), true; "missing data file")]
    #[test_case(E2eError::PlaywrightNotFound, true; "no playwright")]
    #[test_case(E2eError::Io(std::io::Error::from(std::io::ErrorKind::PermissionDenied)), true; "unreadable file")]
    #[test_case(E2eError::MissingField { row: 1, field: "dob".into() }, false; "missing column")]
    #[test_case(E2eError::Timeout("row 1".into()), false; "row timeout")]
    #[test_case(E2eError::PostCondition("no heading".into()), false; "post condition")]
    fn test_is_fatal(err: E2eError, fatal: bool) {
        assert_eq!(err.is_fatal(), fatal);
    }
}

//! Output formatting for CLI

use clap::ValueEnum;
use colored::Colorize;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;

use loanflow_e2e::validate::validate_row;
use loanflow_e2e::{RowRecord, RowResult, TestSuiteResult};

/// Output format
#[derive(Debug, Clone, Copy, ValueEnum, Default)]
pub enum OutputFormat {
    /// Human-readable table format
    #[default]
    Table,
    /// JSON format
    Json,
    /// YAML format
    Yaml,
}

/// Trait for items that can be displayed in a table
pub trait TableDisplay {
    fn headers() -> Vec<&'static str>;
    fn row(&self) -> Vec<String>;
}

impl TableDisplay for RowResult {
    fn headers() -> Vec<&'static str> {
        vec!["Row", "Scenario", "Status", "Duration", "Detail"]
    }

    fn row(&self) -> Vec<String> {
        let (status, detail) = if self.success {
            let shot = self
                .screenshot
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_default();
            ("PASS".green().to_string(), shot)
        } else {
            let during = self
                .failed_during
                .map(|s| format!("[{}] ", s))
                .unwrap_or_default();
            (
                "FAIL".red().to_string(),
                format!("{}{}", during, self.error.as_deref().unwrap_or("")),
            )
        };
        vec![
            self.row.to_string(),
            self.name.clone(),
            status,
            format!("{} ms", self.duration_ms),
            detail,
        ]
    }
}

/// Result of checking one data row without running it
#[derive(Debug, Clone, Serialize)]
pub struct RowCheck {
    pub row: usize,
    pub subject: String,
    pub url: Option<String>,
    pub valid: bool,
    pub error: Option<String>,
}

impl RowCheck {
    pub fn from_record(record: &RowRecord) -> Self {
        let (url, error) = match validate_row(record) {
            Ok(valid) => (Some(valid.url.to_string()), None),
            Err(e) => (None, Some(e.to_string())),
        };
        Self {
            row: record.index(),
            subject: record.subject().to_string(),
            valid: error.is_none(),
            url,
            error,
        }
    }
}

impl TableDisplay for RowCheck {
    fn headers() -> Vec<&'static str> {
        vec!["Row", "Subject", "URL", "Status", "Detail"]
    }

    fn row(&self) -> Vec<String> {
        let status = if self.valid {
            "OK".green().to_string()
        } else {
            "INVALID".red().to_string()
        };
        vec![
            self.row.to_string(),
            self.subject.clone(),
            self.url.clone().unwrap_or_default(),
            status,
            self.error.clone().unwrap_or_default(),
        ]
    }
}

/// Print a single item
pub fn print_item<T: Serialize>(item: &T, format: OutputFormat) {
    match format {
        OutputFormat::Json | OutputFormat::Table => {
            println!("{}", serde_json::to_string_pretty(item).unwrap_or_default());
        }
        OutputFormat::Yaml => {
            println!("{}", serde_yaml::to_string(item).unwrap_or_default());
        }
    }
}

/// Print a list of items
pub fn print_list<T: Serialize + TableDisplay>(items: &[T], format: OutputFormat) {
    match format {
        OutputFormat::Table => {
            if items.is_empty() {
                println!("No rows found.");
                return;
            }

            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic);

            table.set_header(T::headers());
            for item in items {
                table.add_row(item.row());
            }

            println!("{table}");
        }
        OutputFormat::Json | OutputFormat::Yaml => print_item(&items, format),
    }
}

/// Print the outcome of a run
pub fn print_suite(suite: &TestSuiteResult, format: OutputFormat) {
    match format {
        OutputFormat::Table => {
            print_list(&suite.results, format);
            if let Some(path) = &suite.report_json {
                print_info(&format!("Report: {}", path.display()));
            }
            if let Some(path) = &suite.report_csv {
                print_info(&format!("Tabular report: {}", path.display()));
            }
            let summary = format!(
                "{} passed, {} failed ({} ms)",
                suite.passed, suite.failed, suite.duration_ms
            );
            if suite.success() {
                print_success(&summary);
            } else {
                print_error(&summary);
            }
        }
        OutputFormat::Json | OutputFormat::Yaml => print_item(suite, format),
    }
}

/// Print success message
pub fn print_success(message: &str) {
    println!("✅ {}", message);
}

/// Print error message
pub fn print_error(message: &str) {
    eprintln!("❌ {}", message);
}

/// Print info message
pub fn print_info(message: &str) {
    println!("ℹ️  {}", message);
}

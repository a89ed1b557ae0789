//! Run orchestration: rows in, one executor per row, one report out

use std::path::PathBuf;
use std::time::Instant;

use futures::stream::{self, StreamExt};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::config::RunConfig;
use crate::error::E2eResult;
use crate::loader::RowSource;
use crate::page::PageFactory;
use crate::reporter::{FlushedReport, OutcomeReporter};
use crate::row::RowRecord;
use crate::scenario::{RowResult, ScenarioExecutor};

/// Result of running every row
#[derive(Debug, Clone, Serialize)]
pub struct TestSuiteResult {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub duration_ms: u64,
    pub results: Vec<RowResult>,
    /// Written report files; `None` if flushing failed
    pub report_json: Option<PathBuf>,
    pub report_csv: Option<PathBuf>,
}

impl TestSuiteResult {
    pub fn success(&self) -> bool {
        self.failed == 0
    }
}

/// Main data-driven test runner
pub struct TestRunner {
    config: RunConfig,
}

impl TestRunner {
    pub fn new(config: RunConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Load the rows up front. A missing file aborts the run here, before any
    /// browser is started.
    pub fn load_rows(&self) -> E2eResult<Vec<RowRecord>> {
        RowSource::new(&self.config.data_file).load()
    }

    /// Load the data file and run every row.
    pub async fn run_all<F: PageFactory + ?Sized>(&self, pages: &F) -> E2eResult<TestSuiteResult> {
        let rows = self.load_rows()?;
        Ok(self.run_rows(&rows, pages).await)
    }

    /// Run the given rows, at most `workers` at a time, then flush the report.
    ///
    /// Row failures never abort siblings, and a report that cannot be written
    /// is logged without changing any row's verdict.
    pub async fn run_rows<F: PageFactory + ?Sized>(
        &self,
        rows: &[RowRecord],
        pages: &F,
    ) -> TestSuiteResult {
        let start = Instant::now();
        let reporter = OutcomeReporter::new(&self.config.results_dir);

        info!(
            "Running {} row(s) with {} worker(s)...",
            rows.len(),
            self.config.workers
        );

        let mut results: Vec<RowResult> = stream::iter(rows)
            .map(|row| ScenarioExecutor::new(row, &self.config, &reporter).run(pages))
            .buffer_unordered(self.config.workers.max(1))
            .collect()
            .await;
        results.sort_by_key(|r| r.row);

        let passed = results.iter().filter(|r| r.success).count();
        let failed = results.len() - passed;
        let duration_ms = start.elapsed().as_millis() as u64;

        let flushed = match reporter.flush() {
            Ok(flushed) => Some(flushed),
            Err(e) => {
                warn!("Failed to write report: {}", e);
                None
            }
        };

        info!("");
        info!(
            "Test Results: {} passed, {} failed ({} ms)",
            passed, failed, duration_ms
        );
        if failed > 0 {
            for result in results.iter().filter(|r| !r.success) {
                error!(
                    "  ✗ {} - {}",
                    result.name,
                    result.error.as_deref().unwrap_or("unknown error")
                );
            }
        }

        let (report_json, report_csv) = match flushed {
            Some(FlushedReport { files, .. }) => (Some(files.json), files.csv),
            None => (None, None),
        };

        TestSuiteResult {
            total: results.len(),
            passed,
            failed,
            duration_ms,
            results,
            report_json,
            report_csv,
        }
    }

    /// Write the suite result next to the reports as `test-results.json`.
    pub fn write_results(&self, results: &TestSuiteResult) -> E2eResult<PathBuf> {
        std::fs::create_dir_all(&self.config.results_dir)?;

        let path = self.config.results_dir.join("test-results.json");
        let json = serde_json::to_string_pretty(results)?;
        std::fs::write(&path, json)?;

        info!("Results written to: {}", path.display());
        Ok(path)
    }
}

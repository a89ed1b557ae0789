//! LoanFlow E2E Test Framework
//!
//! Data-driven end-to-end runner for the loan application wizard:
//! - Loads scenario rows from a header-first CSV file
//! - Drives one browser page per row through the wizard
//! - Collects lifecycle outcomes into JSON and CSV reports
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         TestRunner                          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  RowSource::load(path) -> [RowRecord]                       │
//! │    └── fails the run if the file is missing                 │
//! │  for each row (bounded concurrency):                        │
//! │    ScenarioExecutor::run(pages) -> RowResult                │
//! │      ├── validate_row()          first action, per row      │
//! │      ├── Page (trait)            PlaywrightPage in prod     │
//! │      └── OutcomeReporter::record(started/completed/failed)  │
//! │  OutcomeReporter::flush()                                   │
//! │    ├── test-report-<ms>.json                                │
//! │    └── test-report-<ms>.csv      skipped when empty         │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod error;
pub mod loader;
pub mod page;
pub mod playwright;
pub mod reporter;
pub mod row;
pub mod runner;
pub mod scenario;
pub mod tabular;
pub mod validate;

pub use config::RunConfig;
pub use error::{E2eError, E2eResult};
pub use loader::RowSource;
pub use page::{Locator, Page, PageFactory, TextMatch, WaitState};
pub use reporter::{OutcomeReporter, Report};
pub use row::RowRecord;
pub use runner::{TestRunner, TestSuiteResult};
pub use scenario::{ExecutorState, RowResult, ScenarioExecutor, WizardStage};

//! LoanFlow CLI - Main Entry Point
//!
//! Runs the loan application wizard once per row of a CSV data file and
//! reports the outcome of every row.
//!
//! Exit status: 0 when every row passed, 1 when any row failed, 2 when the
//! run could not start (missing data file, bad configuration, no Playwright).

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tracing::warn;
use tracing_subscriber::EnvFilter;

use loanflow_e2e::playwright::{Browser, PlaywrightLauncher};
use loanflow_e2e::{E2eError, RowSource, RunConfig, TestRunner};

mod output;

use output::{OutputFormat, RowCheck};

/// LoanFlow - data-driven loan wizard tests
#[derive(Parser)]
#[command(name = "loanflow")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Config file (defaults to ./loanflow.toml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(long, default_value = "table", global = true)]
    format: OutputFormat,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every data row through the wizard
    Run(RunArgs),

    /// Load and validate the data file without starting a browser
    Check(CheckArgs),
}

#[derive(Args)]
struct RunArgs {
    /// CSV data file
    #[arg(short, long, env = "LOANFLOW_DATA")]
    data: Option<PathBuf>,

    /// Directory for reports and screenshots
    #[arg(short, long, env = "LOANFLOW_RESULTS")]
    results: Option<PathBuf>,

    /// Rows executed at once
    #[arg(short, long, env = "LOANFLOW_WORKERS")]
    workers: Option<usize>,

    /// Browser to use (chromium, firefox, webkit)
    #[arg(long)]
    browser: Option<String>,

    /// Show the browser window
    #[arg(long)]
    headed: bool,
}

impl RunArgs {
    fn apply(self, config: &mut RunConfig) -> anyhow::Result<()> {
        if let Some(data) = self.data {
            config.data_file = data;
        }
        if let Some(results) = self.results {
            config.results_dir = results;
        }
        if let Some(workers) = self.workers {
            config.workers = workers;
        }
        if let Some(browser) = self.browser {
            config.browser.browser = browser.parse::<Browser>()?;
        }
        if self.headed {
            config.browser.headless = false;
        }
        config.validate()?;
        Ok(())
    }
}

#[derive(Args)]
struct CheckArgs {
    /// CSV data file
    #[arg(short, long, env = "LOANFLOW_DATA")]
    data: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    init_logging(cli.verbose, cli.log_json);

    match dispatch(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            output::print_error(&format!("{:#}", e));
            ExitCode::from(error_exit_code(&e))
        }
    }
}

/// 2 when the run could not start; 1 for an error scoped to the rows.
fn error_exit_code(err: &anyhow::Error) -> u8 {
    match err.downcast_ref::<E2eError>() {
        Some(e) if !e.is_fatal() => 1,
        _ => 2,
    }
}

fn init_logging(verbose: bool, json: bool) {
    let log_level = if verbose { "debug" } else { "info" };
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level)),
        )
        .with_target(false)
        .with_writer(std::io::stderr);

    if json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

/// Returns whether every row passed.
async fn dispatch(cli: Cli) -> anyhow::Result<bool> {
    let mut config =
        RunConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;

    match cli.command {
        Commands::Run(args) => {
            args.apply(&mut config)?;
            run(config, cli.format).await
        }
        Commands::Check(args) => {
            if let Some(data) = args.data {
                config.data_file = data;
            }
            check(&config, cli.format)
        }
    }
}

async fn run(config: RunConfig, format: OutputFormat) -> anyhow::Result<bool> {
    let runner = TestRunner::new(config);

    // Rows are loaded before Playwright so a missing file fails fast.
    let rows = runner.load_rows()?;
    let launcher = PlaywrightLauncher::new(runner.config().browser.clone())?;

    let suite = runner.run_rows(&rows, &launcher).await;
    if let Err(e) = runner.write_results(&suite) {
        warn!("Failed to write suite results: {}", e);
    }

    output::print_suite(&suite, format);
    Ok(suite.success())
}

fn check(config: &RunConfig, format: OutputFormat) -> anyhow::Result<bool> {
    let source = RowSource::new(&config.data_file);
    let rows = source.load()?;
    let checks: Vec<RowCheck> = rows.iter().map(RowCheck::from_record).collect();
    let invalid = checks.iter().filter(|c| !c.valid).count();

    output::print_list(&checks, format);
    if let OutputFormat::Table = format {
        output::print_info(&format!("Checked {}", source.path().display()));
        if invalid == 0 {
            output::print_success(&format!("{} row(s) ready to run", checks.len()));
        } else {
            output::print_error(&format!("{} of {} row(s) invalid", invalid, checks.len()));
        }
    }

    Ok(invalid == 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preflight_errors_exit_with_two() {
        let missing = anyhow::Error::new(E2eError::DataFileMissing(PathBuf::from("test-data.csv")));
        assert_eq!(error_exit_code(&missing), 2);

        let config = anyhow::Error::new(E2eError::Config("workers must be at least 1".into()))
            .context("Failed to load configuration");
        assert_eq!(error_exit_code(&config), 2);

        assert_eq!(error_exit_code(&anyhow::anyhow!("no runtime")), 2);
    }

    #[test]
    fn test_row_scoped_errors_exit_with_one() {
        let err = anyhow::Error::new(E2eError::MissingField {
            row: 3,
            field: "dob".into(),
        });
        assert_eq!(error_exit_code(&err), 1);
    }

    #[test]
    fn test_run_flags_override_config() {
        let cli = Cli::parse_from([
            "loanflow", "run", "--data", "rows.csv", "--workers", "8", "--browser", "firefox",
            "--headed",
        ]);
        let mut config = RunConfig::default();
        match cli.command {
            Commands::Run(args) => args.apply(&mut config).unwrap(),
            Commands::Check(_) => panic!("expected run"),
        }
        assert_eq!(config.data_file, PathBuf::from("rows.csv"));
        assert_eq!(config.workers, 8);
        assert_eq!(config.browser.browser, Browser::Firefox);
        assert!(!config.browser.headless);
    }
}

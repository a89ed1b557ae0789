//! Run configuration

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{E2eError, E2eResult};
use crate::playwright::PlaywrightConfig;

/// Config file picked up from the working directory when none is given
pub const DEFAULT_CONFIG_FILE: &str = "loanflow.toml";

/// Configuration for a data-driven run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// CSV file with one row per scenario
    pub data_file: PathBuf,

    /// Directory for reports and screenshots
    pub results_dir: PathBuf,

    /// Maximum rows executed at once
    pub workers: usize,

    /// Total budget for one row, end to end
    pub row_timeout_ms: u64,

    pub waits: WaitBudgets,

    pub wizard: WizardConfig,

    pub browser: PlaywrightConfig,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            data_file: PathBuf::from("test-data.csv"),
            results_dir: PathBuf::from("test-results"),
            workers: 4,
            row_timeout_ms: 120_000,
            waits: WaitBudgets::default(),
            wizard: WizardConfig::default(),
            browser: PlaywrightConfig::default(),
        }
    }
}

impl RunConfig {
    /// Load from `path`, or from `loanflow.toml` in the working directory if it
    /// exists, or fall back to defaults.
    pub fn load(path: Option<&Path>) -> E2eResult<Self> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let default = Path::new(DEFAULT_CONFIG_FILE);
                if default.is_file() {
                    Self::from_file(default)?
                } else {
                    debug!("No {} found, using defaults", DEFAULT_CONFIG_FILE);
                    Self::default()
                }
            }
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> E2eResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            E2eError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(toml: &str) -> E2eResult<Self> {
        toml::from_str(toml).map_err(E2eError::from)
    }

    pub fn validate(&self) -> E2eResult<()> {
        if self.workers == 0 {
            return Err(E2eError::Config("workers must be at least 1".to_string()));
        }
        if self.row_timeout_ms == 0 {
            return Err(E2eError::Config("row_timeout_ms must be positive".to_string()));
        }
        if self.wizard.email_domain.trim().is_empty() {
            return Err(E2eError::Config("wizard.email_domain must not be empty".to_string()));
        }
        Ok(())
    }

    pub fn row_timeout(&self) -> Duration {
        Duration::from_millis(self.row_timeout_ms)
    }

    pub fn screenshot_dir(&self) -> PathBuf {
        self.results_dir.join("screenshots")
    }
}

/// Bounded waits used by the wizard scenario, in milliseconds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WaitBudgets {
    /// Any single click/fill
    pub action_ms: u64,
    /// Initial page load
    pub navigation_ms: u64,
    /// URL change after starting an application
    pub url_change_ms: u64,
    /// A field becoming visible after a page transition
    pub field_ready_ms: u64,
    /// Server-side account provisioning
    pub account_creation_ms: u64,
    /// Each confirmation indicator after submission
    pub confirmation_ms: u64,
    /// Fixed delay after "Create Account"
    pub account_settle_ms: u64,
}

impl Default for WaitBudgets {
    fn default() -> Self {
        Self {
            action_ms: 10_000,
            navigation_ms: 30_000,
            url_change_ms: 15_000,
            field_ready_ms: 15_000,
            account_creation_ms: 30_000,
            confirmation_ms: 15_000,
            account_settle_ms: 2_000,
        }
    }
}

impl WaitBudgets {
    pub fn action(&self) -> Duration {
        Duration::from_millis(self.action_ms)
    }

    pub fn navigation(&self) -> Duration {
        Duration::from_millis(self.navigation_ms)
    }

    pub fn url_change(&self) -> Duration {
        Duration::from_millis(self.url_change_ms)
    }

    pub fn field_ready(&self) -> Duration {
        Duration::from_millis(self.field_ready_ms)
    }

    pub fn account_creation(&self) -> Duration {
        Duration::from_millis(self.account_creation_ms)
    }

    pub fn confirmation(&self) -> Duration {
        Duration::from_millis(self.confirmation_ms)
    }

    pub fn account_settle(&self) -> Duration {
        Duration::from_millis(self.account_settle_ms)
    }
}

/// Values the wizard needs that do not come from the data file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WizardConfig {
    pub email_prefix: String,
    pub email_domain: String,
    pub reference_prefix: String,
    pub account_password: String,
}

impl Default for WizardConfig {
    fn default() -> Self {
        Self {
            email_prefix: "jt".to_string(),
            email_domain: "sf.com".to_string(),
            reference_prefix: "JT".to_string(),
            account_password: "Klopklop900-".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playwright::Browser;

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = RunConfig::from_toml(
            r#"
workers = 2
data_file = "data/rows.csv"

[waits]
confirmation_ms = 500

[browser]
browser = "firefox"
headless = false
"#,
        )
        .unwrap();

        assert_eq!(config.workers, 2);
        assert_eq!(config.data_file, PathBuf::from("data/rows.csv"));
        assert_eq!(config.results_dir, PathBuf::from("test-results"));
        assert_eq!(config.waits.confirmation(), Duration::from_millis(500));
        assert_eq!(config.waits.action_ms, 10_000);
        assert_eq!(config.browser.browser, Browser::Firefox);
        assert!(!config.browser.headless);
        assert_eq!(config.wizard.email_domain, "sf.com");
    }

    #[test]
    fn test_validate_rejects_zero_workers() {
        let config = RunConfig {
            workers: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(E2eError::Config(_))));
    }

    #[test]
    fn test_bad_toml_is_an_error() {
        assert!(RunConfig::from_toml("workers = \"many\"").is_err());
    }

    #[test]
    fn test_load_explicit_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = RunConfig::load(Some(&dir.path().join("nope.toml"))).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_screenshot_dir_is_under_results() {
        let config = RunConfig::default();
        assert_eq!(config.screenshot_dir(), PathBuf::from("test-results/screenshots"));
    }
}

//! Per-row scenario executor for the loan application wizard
//!
//! One executor drives one row through the wizard:
//!
//! ```text
//! not-started -> navigating -> form-filling(stage...) -> submitting -> verifying -> completed
//!      \______________\_______________\___________________\______________\-------> failed
//! ```
//!
//! The first unmet precondition (invalid row, missing column, element not
//! actionable in time, confirmation not shown) moves the executor to
//! `failed`. Nothing is retried here.

use std::fmt;
use std::path::PathBuf;
use std::time::Instant;

use rand::Rng;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::{RunConfig, WaitBudgets, WizardConfig};
use crate::error::{E2eError, E2eResult};
use crate::page::{Locator, Page, PageFactory, TextMatch, WaitState};
use crate::reporter::OutcomeReporter;
use crate::row::{column, RowRecord};
use crate::validate::validate_row;

/// Wizard pages, in the order they are filled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum WizardStage {
    LoanDetails,
    PersonalDetails,
    AccountCreation,
    EmploymentDetails,
    AddressDetails,
    HousingDetails,
    MaritalStatus,
    CourtOrders,
    Review,
}

impl WizardStage {
    pub const ALL: [WizardStage; 9] = [
        WizardStage::LoanDetails,
        WizardStage::PersonalDetails,
        WizardStage::AccountCreation,
        WizardStage::EmploymentDetails,
        WizardStage::AddressDetails,
        WizardStage::HousingDetails,
        WizardStage::MaritalStatus,
        WizardStage::CourtOrders,
        WizardStage::Review,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            WizardStage::LoanDetails => "loan-details",
            WizardStage::PersonalDetails => "personal-details",
            WizardStage::AccountCreation => "account-creation",
            WizardStage::EmploymentDetails => "employment-details",
            WizardStage::AddressDetails => "address-details",
            WizardStage::HousingDetails => "housing-details",
            WizardStage::MaritalStatus => "marital-status",
            WizardStage::CourtOrders => "court-orders",
            WizardStage::Review => "review",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "stage", rename_all = "kebab-case")]
pub enum ExecutorState {
    NotStarted,
    Navigating,
    FormFilling(WizardStage),
    Submitting,
    Verifying,
    Completed,
    Failed,
}

impl fmt::Display for ExecutorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutorState::NotStarted => f.write_str("not-started"),
            ExecutorState::Navigating => f.write_str("navigating"),
            ExecutorState::FormFilling(stage) => write!(f, "form-filling({})", stage.as_str()),
            ExecutorState::Submitting => f.write_str("submitting"),
            ExecutorState::Verifying => f.write_str("verifying"),
            ExecutorState::Completed => f.write_str("completed"),
            ExecutorState::Failed => f.write_str("failed"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeStatus {
    Started,
    Completed,
    Failed,
}

/// Payload handed to the reporter. Every status carries the same keys so the
/// tabular report lines up.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct OutcomeEvent<'a> {
    user: &'a str,
    row: usize,
    correlation_id: &'a str,
    status: OutcomeStatus,
    screenshot: Option<String>,
    screenshot_sha256: Option<String>,
    error: Option<String>,
}

/// Values randomized per run so the target system sees fresh accounts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntheticIdentity {
    pub email: String,
    pub employee_number: String,
}

impl SyntheticIdentity {
    pub fn generate(config: &WizardConfig) -> Self {
        let mut rng = rand::thread_rng();
        Self {
            email: format!(
                "{}{}@{}",
                config.email_prefix,
                rng.gen_range(0..100_000u32),
                config.email_domain
            ),
            employee_number: format!(
                "{}{}",
                config.reference_prefix,
                rng.gen_range(0..100_000u32)
            ),
        }
    }
}

/// Evidence captured once the confirmation page is verified
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioEvidence {
    pub screenshot: PathBuf,
    pub screenshot_sha256: Option<String>,
}

/// Verdict for one row
#[derive(Debug, Clone, Serialize)]
pub struct RowResult {
    pub row: usize,
    pub name: String,
    pub success: bool,
    pub correlation_id: String,
    pub state: ExecutorState,
    /// Where the executor was when it failed
    pub failed_during: Option<ExecutorState>,
    pub duration_ms: u64,
    pub screenshot: Option<PathBuf>,
    pub error: Option<String>,
}

/// Drives one row through the wizard against one page
pub struct ScenarioExecutor<'a> {
    record: &'a RowRecord,
    config: &'a RunConfig,
    reporter: &'a OutcomeReporter,
    identity: SyntheticIdentity,
    correlation_id: String,
    state: ExecutorState,
}

impl<'a> ScenarioExecutor<'a> {
    pub fn new(record: &'a RowRecord, config: &'a RunConfig, reporter: &'a OutcomeReporter) -> Self {
        Self {
            record,
            config,
            reporter,
            identity: SyntheticIdentity::generate(&config.wizard),
            correlation_id: Uuid::new_v4().to_string(),
            state: ExecutorState::NotStarted,
        }
    }

    /// Run the row to a terminal state, opening a page from `pages`.
    ///
    /// Never returns an error: a failure is reported to the reporter and
    /// folded into the returned [`RowResult`].
    pub async fn run<F: PageFactory + ?Sized>(mut self, pages: &F) -> RowResult {
        let start = Instant::now();
        let result = self.execute(pages).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(evidence) => {
                self.transition(ExecutorState::Completed);
                let screenshot = evidence.screenshot.to_string_lossy().into_owned();
                self.report(
                    OutcomeStatus::Completed,
                    Some(screenshot),
                    evidence.screenshot_sha256.clone(),
                    None,
                );
                info!(
                    row = self.record.index(),
                    "✓ {} ({} ms), screenshot saved: {}",
                    self.record.display_name(),
                    duration_ms,
                    evidence.screenshot.display()
                );

                RowResult {
                    row: self.record.index(),
                    name: self.record.display_name(),
                    success: true,
                    correlation_id: self.correlation_id,
                    state: ExecutorState::Completed,
                    failed_during: None,
                    duration_ms,
                    screenshot: Some(evidence.screenshot),
                    error: None,
                }
            }
            Err(e) => {
                let failed_during = self.state;
                self.transition(ExecutorState::Failed);
                self.report(OutcomeStatus::Failed, None, None, Some(e.to_string()));
                error!(
                    row = self.record.index(),
                    "✗ {} failed during {}: {}",
                    self.record.display_name(),
                    failed_during,
                    e
                );

                RowResult {
                    row: self.record.index(),
                    name: self.record.display_name(),
                    success: false,
                    correlation_id: self.correlation_id,
                    state: ExecutorState::Failed,
                    failed_during: Some(failed_during),
                    duration_ms,
                    screenshot: None,
                    error: Some(e.to_string()),
                }
            }
        }
    }

    async fn execute<F: PageFactory + ?Sized>(&mut self, pages: &F) -> E2eResult<ScenarioEvidence> {
        let row = validate_row(self.record)?;

        self.report(OutcomeStatus::Started, None, None, None);
        info!(
            row = self.record.index(),
            "Starting {} with employee reference {}, email {}",
            self.record.display_name(),
            self.identity.employee_number,
            self.identity.email
        );

        let mut page = pages.open().await?;

        let budget = self.config.row_timeout();
        let outcome = match tokio::time::timeout(budget, self.drive(page.as_mut(), row.url)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(E2eError::Timeout(format!(
                "row {} to finish within {} ms",
                self.record.index(),
                budget.as_millis()
            ))),
        };

        if let Err(e) = page.close().await {
            warn!(row = self.record.index(), "Failed to close page: {}", e);
        }

        outcome
    }

    async fn drive(&mut self, page: &mut dyn Page, url: &str) -> E2eResult<ScenarioEvidence> {
        self.transition(ExecutorState::Navigating);
        self.open_application(page, url).await?;

        for stage in WizardStage::ALL {
            self.transition(ExecutorState::FormFilling(stage));
            self.fill_stage(page, stage).await?;
        }

        self.transition(ExecutorState::Submitting);
        self.click(page, &button_with_text("Submit Application")).await?;

        self.transition(ExecutorState::Verifying);
        self.verify_confirmation(page).await?;

        self.capture_evidence(page).await
    }

    fn transition(&mut self, next: ExecutorState) {
        debug!(row = self.record.index(), "state {} -> {}", self.state, next);
        self.state = next;
    }

    fn report(
        &self,
        status: OutcomeStatus,
        screenshot: Option<String>,
        screenshot_sha256: Option<String>,
        error: Option<String>,
    ) {
        self.reporter.record(&OutcomeEvent {
            user: self.record.subject(),
            row: self.record.index(),
            correlation_id: &self.correlation_id,
            status,
            screenshot,
            screenshot_sha256,
            error,
        });
    }

    fn waits(&self) -> &WaitBudgets {
        &self.config.waits
    }

    async fn click(&self, page: &mut dyn Page, target: &Locator) -> E2eResult<()> {
        page.click(target, self.waits().action()).await
    }

    async fn check(&self, page: &mut dyn Page, target: &Locator) -> E2eResult<()> {
        page.check(target, self.waits().action()).await
    }

    async fn fill(&self, page: &mut dyn Page, target: &Locator, value: &str) -> E2eResult<()> {
        page.fill(target, value, self.waits().action()).await
    }

    /// Fill `target` with a column the row must provide.
    async fn fill_column(&self, page: &mut dyn Page, target: &Locator, col: &str) -> E2eResult<()> {
        let value = self.record.require(col)?;
        self.fill(page, target, value).await
    }

    /// Select the radio whose accessible name is exactly the column value.
    async fn choose_column(&self, page: &mut dyn Page, col: &str) -> E2eResult<()> {
        let value = self.record.require(col)?;
        self.check(page, &radio(value)).await
    }

    async fn next(&self, page: &mut dyn Page) -> E2eResult<()> {
        self.click(page, &button_with_text("Next")).await
    }

    async fn open_application(&self, page: &mut dyn Page, url: &str) -> E2eResult<()> {
        let waits = self.waits();
        page.goto(url, waits.navigation()).await?;
        self.click(page, &Locator::role("button", TextMatch::contains("Accept Cookies")))
            .await?;
        self.click(
            page,
            &Locator::css_with_text("#employerBlock button", "Apply for a Loan"),
        )
        .await?;
        page.wait_for_url(".*app-rec.*", waits.url_change()).await
    }

    async fn fill_stage(&self, page: &mut dyn Page, stage: WizardStage) -> E2eResult<()> {
        match stage {
            WizardStage::LoanDetails => self.loan_details(page).await,
            WizardStage::PersonalDetails => self.personal_details(page).await,
            WizardStage::AccountCreation => self.account_creation(page).await,
            WizardStage::EmploymentDetails => self.employment_details(page).await,
            WizardStage::AddressDetails => self.address_details(page).await,
            WizardStage::HousingDetails => self.housing_details(page).await,
            WizardStage::MaritalStatus => self.marital_status(page).await,
            WizardStage::CourtOrders => self.court_orders(page).await,
            WizardStage::Review => self.review(page).await,
        }
    }

    async fn loan_details(&self, page: &mut dyn Page) -> E2eResult<()> {
        // Placeholder reads "4,000" or "4000" depending on the build.
        let amount = Locator::css(r#"input[placeholder*="4"], input[type="number"]"#).first();
        page.wait_for(&amount, WaitState::Visible, self.waits().field_ready())
            .await?;
        self.click(page, &amount).await?;
        self.fill_column(page, &amount, column::LOAN_AMOUNT).await?;

        let reason = self.record.require(column::LOAN_REASON)?;
        self.click(
            page,
            &Locator::role("button", TextMatch::contains("select reason for loan")),
        )
        .await?;
        self.click(page, &Locator::text(TextMatch::exact(reason))).await?;
        self.click(
            page,
            &Locator::css(".v-input--selection-controls__ripple").first(),
        )
        .await?;
        self.click(page, &Locator::role("button", TextMatch::contains("button")))
            .await
    }

    async fn personal_details(&self, page: &mut dyn Page) -> E2eResult<()> {
        self.choose_column(page, column::TITLE).await?;
        self.fill_column(page, &textbox("First name"), column::FIRST_NAME)
            .await?;
        self.fill_column(page, &textbox("Last name"), column::LAST_NAME)
            .await?;
        self.fill_column(page, &textbox("DD/MM/YYYY"), column::DOB).await?;
        self.fill(page, &textbox("e.g. ABC001"), &self.identity.employee_number)
            .await?;
        self.fill_column(page, &textbox("Mobile Phone"), column::PHONE)
            .await?;
        self.next(page).await
    }

    async fn account_creation(&self, page: &mut dyn Page) -> E2eResult<()> {
        let waits = self.waits();
        let email = &self.identity.email;

        self.fill(page, &textbox("Personal email address"), email).await?;
        self.fill(page, &textbox("Confirm email"), email).await?;
        self.fill(
            page,
            &textbox("e.g Tr0ub4dor&"),
            &self.config.wizard.account_password,
        )
        .await?;
        self.next(page).await?;

        let terms = Locator::text(TextMatch::pattern("I agree to the Salary Finance"));
        page.wait_for(&terms, WaitState::Visible, waits.account_creation())
            .await?;
        self.click(page, &terms).await?;
        self.click(
            page,
            &Locator::text(TextMatch::pattern("I'm happy for Salary Finance")),
        )
        .await?;

        page.double_click(&button_with_text("Create Account"), waits.action())
            .await?;

        // The account page stays mounted while the account is provisioned.
        page.pause(waits.account_settle()).await?;
        page.wait_for(
            &textbox("Job Title"),
            WaitState::Visible,
            waits.account_creation(),
        )
        .await
    }

    async fn employment_details(&self, page: &mut dyn Page) -> E2eResult<()> {
        self.choose_column(page, column::EMPLOYMENT_STATUS).await?;
        self.fill_column(page, &textbox("Job Title"), column::JOB_TITLE)
            .await?;
        self.fill_column(page, &textbox("MM/YYYY"), column::EMPLOYMENT_START_DATE)
            .await?;

        self.fill_column(
            page,
            &Locator::css("#input-291, #input-290"),
            column::GROSS_ANNUAL_INCOME,
        )
        .await?;
        self.fill_column(
            page,
            &Locator::css("#input-295, #input-294"),
            column::NET_MONTHLY_INCOME,
        )
        .await?;
        self.fill_column(
            page,
            &Locator::css("#input-299, #input-298"),
            column::OTHER_INCOME,
        )
        .await?;

        let consent = Locator::role("checkbox", TextMatch::pattern("happy for"));
        page.wait_for(&consent, WaitState::Visible, self.waits().field_ready())
            .await?;
        self.check(page, &consent).await?;
        self.click(page, &Locator::role("button", TextMatch::contains("button")))
            .await
    }

    async fn address_details(&self, page: &mut dyn Page) -> E2eResult<()> {
        self.fill_column(page, &textbox("Postcode"), column::POSTCODE)
            .await?;
        self.click(page, &Locator::css("#address-btn")).await?;

        let picker = Locator::role("button", TextMatch::pattern("select your address"));
        page.wait_for(&picker, WaitState::Visible, self.waits().field_ready())
            .await?;
        self.click(page, &picker).await?;

        let address = self.record.require(column::SELECTED_ADDRESS)?;
        self.click(page, &Locator::text(TextMatch::contains(address)))
            .await?;
        self.fill_column(page, &textbox("MM/YYYY"), column::MOVE_IN_DATE)
            .await?;
        self.next(page).await
    }

    async fn housing_details(&self, page: &mut dyn Page) -> E2eResult<()> {
        self.choose_column(page, column::HOUSING_STATUS).await?;

        // Only owners are asked for a mortgage share.
        if let Some(amount) = self.record.non_empty(column::MORTGAGE_AMOUNT) {
            self.fill(
                page,
                &Locator::role("spinbutton", TextMatch::contains("How much is your share of the")),
                amount,
            )
            .await?;
        }
        self.next(page).await
    }

    async fn marital_status(&self, page: &mut dyn Page) -> E2eResult<()> {
        self.choose_column(page, column::MARITAL_STATUS).await?;
        self.choose_column(page, column::DEPENDENTS).await?;
        self.next(page).await
    }

    async fn court_orders(&self, page: &mut dyn Page) -> E2eResult<()> {
        let answer = self.record.non_empty(column::COURT_ORDERS).unwrap_or("No");
        self.check(page, &radio(answer)).await?;
        self.next(page).await
    }

    async fn review(&self, page: &mut dyn Page) -> E2eResult<()> {
        self.click(page, &button_with_text("Continue")).await?;
        self.check(
            page,
            &Locator::role("checkbox", TextMatch::pattern("happy for my employer to")),
        )
        .await?;
        self.click(page, &button_with_text("Continue")).await
    }

    async fn verify_confirmation(&self, page: &mut dyn Page) -> E2eResult<()> {
        let budget = self.waits().confirmation();
        for indicator in confirmation_indicators() {
            page.wait_for(&indicator, WaitState::Visible, budget)
                .await
                .map_err(|e| {
                    E2eError::PostCondition(format!(
                        "confirmation indicator {} not visible: {}",
                        indicator, e
                    ))
                })?;
        }
        Ok(())
    }

    async fn capture_evidence(&self, page: &mut dyn Page) -> E2eResult<ScenarioEvidence> {
        let dir = self.config.screenshot_dir();
        tokio::fs::create_dir_all(&dir).await?;

        let path = dir.join(format!("row-{}.png", self.record.index()));
        page.screenshot(&path, true).await?;

        let screenshot_sha256 = match tokio::fs::read(&path).await {
            Ok(bytes) => Some(hex::encode(Sha256::digest(&bytes))),
            Err(e) => {
                warn!(
                    row = self.record.index(),
                    "Could not hash screenshot {}: {}",
                    path.display(),
                    e
                );
                None
            }
        };

        Ok(ScenarioEvidence {
            screenshot: path,
            screenshot_sha256,
        })
    }
}

/// Elements that must all be visible once the application is submitted
pub fn confirmation_indicators() -> Vec<Locator> {
    vec![
        Locator::role("heading", TextMatch::contains("Your application is being")),
        Locator::text(TextMatch::contains("We will be in touch with you")),
        Locator::text(TextMatch::contains("Please check your junk mail")),
    ]
}

fn textbox(name: &str) -> Locator {
    Locator::role("textbox", TextMatch::contains(name))
}

fn radio(name: &str) -> Locator {
    Locator::role("radio", TextMatch::exact(name))
}

fn button_with_text(text: &str) -> Locator {
    Locator::css_with_text("button", text)
}

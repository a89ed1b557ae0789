//! Row records parsed from the tabular data file

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use crate::error::{E2eError, E2eResult};

/// Column names understood by the wizard scenario.
pub mod column {
    pub const TEST_NAME: &str = "testName";
    pub const URL: &str = "url";
    pub const LOAN_AMOUNT: &str = "loanAmount";
    pub const LOAN_REASON: &str = "loanReason";
    pub const TITLE: &str = "title";
    pub const FIRST_NAME: &str = "firstName";
    pub const LAST_NAME: &str = "lastName";
    pub const DOB: &str = "dob";
    pub const PHONE: &str = "phone";
    pub const EMPLOYMENT_STATUS: &str = "employmentStatus";
    pub const JOB_TITLE: &str = "jobTitle";
    pub const EMPLOYMENT_START_DATE: &str = "employmentStartDate";
    pub const GROSS_ANNUAL_INCOME: &str = "grossAnnualIncome";
    pub const NET_MONTHLY_INCOME: &str = "netMonthlyIncome";
    pub const OTHER_INCOME: &str = "otherIncome";
    pub const POSTCODE: &str = "postcode";
    pub const SELECTED_ADDRESS: &str = "selectedAddress";
    pub const MOVE_IN_DATE: &str = "moveInDate";
    pub const HOUSING_STATUS: &str = "housingStatus";
    pub const MORTGAGE_AMOUNT: &str = "mortgageAmount";
    pub const MARITAL_STATUS: &str = "maritalStatus";
    pub const DEPENDENTS: &str = "dependents";
    pub const COURT_ORDERS: &str = "courtOrders";
}

/// One data line of the input file, keyed by column name.
///
/// Cells that were missing from a short line are simply absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowRecord {
    index: usize,
    fields: BTreeMap<String, String>,
}

impl RowRecord {
    /// `index` is 1-based, counted over data lines only.
    pub fn new(index: usize, fields: BTreeMap<String, String>) -> Self {
        Self { index, fields }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn get(&self, column: &str) -> Option<&str> {
        self.fields.get(column).map(String::as_str)
    }

    /// Value of a column, treating blank cells as absent.
    pub fn non_empty(&self, column: &str) -> Option<&str> {
        self.get(column).filter(|v| !v.is_empty())
    }

    /// Value a wizard stage cannot proceed without.
    pub fn require(&self, column: &str) -> E2eResult<&str> {
        self.non_empty(column).ok_or_else(|| E2eError::MissingField {
            row: self.index,
            field: column.to_string(),
        })
    }

    pub fn fields(&self) -> &BTreeMap<String, String> {
        &self.fields
    }

    /// Label used in test names and outcome payloads.
    pub fn subject(&self) -> &str {
        self.non_empty(column::FIRST_NAME).unwrap_or("User")
    }

    pub fn display_name(&self) -> String {
        format!("Row {}: Happy Path - {}", self.index, self.subject())
    }
}

impl fmt::Display for RowRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match serde_json::to_string(&self.fields) {
            Ok(json) => f.write_str(&json),
            Err(_) => write!(f, "{:?}", self.fields),
        }
    }
}

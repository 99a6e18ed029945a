//! Microbiology test models.

use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Outcome of a microbiology test.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TestResult {
    Positive,
    Negative,
}

impl TestResult {
    /// Stored string form.
    pub fn as_str(&self) -> &'static str {
        match self {
            TestResult::Positive => "positive",
            TestResult::Negative => "negative",
        }
    }
}

impl fmt::Display for TestResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TestResult {
    type Err = String;

    /// Case-insensitive, surrounding whitespace ignored.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "positive" => Ok(TestResult::Positive),
            "negative" => Ok(TestResult::Negative),
            other => Err(format!("Unknown test result: {}", other)),
        }
    }
}

/// One microbiology test outcome for one patient.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TestRecord {
    /// Source test identifier
    pub test_id: String,
    /// Patient identifier (`P<digits>`)
    pub patient_id: String,
    /// Organism / infection label (e.g., "CRE", "MRSA")
    pub infection: String,
    /// Specimen collection time
    pub collection_date: NaiveDateTime,
    /// Test outcome
    pub result: TestResult,
}

impl TestRecord {
    /// Whether this test participates in cluster detection.
    pub fn is_positive(&self) -> bool {
        self.result == TestResult::Positive
    }

    /// Calendar date of collection (used for all reported dates).
    pub fn collection_day(&self) -> NaiveDate {
        self.collection_date.date()
    }
}

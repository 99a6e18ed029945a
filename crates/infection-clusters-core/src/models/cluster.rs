//! Cluster models for both detection strategies.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Patients believed to share a transmission chain for one infection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Cluster {
    /// Infection label
    pub infection: String,
    /// Member patient IDs, deduplicated and sorted ascending (at least two)
    pub patients: Vec<String>,
    /// Earliest member collection date at last extension
    pub start_date: NaiveDate,
    /// Latest member collection date at last extension
    pub end_date: NaiveDate,
}

impl Cluster {
    /// Number of member patients.
    pub fn size(&self) -> usize {
        self.patients.len()
    }

    /// Whether `patient_id` is a member.
    pub fn contains(&self, patient_id: &str) -> bool {
        self.patients
            .binary_search_by(|p| p.as_str().cmp(patient_id))
            .is_ok()
    }
}

/// Clusters keyed by infection. Every infection with positive tests is present,
/// possibly with an empty list.
pub type ClusterMap = BTreeMap<String, Vec<Cluster>>;

/// Location-level aggregate produced by the relational strategy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LocationClusterSummary {
    /// Ward or unit name (exactly one row per location)
    pub location: String,
    /// Distinct patients taking part in at least one linked contact
    pub cluster_size: u32,
    /// Earliest infection date among linked contacts
    pub cluster_start: NaiveDate,
    /// Latest infection date among linked contacts
    pub cluster_end: NaiveDate,
    /// `cluster_end - cluster_start + 1`
    pub cluster_duration_days: i64,
    /// Mean day-gap between paired infections, one decimal
    pub avg_days_between_infections: f64,
}

/// Parameters for the location-level strategy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LocationClusterQuery {
    /// Target infection
    pub infection: String,
    /// Maximum day-gap between two infection dates
    pub contact_window_days: i64,
    /// Minimum distinct patients per reported location
    pub min_cluster_size: u32,
}

impl LocationClusterQuery {
    /// Query with the default 14-day window and minimum size of two.
    pub fn new(infection: impl Into<String>) -> Self {
        Self {
            infection: infection.into(),
            contact_window_days: 14,
            min_cluster_size: 2,
        }
    }
}

/// Round to one decimal place, half away from zero.
pub fn round_one_decimal(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

//! Aggregate and timeline models.

use std::collections::BTreeMap;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Raw table counts supplied by a record store.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RecordCounts {
    /// All stay rows
    pub total_stays: u64,
    /// All test rows
    pub total_tests: u64,
    /// Test rows with a positive result
    pub positive_tests: u64,
    /// Distinct patients seen in stays
    pub unique_patients: u64,
    /// Distinct stay locations
    pub unique_locations: u64,
}

impl RecordCounts {
    /// Whether both stays and tests have been loaded.
    pub fn has_data(&self) -> bool {
        self.total_stays > 0 && self.total_tests > 0
    }
}

/// Dashboard statistics over the stored data and freshly detected clusters.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatisticsSummary {
    pub total_stays: u64,
    pub total_tests: u64,
    pub positive_tests: u64,
    pub unique_patients: u64,
    pub unique_locations: u64,
    /// Sum of cluster counts across infections
    pub total_clusters: u64,
    /// Infection → number of clusters
    pub clusters_by_infection: BTreeMap<String, u64>,
}

/// A positive test joined to one of the same patient's stays.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PositiveCase {
    pub patient_id: String,
    pub infection: String,
    /// Calendar date of collection
    pub infection_date: NaiveDate,
    pub location: String,
    pub ward_in_time: NaiveDateTime,
    pub ward_out_time: NaiveDateTime,
    /// Infection date falls within the stay's calendar dates
    pub infection_during_stay: bool,
}

/// Optional filters over positive cases.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CaseFilter {
    pub infection: Option<String>,
    /// Inclusive lower bound on infection date
    pub start_date: Option<NaiveDate>,
    /// Inclusive upper bound on infection date
    pub end_date: Option<NaiveDate>,
}

/// Per-location infection burden.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LocationInfectionStats {
    pub location: String,
    /// Distinct patients with a stay at the location
    pub total_patients: u64,
    /// Distinct patients with a positive test taken during a stay there
    pub positive_cases: u64,
    /// `positive_cases / total_patients * 100`, one decimal
    pub infection_rate: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_has_data_requires_both_tables() {
        let mut counts = RecordCounts::default();
        assert!(!counts.has_data());
        counts.total_stays = 3;
        assert!(!counts.has_data());
        counts.total_tests = 1;
        assert!(counts.has_data());
    }
}

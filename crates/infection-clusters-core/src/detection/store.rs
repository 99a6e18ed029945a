//! Record store seams consumed by the detector.

use std::collections::{BTreeSet, HashMap};

use thiserror::Error;

use super::location::summarize_locations;
use crate::db::{Database, DbError};
use crate::models::{
    LocationClusterQuery, LocationClusterSummary, RecordCounts, StayRecord, TestRecord,
};

/// Failures surfaced by a record store.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Record store unavailable: {0}")]
    Unavailable(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Read access to stays and tests.
pub trait RecordStore {
    /// Positive tests, optionally restricted to one infection, in a stable
    /// order (collection time, then test ID).
    fn fetch_positive_tests(&self, infection: Option<&str>) -> StoreResult<Vec<TestRecord>>;

    /// Stay histories for the given patients. Patients without stays may be
    /// absent from the map.
    fn fetch_stays(
        &self,
        patient_ids: &BTreeSet<String>,
    ) -> StoreResult<HashMap<String, Vec<StayRecord>>>;

    /// Table-level counts.
    fn record_counts(&self) -> StoreResult<RecordCounts>;
}

/// Stores able to answer the location-level cluster query.
pub trait LocationClusterSource {
    fn execute_relational_cluster_query(
        &self,
        query: &LocationClusterQuery,
    ) -> StoreResult<Vec<LocationClusterSummary>>;
}

impl RecordStore for Database {
    fn fetch_positive_tests(&self, infection: Option<&str>) -> StoreResult<Vec<TestRecord>> {
        Ok(self.positive_tests(infection)?)
    }

    fn fetch_stays(
        &self,
        patient_ids: &BTreeSet<String>,
    ) -> StoreResult<HashMap<String, Vec<StayRecord>>> {
        Ok(self.stays_for_patients(patient_ids)?)
    }

    fn record_counts(&self) -> StoreResult<RecordCounts> {
        Ok(Database::record_counts(self)?)
    }
}

impl LocationClusterSource for Database {
    fn execute_relational_cluster_query(
        &self,
        query: &LocationClusterQuery,
    ) -> StoreResult<Vec<LocationClusterSummary>> {
        Ok(self.location_clusters(query)?)
    }
}

/// Fully loaded records held in memory.
#[derive(Debug, Clone, Default)]
pub struct RecordSnapshot {
    stays: Vec<StayRecord>,
    tests: Vec<TestRecord>,
}

impl RecordSnapshot {
    pub fn new(stays: Vec<StayRecord>, mut tests: Vec<TestRecord>) -> Self {
        tests.sort_by(|a, b| {
            a.collection_date
                .cmp(&b.collection_date)
                .then_with(|| a.test_id.cmp(&b.test_id))
        });
        Self { stays, tests }
    }

    /// Copy everything out of a database.
    pub fn load(db: &Database) -> StoreResult<Self> {
        Ok(Self::new(db.list_stays()?, db.list_tests()?))
    }

    pub fn stays(&self) -> &[StayRecord] {
        &self.stays
    }

    pub fn tests(&self) -> &[TestRecord] {
        &self.tests
    }
}

impl RecordStore for RecordSnapshot {
    fn fetch_positive_tests(&self, infection: Option<&str>) -> StoreResult<Vec<TestRecord>> {
        Ok(self
            .tests
            .iter()
            .filter(|t| t.is_positive())
            .filter(|t| infection.map_or(true, |i| t.infection == i))
            .cloned()
            .collect())
    }

    fn fetch_stays(
        &self,
        patient_ids: &BTreeSet<String>,
    ) -> StoreResult<HashMap<String, Vec<StayRecord>>> {
        let mut by_patient: HashMap<String, Vec<StayRecord>> = HashMap::new();
        for stay in self.stays.iter().filter(|s| patient_ids.contains(&s.patient_id)) {
            by_patient
                .entry(stay.patient_id.clone())
                .or_default()
                .push(stay.clone());
        }
        Ok(by_patient)
    }

    fn record_counts(&self) -> StoreResult<RecordCounts> {
        let patients: BTreeSet<&str> = self.stays.iter().map(|s| s.patient_id.as_str()).collect();
        let locations: BTreeSet<&str> = self.stays.iter().map(|s| s.location.as_str()).collect();

        Ok(RecordCounts {
            total_stays: self.stays.len() as u64,
            total_tests: self.tests.len() as u64,
            positive_tests: self.tests.iter().filter(|t| t.is_positive()).count() as u64,
            unique_patients: patients.len() as u64,
            unique_locations: locations.len() as u64,
        })
    }
}

impl LocationClusterSource for RecordSnapshot {
    fn execute_relational_cluster_query(
        &self,
        query: &LocationClusterQuery,
    ) -> StoreResult<Vec<LocationClusterSummary>> {
        Ok(summarize_locations(&self.tests, &self.stays, query))
    }
}

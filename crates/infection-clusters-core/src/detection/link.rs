//! Pairwise link predicate between two positive tests.
//!
//! Two tests link when they belong to different patients, their collection
//! dates fall within the time window, and (optionally) the two patients had
//! overlapping stays in a shared location.

use std::collections::HashMap;

use chrono::NaiveDateTime;

use crate::config::LinkParams;
use crate::models::{intervals_overlap, StayRecord, TestRecord};

/// Whole days between two timestamps, truncated toward zero, always >= 0.
pub fn days_between(a: NaiveDateTime, b: NaiveDateTime) -> i64 {
    (a - b).num_days().abs()
}

/// Link predicate evaluated directly over two stay histories.
///
/// Cross product of the two histories. Kept as the reference form of the
/// predicate; [`StayIndex::links`] must agree with it.
pub fn is_linked(
    t1: &TestRecord,
    t2: &TestRecord,
    stays1: &[StayRecord],
    stays2: &[StayRecord],
    params: &LinkParams,
) -> bool {
    if t1.patient_id == t2.patient_id {
        return false;
    }
    if days_between(t1.collection_date, t2.collection_date) > params.time_window_days {
        return false;
    }
    if !params.require_location_overlap {
        return true;
    }
    stays1
        .iter()
        .any(|s1| stays2.iter().any(|s2| s1.overlaps(s2)))
}

type Interval = (NaiveDateTime, NaiveDateTime);

/// Stay intervals grouped by patient, then by location.
///
/// The overlap check only compares intervals that share a location instead of
/// the full cross product of both histories.
#[derive(Debug, Default)]
pub struct StayIndex {
    by_patient: HashMap<String, HashMap<String, Vec<Interval>>>,
}

impl StayIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an index from any collection of stays.
    pub fn from_stays<'a, I>(stays: I) -> Self
    where
        I: IntoIterator<Item = &'a StayRecord>,
    {
        let mut index = Self::new();
        for stay in stays {
            index.insert(stay);
        }
        index.sort();
        index
    }

    /// Build an index from per-patient stay histories.
    pub fn from_histories(histories: &HashMap<String, Vec<StayRecord>>) -> Self {
        Self::from_stays(histories.values().flatten())
    }

    fn insert(&mut self, stay: &StayRecord) {
        self.by_patient
            .entry(stay.patient_id.clone())
            .or_default()
            .entry(stay.location.clone())
            .or_default()
            .push((stay.start_time, stay.end_time));
    }

    fn sort(&mut self) {
        for locations in self.by_patient.values_mut() {
            for intervals in locations.values_mut() {
                intervals.sort();
            }
        }
    }

    /// Number of indexed patients.
    pub fn patient_count(&self) -> usize {
        self.by_patient.len()
    }

    /// Whether two patients were ever in the same location at the same time.
    /// A patient with no stays never overlaps.
    pub fn share_location(&self, p1: &str, p2: &str) -> bool {
        let (Some(a), Some(b)) = (self.by_patient.get(p1), self.by_patient.get(p2)) else {
            return false;
        };

        // Walk the patient with fewer locations
        let (small, large) = if a.len() <= b.len() { (a, b) } else { (b, a) };

        small.iter().any(|(location, intervals)| {
            large
                .get(location)
                .is_some_and(|others| any_interval_overlap(intervals, others))
        })
    }

    /// Link predicate using the index for the location check.
    pub fn links(&self, t1: &TestRecord, t2: &TestRecord, params: &LinkParams) -> bool {
        if t1.patient_id == t2.patient_id {
            return false;
        }
        if days_between(t1.collection_date, t2.collection_date) > params.time_window_days {
            return false;
        }
        !params.require_location_overlap || self.share_location(&t1.patient_id, &t2.patient_id)
    }
}

/// Sweep two start-sorted interval lists for any intersection.
fn any_interval_overlap(a: &[Interval], b: &[Interval]) -> bool {
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        if intervals_overlap(a[i], b[j]) {
            return true;
        }
        // Advance whichever interval ends first; it cannot meet anything later
        if a[i].1 < b[j].1 {
            i += 1;
        } else {
            j += 1;
        }
    }
    false
}

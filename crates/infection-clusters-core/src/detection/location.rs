//! In-memory form of the location-level cluster query.
//!
//! Mirrors `Database::location_clusters` for stores that are not backed by
//! SQLite, so both stores answer the same question the same way.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{NaiveDate, NaiveDateTime};

use crate::models::{
    intervals_overlap, round_one_decimal, LocationClusterQuery, LocationClusterSummary,
    StayRecord, TestRecord,
};

/// A positive test taken during one of the patient's stays.
struct StayCase<'a> {
    patient_id: &'a str,
    infection_date: NaiveDate,
    ward_in: NaiveDateTime,
    ward_out: NaiveDateTime,
}

#[derive(Default)]
struct LocationAccumulator<'a> {
    patients: BTreeSet<&'a str>,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
    gap_total: i64,
    contacts: u64,
}

impl<'a> LocationAccumulator<'a> {
    fn add_contact(&mut self, a: &StayCase<'a>, b: &StayCase<'a>, gap: i64) {
        self.patients.insert(a.patient_id);
        self.patients.insert(b.patient_id);
        let lo = a.infection_date.min(b.infection_date);
        let hi = a.infection_date.max(b.infection_date);
        self.start = Some(self.start.map_or(lo, |s| s.min(lo)));
        self.end = Some(self.end.map_or(hi, |e| e.max(hi)));
        self.gap_total += gap;
        self.contacts += 1;
    }
}

/// Location summaries for one infection, ordered by size then most recent
/// start.
pub fn summarize_locations(
    tests: &[TestRecord],
    stays: &[StayRecord],
    query: &LocationClusterQuery,
) -> Vec<LocationClusterSummary> {
    let mut cases_by_location: BTreeMap<&str, Vec<StayCase<'_>>> = BTreeMap::new();

    for test in tests
        .iter()
        .filter(|t| t.is_positive() && t.infection == query.infection)
    {
        let day = test.collection_day();
        for stay in stays.iter().filter(|s| s.patient_id == test.patient_id) {
            if stay.start_time.date() <= day && day <= stay.end_time.date() {
                cases_by_location
                    .entry(stay.location.as_str())
                    .or_default()
                    .push(StayCase {
                        patient_id: &test.patient_id,
                        infection_date: day,
                        ward_in: stay.start_time,
                        ward_out: stay.end_time,
                    });
            }
        }
    }

    let mut summaries = Vec::new();
    for (location, cases) in &cases_by_location {
        let mut acc = LocationAccumulator::default();

        // Ordered pairs, matching the self-join
        for a in cases {
            for b in cases {
                if a.patient_id == b.patient_id {
                    continue;
                }
                if !intervals_overlap((a.ward_in, a.ward_out), (b.ward_in, b.ward_out)) {
                    continue;
                }
                let gap = (a.infection_date - b.infection_date).num_days().abs();
                if gap <= query.contact_window_days {
                    acc.add_contact(a, b, gap);
                }
            }
        }

        let size = acc.patients.len() as u32;
        let (Some(start), Some(end)) = (acc.start, acc.end) else {
            continue;
        };
        if size < query.min_cluster_size {
            continue;
        }

        summaries.push(LocationClusterSummary {
            location: location.to_string(),
            cluster_size: size,
            cluster_start: start,
            cluster_end: end,
            cluster_duration_days: (end - start).num_days() + 1,
            avg_days_between_infections: round_one_decimal(
                acc.gap_total as f64 / acc.contacts as f64,
            ),
        });
    }

    summaries.sort_by(|a, b| {
        b.cluster_size
            .cmp(&a.cluster_size)
            .then_with(|| b.cluster_start.cmp(&a.cluster_start))
            .then_with(|| a.location.cmp(&b.location))
    });
    summaries
}

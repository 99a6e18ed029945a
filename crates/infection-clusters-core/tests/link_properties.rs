//! Property tests for the link predicate and the merge strategies.

use std::collections::{BTreeSet, HashMap};

use chrono::{Duration, NaiveDate, NaiveDateTime};
use infection_clusters_core::detection::{is_linked, ClusterDetector, RecordSnapshot, StayIndex};
use infection_clusters_core::models::{
    Cluster, LocationClusterQuery, StayRecord, TestRecord, TestResult,
};
use infection_clusters_core::{Database, DetectionConfig, LinkParams, MergeStrategy};
use proptest::prelude::*;
use proptest::test_runner::Config;

const LOCATIONS: [&str; 3] = ["ICU", "Ward 3", "Ward 5"];
const INFECTIONS: [&str; 2] = ["CRE", "MRSA"];

fn at(day: u32, hour: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 1, 1)
        .unwrap()
        .and_hms_opt(hour, 0, 0)
        .unwrap()
        + Duration::days(i64::from(day))
}

fn patient(n: usize) -> String {
    format!("P{}", n + 1)
}

type RawStay = (usize, usize, u32, u32, u32, u32);
type RawTest = (usize, usize, u32, u32, bool);

fn raw_stays() -> impl Strategy<Value = Vec<RawStay>> {
    prop::collection::vec((0usize..5, 0usize..3, 0u32..30, 0u32..24, 0u32..8, 0u32..24), 0..12)
}

fn raw_tests() -> impl Strategy<Value = Vec<RawTest>> {
    prop::collection::vec(
        (0usize..5, 0usize..2, 0u32..40, 0u32..24, prop::bool::weighted(0.85)),
        0..10,
    )
}

fn build_stays(raw: &[RawStay]) -> Vec<StayRecord> {
    raw.iter()
        .enumerate()
        .map(|(i, &(p, loc, day, hour, len_days, len_hours))| {
            let start = at(day, hour);
            let end = start + Duration::days(i64::from(len_days)) + Duration::hours(i64::from(len_hours));
            StayRecord::new(format!("T{:03}", i), patient(p), LOCATIONS[loc], start, end).unwrap()
        })
        .collect()
}

fn build_tests(raw: &[RawTest]) -> Vec<TestRecord> {
    raw.iter()
        .enumerate()
        .map(|(i, &(p, inf, day, hour, positive))| TestRecord {
            test_id: format!("M{:03}", i),
            patient_id: patient(p),
            infection: INFECTIONS[inf].to_string(),
            collection_date: at(day, hour),
            result: if positive {
                TestResult::Positive
            } else {
                TestResult::Negative
            },
        })
        .collect()
}

fn histories(stays: &[StayRecord]) -> HashMap<String, Vec<StayRecord>> {
    let mut map: HashMap<String, Vec<StayRecord>> = HashMap::new();
    for stay in stays {
        map.entry(stay.patient_id.clone()).or_default().push(stay.clone());
    }
    map
}

fn detect(
    snapshot: &RecordSnapshot,
    merge_strategy: MergeStrategy,
    window: i64,
    overlap: bool,
) -> infection_clusters_core::models::ClusterMap {
    let config = DetectionConfig {
        merge_strategy,
        ..Default::default()
    };
    ClusterDetector::with_config(snapshot, config)
        .detect_clusters(window, overlap)
        .unwrap()
}

fn member_sets(clusters: &[Cluster]) -> Vec<BTreeSet<&str>> {
    clusters
        .iter()
        .map(|c| c.patients.iter().map(String::as_str).collect())
        .collect()
}

fn has_shared_patient(clusters: &[Cluster]) -> bool {
    let mut seen = BTreeSet::new();
    clusters
        .iter()
        .flat_map(|c| c.patients.iter())
        .any(|p| !seen.insert(p.as_str()))
}

fn test_on(patient_n: usize, day: u32, hour: u32) -> TestRecord {
    TestRecord {
        test_id: format!("M{}", patient_n),
        patient_id: patient(patient_n),
        infection: "CRE".to_string(),
        collection_date: at(day, hour),
        result: TestResult::Positive,
    }
}

proptest! {
    #![proptest_config(Config::with_cases(128))]

    #[test]
    fn tests_beyond_window_never_link(
        stays in raw_stays(),
        window in 0i64..20,
        day in 0u32..10,
        extra in 1u32..15,
    ) {
        let stays = build_stays(&stays);
        let t1 = test_on(0, day, 9);
        let t2 = test_on(1, day + window as u32 + extra, 9);
        let params = LinkParams { time_window_days: window, require_location_overlap: false };

        let by_patient = histories(&stays);
        let empty = Vec::new();
        let s1 = by_patient.get("P1").unwrap_or(&empty);
        let s2 = by_patient.get("P2").unwrap_or(&empty);
        prop_assert!(!is_linked(&t1, &t2, s1, s2, &params));
    }

    #[test]
    fn window_boundary_is_inclusive(window in 0i64..30, day in 0u32..10, hour in 0u32..24) {
        let t1 = test_on(0, day, hour);
        let t2 = test_on(1, day + window as u32, hour);
        let params = LinkParams { time_window_days: window, require_location_overlap: false };

        prop_assert!(is_linked(&t1, &t2, &[], &[], &params));
        prop_assert!(is_linked(&t2, &t1, &[], &[], &params));
    }

    #[test]
    fn same_patient_never_links(day in 0u32..10, gap in 0u32..5) {
        let t1 = test_on(0, day, 8);
        let t2 = TestRecord { test_id: "M9".into(), ..test_on(0, day + gap, 8) };
        let params = LinkParams { time_window_days: 14, require_location_overlap: false };
        prop_assert!(!is_linked(&t1, &t2, &[], &[], &params));
    }

    #[test]
    fn indexed_predicate_matches_cross_product(
        stays in raw_stays(),
        tests in raw_tests(),
        window in 0i64..20,
        overlap in any::<bool>(),
    ) {
        let stays = build_stays(&stays);
        let tests = build_tests(&tests);
        let by_patient = histories(&stays);
        let index = StayIndex::from_histories(&by_patient);
        let params = LinkParams { time_window_days: window, require_location_overlap: overlap };
        let empty = Vec::new();

        for t1 in &tests {
            for t2 in &tests {
                let s1 = by_patient.get(&t1.patient_id).unwrap_or(&empty);
                let s2 = by_patient.get(&t2.patient_id).unwrap_or(&empty);
                prop_assert_eq!(index.links(t1, t2, &params), is_linked(t1, t2, s1, s2, &params));
            }
        }
    }

    #[test]
    fn detection_is_idempotent(stays in raw_stays(), tests in raw_tests(), window in 0i64..20) {
        let snapshot = RecordSnapshot::new(build_stays(&stays), build_tests(&tests));
        let first = detect(&snapshot, MergeStrategy::Greedy, window, true);
        let second = detect(&snapshot, MergeStrategy::Greedy, window, true);
        prop_assert_eq!(first, second);
    }

    #[test]
    fn clusters_are_well_formed(
        stays in raw_stays(),
        tests in raw_tests(),
        window in 0i64..20,
        overlap in any::<bool>(),
    ) {
        let tests = build_tests(&tests);
        let snapshot = RecordSnapshot::new(build_stays(&stays), tests.clone());

        for merge in [MergeStrategy::Greedy, MergeStrategy::ConnectedComponents] {
            for (infection, clusters) in detect(&snapshot, merge, window, overlap) {
                for cluster in clusters {
                    prop_assert_eq!(&cluster.infection, &infection);
                    prop_assert!(cluster.patients.len() >= 2);
                    prop_assert!(cluster.start_date <= cluster.end_date);
                    for p in &cluster.patients {
                        let tested_positive = tests.iter().any(|t| {
                            &t.patient_id == p && t.infection == infection && t.is_positive()
                        });
                        prop_assert!(tested_positive, "{} has no positive {} test", p, infection);
                    }
                }
            }
        }
    }

    #[test]
    fn components_never_share_a_patient(
        stays in raw_stays(),
        tests in raw_tests(),
        window in 0i64..20,
        overlap in any::<bool>(),
    ) {
        let snapshot = RecordSnapshot::new(build_stays(&stays), build_tests(&tests));
        for clusters in detect(&snapshot, MergeStrategy::ConnectedComponents, window, overlap).values() {
            prop_assert!(!has_shared_patient(clusters));
        }
    }

    #[test]
    fn greedy_refines_components(
        stays in raw_stays(),
        tests in raw_tests(),
        window in 0i64..20,
        overlap in any::<bool>(),
    ) {
        let snapshot = RecordSnapshot::new(build_stays(&stays), build_tests(&tests));
        let greedy = detect(&snapshot, MergeStrategy::Greedy, window, overlap);
        let components = detect(&snapshot, MergeStrategy::ConnectedComponents, window, overlap);

        prop_assert_eq!(greedy.keys().collect::<Vec<_>>(), components.keys().collect::<Vec<_>>());

        for (infection, greedy_clusters) in &greedy {
            let component_clusters = &components[infection];
            prop_assert!(component_clusters.len() <= greedy_clusters.len());

            // A greedy cluster grows only through pairs touching it
            let component_sets = member_sets(component_clusters);
            for members in member_sets(greedy_clusters) {
                prop_assert_eq!(
                    component_sets.iter().filter(|c| members.is_subset(c)).count(),
                    1
                );
            }

            if has_shared_patient(greedy_clusters) {
                prop_assert!(greedy_clusters.len() > component_clusters.len());
            }
        }
    }
}

proptest! {
    #![proptest_config(Config::with_cases(48))]

    #[test]
    fn sqlite_and_snapshot_location_clusters_agree(
        stays in raw_stays(),
        tests in raw_tests(),
        window in 0i64..20,
        min_size in 1u32..4,
        infection in 0usize..2,
    ) {
        let stays = build_stays(&stays);
        let tests = build_tests(&tests);

        let mut db = Database::open_in_memory().unwrap();
        db.replace_records(&stays, &tests, 7).unwrap();
        let snapshot = RecordSnapshot::new(stays, tests);

        let query = LocationClusterQuery {
            infection: INFECTIONS[infection].to_string(),
            contact_window_days: window,
            min_cluster_size: min_size,
        };
        let from_db = db.location_clusters(&query).unwrap();
        let from_snapshot = ClusterDetector::new(&snapshot)
            .find_location_clusters(&query.infection, window, min_size)
            .unwrap();

        prop_assert_eq!(from_db.len(), from_snapshot.len());
        for (a, b) in from_db.iter().zip(&from_snapshot) {
            prop_assert_eq!(&a.location, &b.location);
            prop_assert_eq!(a.cluster_size, b.cluster_size);
            prop_assert_eq!(a.cluster_start, b.cluster_start);
            prop_assert_eq!(a.cluster_end, b.cluster_end);
            prop_assert_eq!(a.cluster_duration_days, b.cluster_duration_days);
            // Rounding of exact halves may differ in the last place
            prop_assert!((a.avg_days_between_infections - b.avg_days_between_infections).abs() <= 0.1 + 1e-9);
        }
    }
}

//! Dashboard statistics.

use crate::models::{ClusterMap, RecordCounts, StatisticsSummary};

/// Combine table counts with a detection result.
pub fn summarize(counts: RecordCounts, clusters: &ClusterMap) -> StatisticsSummary {
    let clusters_by_infection: std::collections::BTreeMap<String, u64> = clusters
        .iter()
        .map(|(infection, list)| (infection.clone(), list.len() as u64))
        .collect();

    StatisticsSummary {
        total_stays: counts.total_stays,
        total_tests: counts.total_tests,
        positive_tests: counts.positive_tests,
        unique_patients: counts.unique_patients,
        unique_locations: counts.unique_locations,
        total_clusters: clusters_by_infection.values().sum(),
        clusters_by_infection,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Cluster;
    use chrono::NaiveDate;

    #[test]
    fn test_totals_sum_per_infection() {
        let d = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let cluster = |infection: &str| Cluster {
            infection: infection.into(),
            patients: vec!["P1".into(), "P2".into()],
            start_date: d,
            end_date: d,
        };
        let mut map = ClusterMap::new();
        map.insert("CRE".into(), vec![cluster("CRE"), cluster("CRE")]);
        map.insert("MRSA".into(), vec![cluster("MRSA")]);
        map.insert("VRE".into(), Vec::new());

        let counts = RecordCounts {
            total_stays: 10,
            total_tests: 8,
            positive_tests: 5,
            unique_patients: 6,
            unique_locations: 2,
        };
        let stats = summarize(counts, &map);

        assert_eq!(stats.total_clusters, 3);
        assert_eq!(stats.clusters_by_infection["CRE"], 2);
        assert_eq!(stats.clusters_by_infection["VRE"], 0);
        assert_eq!(stats.total_stays, 10);
        assert_eq!(stats.unique_locations, 2);
    }
}

//! Location-level cluster detection pushed into a single SQL statement.

use rusqlite::params;

use super::{Database, DbResult};
use crate::models::{LocationClusterQuery, LocationClusterSummary};

/// Self-join of during-stay positive cases on location, filtered to contacts
/// whose stays overlap and whose infection dates fall within the window, then
/// aggregated to one row per location.
///
/// `cluster_size` counts each patient once no matter which side of the join it
/// appeared on.
const LOCATION_CLUSTER_SQL: &str = r#"
WITH infection_contacts AS (
    SELECT
        a.patient_id AS patient_1,
        b.patient_id AS patient_2,
        a.infection_date AS infection_date_1,
        b.infection_date AS infection_date_2,
        a.location AS location,
        (a.ward_in_time <= b.ward_out_time AND b.ward_in_time <= a.ward_out_time)
            AS location_overlap,
        ABS(julianday(a.infection_date) - julianday(b.infection_date))
            AS days_between_infections
    FROM patient_infection_timeline a
    JOIN patient_infection_timeline b
        ON a.location = b.location
        AND a.patient_id != b.patient_id
        AND a.infection = b.infection
    WHERE a.infection = ?1
    AND a.infection_during_stay = 1
    AND b.infection_during_stay = 1
),
linked_contacts AS (
    SELECT *
    FROM infection_contacts
    WHERE location_overlap = 1
    AND days_between_infections <= ?2
),
cluster_members AS (
    SELECT location, patient_1 AS patient_id FROM linked_contacts
    UNION
    SELECT location, patient_2 AS patient_id FROM linked_contacts
),
cluster_sizes AS (
    SELECT location, COUNT(*) AS cluster_size
    FROM cluster_members
    GROUP BY location
),
potential_clusters AS (
    SELECT
        c.location AS location,
        s.cluster_size AS cluster_size,
        MIN(MIN(c.infection_date_1, c.infection_date_2)) AS cluster_start,
        MAX(MAX(c.infection_date_1, c.infection_date_2)) AS cluster_end,
        AVG(c.days_between_infections) AS avg_days_between
    FROM linked_contacts c
    JOIN cluster_sizes s ON s.location = c.location
    GROUP BY c.location, s.cluster_size
    HAVING s.cluster_size >= ?3
)
SELECT
    location,
    cluster_size,
    cluster_start,
    cluster_end,
    CAST(julianday(cluster_end) - julianday(cluster_start) AS INTEGER) + 1
        AS cluster_duration_days,
    ROUND(avg_days_between, 1) AS avg_days_between_infections
FROM potential_clusters
ORDER BY cluster_size DESC, cluster_start DESC, location
"#;

impl Database {
    /// Run the location-level cluster query for one infection.
    pub fn location_clusters(
        &self,
        query: &LocationClusterQuery,
    ) -> DbResult<Vec<LocationClusterSummary>> {
        let mut stmt = self.conn.prepare(LOCATION_CLUSTER_SQL)?;

        let rows = stmt.query_map(
            params![
                query.infection,
                query.contact_window_days,
                i64::from(query.min_cluster_size)
            ],
            |row| {
                Ok(LocationClusterSummary {
                    location: row.get(0)?,
                    cluster_size: row.get::<_, i64>(1)? as u32,
                    cluster_start: row.get(2)?,
                    cluster_end: row.get(3)?,
                    cluster_duration_days: row.get(4)?,
                    avg_days_between_infections: row.get(5)?,
                })
            },
        )?;

        let summaries = rows.collect::<Result<Vec<_>, _>>()?;

        tracing::debug!(
            infection = %query.infection,
            contact_window_days = query.contact_window_days,
            min_cluster_size = query.min_cluster_size,
            locations = summaries.len(),
            "Location cluster query complete"
        );

        Ok(summaries)
    }
}

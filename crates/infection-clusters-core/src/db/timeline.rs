//! Positive-case timeline queries over `patient_infection_timeline`.

use rusqlite::params;

use super::{Database, DbResult};
use crate::models::{CaseFilter, LocationInfectionStats, PositiveCase};

impl Database {
    /// Positive cases with location and timing, ordered by infection date,
    /// infection and location.
    pub fn list_positive_cases(&self, filter: &CaseFilter) -> DbResult<Vec<PositiveCase>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT patient_id, infection, infection_date, location,
                   ward_in_time, ward_out_time, infection_during_stay
            FROM patient_infection_timeline
            WHERE (?1 IS NULL OR infection = ?1)
            AND (?2 IS NULL OR infection_date >= ?2)
            AND (?3 IS NULL OR infection_date <= ?3)
            ORDER BY infection_date, infection, location, patient_id, ward_in_time
            "#,
        )?;

        let rows = stmt.query_map(
            params![filter.infection, filter.start_date, filter.end_date],
            |row| {
                Ok(PositiveCase {
                    patient_id: row.get(0)?,
                    infection: row.get(1)?,
                    infection_date: row.get(2)?,
                    location: row.get(3)?,
                    ward_in_time: row.get(4)?,
                    ward_out_time: row.get(5)?,
                    infection_during_stay: row.get(6)?,
                })
            },
        )?;

        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Per-location patient totals against patients who tested positive during
    /// a stay there. Stays count toward a date range when they intersect it.
    pub fn location_infection_stats(
        &self,
        filter: &CaseFilter,
    ) -> DbResult<Vec<LocationInfectionStats>> {
        let mut stmt = self.conn.prepare(
            r#"
            WITH positives AS (
                SELECT location, COUNT(DISTINCT patient_id) AS positive_cases
                FROM patient_infection_timeline
                WHERE infection_during_stay = 1
                AND (?1 IS NULL OR infection = ?1)
                AND (?2 IS NULL OR infection_date >= ?2)
                AND (?3 IS NULL OR infection_date <= ?3)
                GROUP BY location
            ),
            totals AS (
                SELECT location, COUNT(DISTINCT patient_id) AS total_patients
                FROM stays
                WHERE (?2 IS NULL OR date(end_time) >= ?2)
                AND (?3 IS NULL OR date(start_time) <= ?3)
                GROUP BY location
            )
            SELECT t.location,
                   t.total_patients,
                   COALESCE(p.positive_cases, 0) AS positive_cases,
                   ROUND(COALESCE(p.positive_cases, 0) * 100.0 / t.total_patients, 1)
                       AS infection_rate
            FROM totals t
            LEFT JOIN positives p ON p.location = t.location
            ORDER BY infection_rate DESC, t.location
            "#,
        )?;

        let rows = stmt.query_map(
            params![filter.infection, filter.start_date, filter.end_date],
            |row| {
                Ok(LocationInfectionStats {
                    location: row.get(0)?,
                    total_patients: row.get::<_, i64>(1)? as u64,
                    positive_cases: row.get::<_, i64>(2)? as u64,
                    infection_rate: row.get(3)?,
                })
            },
        )?;

        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }
}

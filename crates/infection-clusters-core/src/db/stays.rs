//! Stay database operations.

use std::collections::{BTreeSet, HashMap};

use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};

use super::{Database, DbResult};
use crate::models::StayRecord;

/// Patient IDs bound per `IN (...)` lookup, well under SQLite's variable limit.
const PATIENT_LOOKUP_CHUNK: usize = 500;

impl Database {
    /// Insert a single stay.
    pub fn insert_stay(&self, stay: &StayRecord) -> DbResult<()> {
        insert_stays(&self.conn, std::slice::from_ref(stay))
    }

    /// Get a stay by ID.
    pub fn get_stay(&self, stay_id: &str) -> DbResult<Option<StayRecord>> {
        self.conn
            .query_row(
                r#"
                SELECT stay_id, patient_id, location, start_time, end_time
                FROM stays
                WHERE stay_id = ?
                "#,
                [stay_id],
                stay_from_row,
            )
            .optional()
            .map_err(Into::into)
    }

    /// List all stays ordered by patient then ward-in time.
    pub fn list_stays(&self) -> DbResult<Vec<StayRecord>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT stay_id, patient_id, location, start_time, end_time
            FROM stays
            ORDER BY patient_id, start_time, stay_id
            "#,
        )?;

        let rows = stmt.query_map([], stay_from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Stay histories for the given patients, keyed by patient ID. Patients
    /// without stays are absent from the map.
    pub fn stays_for_patients(
        &self,
        patient_ids: &BTreeSet<String>,
    ) -> DbResult<HashMap<String, Vec<StayRecord>>> {
        let ids: Vec<&String> = patient_ids.iter().collect();
        let mut by_patient: HashMap<String, Vec<StayRecord>> = HashMap::new();

        for chunk in ids.chunks(PATIENT_LOOKUP_CHUNK) {
            let placeholders = vec!["?"; chunk.len()].join(", ");
            let sql = format!(
                r#"
                SELECT stay_id, patient_id, location, start_time, end_time
                FROM stays
                WHERE patient_id IN ({})
                ORDER BY patient_id, start_time, stay_id
                "#,
                placeholders
            );

            let mut stmt = self.conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(chunk.iter()), stay_from_row)?;
            for row in rows {
                let stay = row?;
                by_patient
                    .entry(stay.patient_id.clone())
                    .or_default()
                    .push(stay);
            }
        }

        Ok(by_patient)
    }
}

/// Insert stays through a cached statement (used per import batch).
pub(crate) fn insert_stays(conn: &Connection, stays: &[StayRecord]) -> DbResult<()> {
    let mut stmt = conn.prepare_cached(
        r#"
        INSERT INTO stays (stay_id, patient_id, location, start_time, end_time)
        VALUES (?1, ?2, ?3, ?4, ?5)
        "#,
    )?;

    for stay in stays {
        stmt.execute(params![
            stay.stay_id,
            stay.patient_id,
            stay.location,
            stay.start_time,
            stay.end_time,
        ])?;
    }
    Ok(())
}

fn stay_from_row(row: &Row<'_>) -> rusqlite::Result<StayRecord> {
    Ok(StayRecord {
        stay_id: row.get(0)?,
        patient_id: row.get(1)?,
        location: row.get(2)?,
        start_time: row.get(3)?,
        end_time: row.get(4)?,
    })
}

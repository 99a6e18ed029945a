//! Database layer for infection cluster detection.

mod schema;
mod stays;
mod microbiology;
mod timeline;
mod location_clusters;

pub use schema::*;
#[allow(unused_imports)]
pub use stays::*;
#[allow(unused_imports)]
pub use microbiology::*;
#[allow(unused_imports)]
pub use timeline::*;
#[allow(unused_imports)]
pub use location_clusters::*;

use rusqlite::Connection;
use std::path::Path;
use thiserror::Error;

use crate::models::{RecordCounts, StayRecord, TestRecord};

/// Database errors.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Constraint violation: {0}")]
    Constraint(String),
}

pub type DbResult<T> = Result<T, DbError>;

/// Rows written by a bulk import.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ImportSummary {
    pub stays_imported: usize,
    pub tests_imported: usize,
}

/// Database connection wrapper.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open database at path, creating if needed.
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let conn = Connection::open(path)?;
        let db = Self { conn };
        db.initialize()?;
        Ok(db)
    }

    /// Create in-memory database (for testing).
    pub fn open_in_memory() -> DbResult<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.initialize()?;
        Ok(db)
    }

    /// Initialize schema.
    fn initialize(&self) -> DbResult<()> {
        self.conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    /// Get raw connection (for advanced queries).
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Round-trip a trivial query (health check).
    pub fn ping(&self) -> DbResult<()> {
        self.conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
        Ok(())
    }

    /// Table-level counts used by statistics and the "no data" guard.
    pub fn record_counts(&self) -> DbResult<RecordCounts> {
        let count = |sql: &str| -> DbResult<u64> {
            let n: i64 = self.conn.query_row(sql, [], |row| row.get(0))?;
            Ok(n as u64)
        };

        Ok(RecordCounts {
            total_stays: count("SELECT COUNT(*) FROM stays")?,
            total_tests: count("SELECT COUNT(*) FROM microbiology")?,
            positive_tests: count("SELECT COUNT(*) FROM microbiology WHERE result = 'positive'")?,
            unique_patients: count("SELECT COUNT(DISTINCT patient_id) FROM stays")?,
            unique_locations: count("SELECT COUNT(DISTINCT location) FROM stays")?,
        })
    }

    /// Replace all stays and tests in one transaction, inserting in chunks of
    /// `batch_size`. Either every row lands or none do.
    pub fn replace_records(
        &mut self,
        stays: &[StayRecord],
        tests: &[TestRecord],
        batch_size: usize,
    ) -> DbResult<ImportSummary> {
        let batch_size = batch_size.max(1);
        let tx = self.conn.transaction()?;

        tx.execute("DELETE FROM stays", [])?;
        tx.execute("DELETE FROM microbiology", [])?;

        for (batch_no, chunk) in stays.chunks(batch_size).enumerate() {
            insert_stays(&tx, chunk)?;
            tracing::debug!(batch = batch_no, rows = chunk.len(), "Inserted stay batch");
        }
        for (batch_no, chunk) in tests.chunks(batch_size).enumerate() {
            insert_tests(&tx, chunk)?;
            tracing::debug!(batch = batch_no, rows = chunk.len(), "Inserted test batch");
        }

        tx.commit()?;

        tracing::info!(
            stays = stays.len(),
            tests = tests.len(),
            "Replaced stored records"
        );

        Ok(ImportSummary {
            stays_imported: stays.len(),
            tests_imported: tests.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TestResult;
    use chrono::NaiveDate;

    fn at(day: u32) -> chrono::NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, day)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    fn stay(id: &str, patient: &str, location: &str) -> StayRecord {
        StayRecord::new(id, patient, location, at(1), at(5)).unwrap()
    }

    fn test(id: &str, patient: &str, result: TestResult) -> TestRecord {
        TestRecord {
            test_id: id.into(),
            patient_id: patient.into(),
            infection: "CRE".into(),
            collection_date: at(2),
            result,
        }
    }

    #[test]
    fn test_open_in_memory() {
        let db = Database::open_in_memory();
        assert!(db.is_ok());
    }

    #[test]
    fn test_schema_initialized() {
        let db = Database::open_in_memory().unwrap();

        let tables: Vec<String> = db
            .conn()
            .prepare("SELECT name FROM sqlite_master WHERE type IN ('table', 'view') ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .filter_map(|r| r.ok())
            .collect();

        assert!(tables.contains(&"stays".to_string()));
        assert!(tables.contains(&"microbiology".to_string()));
        assert!(tables.contains(&"patient_infection_timeline".to_string()));
    }

    #[test]
    fn test_ping() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.ping().is_ok());
    }

    #[test]
    fn test_record_counts() {
        let mut db = Database::open_in_memory().unwrap();
        let stays = vec![
            stay("T1", "P1", "ICU"),
            stay("T2", "P1", "Ward 3"),
            stay("T3", "P2", "ICU"),
        ];
        let tests = vec![
            test("M1", "P1", TestResult::Positive),
            test("M2", "P2", TestResult::Negative),
        ];
        db.replace_records(&stays, &tests, 2).unwrap();

        let counts = db.record_counts().unwrap();
        assert_eq!(counts.total_stays, 3);
        assert_eq!(counts.total_tests, 2);
        assert_eq!(counts.positive_tests, 1);
        assert_eq!(counts.unique_patients, 2);
        assert_eq!(counts.unique_locations, 2);
    }

    #[test]
    fn test_replace_records_clears_previous_load() {
        let mut db = Database::open_in_memory().unwrap();
        db.replace_records(&[stay("T1", "P1", "ICU")], &[], 10).unwrap();
        db.replace_records(&[stay("T9", "P9", "ICU")], &[], 10).unwrap();

        let stays = db.list_stays().unwrap();
        assert_eq!(stays.len(), 1);
        assert_eq!(stays[0].stay_id, "T9");
    }

    #[test]
    fn test_replace_records_is_all_or_nothing() {
        let mut db = Database::open_in_memory().unwrap();
        db.replace_records(&[stay("T1", "P1", "ICU")], &[], 10).unwrap();

        // Second batch carries an id that violates the patient format check
        let bad = vec![
            stay("T2", "P2", "ICU"),
            stay("T3", "P3", "ICU"),
            stay("T4", "bad-id", "ICU"),
        ];
        assert!(db.replace_records(&bad, &[], 2).is_err());

        // Previous load is untouched
        let stays = db.list_stays().unwrap();
        assert_eq!(stays.len(), 1);
        assert_eq!(stays[0].stay_id, "T1");
    }
}

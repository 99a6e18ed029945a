//! Microbiology test database operations.

use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{Database, DbError, DbResult};
use crate::models::{TestRecord, TestResult};

impl Database {
    /// Insert a single test.
    pub fn insert_test(&self, test: &TestRecord) -> DbResult<()> {
        insert_tests(&self.conn, std::slice::from_ref(test))
    }

    /// Get a test by ID.
    pub fn get_test(&self, test_id: &str) -> DbResult<Option<TestRecord>> {
        self.conn
            .query_row(
                r#"
                SELECT test_id, patient_id, infection, collection_date, result
                FROM microbiology
                WHERE test_id = ?
                "#,
                [test_id],
                test_row,
            )
            .optional()?
            .map(TryInto::try_into)
            .transpose()
    }

    /// List all tests in collection order.
    pub fn list_tests(&self) -> DbResult<Vec<TestRecord>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT test_id, patient_id, infection, collection_date, result
            FROM microbiology
            ORDER BY collection_date, test_id
            "#,
        )?;

        let rows = stmt.query_map([], test_row)?;

        let mut tests = Vec::new();
        for row in rows {
            tests.push(row?.try_into()?);
        }
        Ok(tests)
    }

    /// Positive tests, optionally for one infection, in collection order.
    ///
    /// The ordering is the pair-enumeration order of the cluster assembler, so
    /// it must stay stable across calls on unchanged data.
    pub fn positive_tests(&self, infection: Option<&str>) -> DbResult<Vec<TestRecord>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT test_id, patient_id, infection, collection_date, result
            FROM microbiology
            WHERE result = 'positive'
            AND (?1 IS NULL OR infection = ?1)
            ORDER BY collection_date, test_id
            "#,
        )?;

        let rows = stmt.query_map([infection], test_row)?;

        let mut tests = Vec::new();
        for row in rows {
            tests.push(row?.try_into()?);
        }
        Ok(tests)
    }
}

/// Insert tests through a cached statement (used per import batch).
pub(crate) fn insert_tests(conn: &Connection, tests: &[TestRecord]) -> DbResult<()> {
    let mut stmt = conn.prepare_cached(
        r#"
        INSERT INTO microbiology (test_id, patient_id, collection_date, infection, result)
        VALUES (?1, ?2, ?3, ?4, ?5)
        "#,
    )?;

    for test in tests {
        stmt.execute(params![
            test.test_id,
            test.patient_id,
            test.collection_date,
            test.infection,
            test.result.as_str(),
        ])?;
    }
    Ok(())
}

/// Intermediate row struct for database mapping.
struct TestRow {
    test_id: String,
    patient_id: String,
    infection: String,
    collection_date: NaiveDateTime,
    result: String,
}

fn test_row(row: &Row<'_>) -> rusqlite::Result<TestRow> {
    Ok(TestRow {
        test_id: row.get(0)?,
        patient_id: row.get(1)?,
        infection: row.get(2)?,
        collection_date: row.get(3)?,
        result: row.get(4)?,
    })
}

impl TryFrom<TestRow> for TestRecord {
    type Error = DbError;

    fn try_from(row: TestRow) -> Result<Self, Self::Error> {
        let result: TestResult = row.result.parse().map_err(DbError::Constraint)?;

        Ok(TestRecord {
            test_id: row.test_id,
            patient_id: row.patient_id,
            infection: row.infection,
            collection_date: row.collection_date,
            result,
        })
    }
}

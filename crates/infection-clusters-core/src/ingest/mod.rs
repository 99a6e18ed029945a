//! CSV ingestion of transfers and microbiology results.
//!
//! Expected files:
//!
//! - `transfers.csv`: `transfer_id, patient_id, ward_in_time, ward_out_time, location`
//! - `microbiology.csv`: `test_id, patient_id, collection_date, infection, result`
//!
//! Column order is free and extra columns are ignored. Fields are trimmed and
//! results lower-cased. Rows with an unknown result are skipped, as are
//! repeated IDs (first occurrence wins). Any other bad row rejects the whole
//! import before the store is touched.

mod csv;
mod timestamp;

pub use self::csv::{CsvRow, CsvTable};
pub use timestamp::parse_timestamp;

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::IngestConfig;
use crate::db::{Database, DbError, ImportSummary};
use crate::models::{StayRecord, TestRecord, TestResult};

/// Ingestion errors.
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Missing required column: {0}")]
    MissingColumn(String),

    #[error("Invalid record at line {line}: {message}")]
    InvalidRecord { line: usize, message: String },

    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Database error: {0}")]
    Database(#[from] DbError),
}

pub type IngestResult<T> = Result<T, IngestError>;

const TRANSFER_COLUMNS: [&str; 5] = [
    "transfer_id",
    "patient_id",
    "ward_in_time",
    "ward_out_time",
    "location",
];

const MICROBIOLOGY_COLUMNS: [&str; 5] = [
    "test_id",
    "patient_id",
    "collection_date",
    "infection",
    "result",
];

/// Parsed rows plus what was dropped on the way.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parsed<T> {
    pub records: Vec<T>,
    /// Rows dropped because their ID was already seen
    pub duplicates: usize,
    /// Rows dropped for an unrecognised result value
    pub invalid_results: usize,
}

impl<T> Default for Parsed<T> {
    fn default() -> Self {
        Self {
            records: Vec::new(),
            duplicates: 0,
            invalid_results: 0,
        }
    }
}

/// Whether `id` has the `P<digits>` shape the store accepts.
pub fn is_valid_patient_id(id: &str) -> bool {
    id.strip_prefix('P')
        .is_some_and(|digits| !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()))
}

fn invalid(line: usize, message: impl Into<String>) -> IngestError {
    IngestError::InvalidRecord {
        line,
        message: message.into(),
    }
}

fn required<'r>(row: &'r CsvRow, index: usize, column: &str) -> IngestResult<&'r str> {
    let value = row.get(index);
    if value.is_empty() {
        return Err(invalid(row.line, format!("empty {}", column)));
    }
    Ok(value)
}

fn patient_id(row: &CsvRow, index: usize) -> IngestResult<String> {
    let value = required(row, index, "patient_id")?;
    if !is_valid_patient_id(value) {
        return Err(invalid(
            row.line,
            format!("patient_id {:?} is not of the form P<digits>", value),
        ));
    }
    Ok(value.to_string())
}

fn timestamp(row: &CsvRow, index: usize, column: &str) -> IngestResult<chrono::NaiveDateTime> {
    let value = required(row, index, column)?;
    parse_timestamp(value)
        .ok_or_else(|| invalid(row.line, format!("unparseable {} {:?}", column, value)))
}

/// Parse `transfers.csv` text into stays.
pub fn parse_transfers(text: &str) -> IngestResult<Parsed<StayRecord>> {
    let table = CsvTable::parse(text)?;
    let [id_col, patient_col, in_col, out_col, location_col] =
        table.require_columns(TRANSFER_COLUMNS)?;

    let mut seen = HashSet::new();
    let mut parsed = Parsed::default();

    for row in table.rows() {
        let stay_id = required(row, id_col, "transfer_id")?;
        if !seen.insert(stay_id.to_string()) {
            parsed.duplicates += 1;
            continue;
        }

        let patient = patient_id(row, patient_col)?;
        let location = required(row, location_col, "location")?;
        let start = timestamp(row, in_col, "ward_in_time")?;
        let end = timestamp(row, out_col, "ward_out_time")?;

        let stay = StayRecord::new(stay_id, patient, location, start, end)
            .ok_or_else(|| invalid(row.line, "ward_out_time is before ward_in_time"))?;
        parsed.records.push(stay);
    }

    if parsed.duplicates > 0 {
        tracing::warn!(duplicates = parsed.duplicates, "Skipped repeated transfer IDs");
    }
    Ok(parsed)
}

/// Parse `microbiology.csv` text into tests.
pub fn parse_microbiology(text: &str) -> IngestResult<Parsed<TestRecord>> {
    let table = CsvTable::parse(text)?;
    let [id_col, patient_col, date_col, infection_col, result_col] =
        table.require_columns(MICROBIOLOGY_COLUMNS)?;

    let mut seen = HashSet::new();
    let mut parsed = Parsed::default();

    for row in table.rows() {
        let result = match row.get(result_col).parse::<TestResult>() {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(line = row.line, value = row.get(result_col), "Skipping test with unknown result");
                parsed.invalid_results += 1;
                continue;
            }
        };

        let test_id = required(row, id_col, "test_id")?;
        if !seen.insert(test_id.to_string()) {
            parsed.duplicates += 1;
            continue;
        }

        parsed.records.push(TestRecord {
            test_id: test_id.to_string(),
            patient_id: patient_id(row, patient_col)?,
            infection: required(row, infection_col, "infection")?.to_string(),
            collection_date: timestamp(row, date_col, "collection_date")?,
            result,
        });
    }

    if parsed.invalid_results > 0 || parsed.duplicates > 0 {
        tracing::warn!(
            invalid_results = parsed.invalid_results,
            duplicates = parsed.duplicates,
            "Skipped microbiology rows"
        );
    }
    Ok(parsed)
}

/// Parse both files and replace the store contents. Nothing is written unless
/// both files parse cleanly.
pub fn import_csv(
    db: &mut Database,
    transfers_csv: &str,
    microbiology_csv: &str,
    config: &IngestConfig,
) -> IngestResult<ImportSummary> {
    let stays = parse_transfers(transfers_csv)?;
    let tests = parse_microbiology(microbiology_csv)?;

    tracing::info!(
        stays = stays.records.len(),
        tests = tests.records.len(),
        batch_size = config.batch_size,
        "Importing records"
    );

    Ok(db.replace_records(&stays.records, &tests.records, config.batch_size)?)
}

/// Read both files from disk and import them.
pub fn import_files(
    db: &mut Database,
    transfers_path: &Path,
    microbiology_path: &Path,
    config: &IngestConfig,
) -> IngestResult<ImportSummary> {
    let read = |path: &Path| {
        fs::read_to_string(path).map_err(|source| IngestError::Io {
            path: path.display().to_string(),
            source,
        })
    };

    let transfers = read(transfers_path)?;
    let microbiology = read(microbiology_path)?;
    import_csv(db, &transfers, &microbiology, config)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TRANSFERS: &str = "\
transfer_id,patient_id,ward_in_time,ward_out_time,location
T1,P1,2024-01-01 08:00:00,2024-01-12 10:00:00,ICU
T2, P2 ,2024-01-01,2024-01-12,ICU
T1,P9,2024-01-01,2024-01-02,Ward 3
";

    const MICROBIOLOGY: &str = "\
test_id,patient_id,collection_date,infection,result
M1,P1,2024-01-01,CRE,Positive
M2,P2,2024-01-10,CRE, positive
M3,P2,2024-01-11,CRE,pending
M2,P2,2024-01-12,CRE,negative
";

    #[test]
    fn test_patient_id_shape() {
        assert!(is_valid_patient_id("P1"));
        assert!(is_valid_patient_id("P0042"));
        assert!(!is_valid_patient_id("P"));
        assert!(!is_valid_patient_id("p1"));
        assert!(!is_valid_patient_id("P1a"));
        assert!(!is_valid_patient_id("Q1"));
    }

    #[test]
    fn test_parse_transfers_trims_and_dedups() {
        let parsed = parse_transfers(TRANSFERS).unwrap();
        assert_eq!(parsed.records.len(), 2);
        assert_eq!(parsed.duplicates, 1);
        assert_eq!(parsed.records[1].patient_id, "P2");
        assert_eq!(parsed.records[0].location, "ICU");
    }

    #[test]
    fn test_parse_microbiology_normalizes_results() {
        let parsed = parse_microbiology(MICROBIOLOGY).unwrap();
        assert_eq!(parsed.records.len(), 2);
        assert_eq!(parsed.invalid_results, 1);
        assert_eq!(parsed.duplicates, 1);
        assert!(parsed.records.iter().all(|t| t.result == TestResult::Positive));
    }

    #[test]
    fn test_inverted_stay_reports_line() {
        let text = "transfer_id,patient_id,ward_in_time,ward_out_time,location\n\
                    T1,P1,2024-01-05,2024-01-01,ICU\n";
        let err = parse_transfers(text).unwrap_err();
        assert!(matches!(err, IngestError::InvalidRecord { line: 2, .. }));
    }

    #[test]
    fn test_bad_patient_id_rejected() {
        let text = "test_id,patient_id,collection_date,infection,result\n\
                    M1,patient-1,2024-01-05,CRE,positive\n";
        let err = parse_microbiology(text).unwrap_err();
        assert!(matches!(err, IngestError::InvalidRecord { line: 2, .. }));
    }

    #[test]
    fn test_missing_column_rejected() {
        let err = parse_transfers("transfer_id,patient_id,location\nT1,P1,ICU\n").unwrap_err();
        assert!(matches!(err, IngestError::MissingColumn(c) if c == "ward_in_time"));
    }

    #[test]
    fn test_import_replaces_store() {
        let mut db = Database::open_in_memory().unwrap();
        let summary = import_csv(&mut db, TRANSFERS, MICROBIOLOGY, &IngestConfig::default()).unwrap();

        assert_eq!(summary.stays_imported, 2);
        assert_eq!(summary.tests_imported, 2);
        assert_eq!(db.record_counts().unwrap().positive_tests, 2);
    }

    #[test]
    fn test_failed_parse_leaves_store_untouched() {
        let mut db = Database::open_in_memory().unwrap();
        import_csv(&mut db, TRANSFERS, MICROBIOLOGY, &IngestConfig::default()).unwrap();

        let broken = "transfer_id,patient_id,ward_in_time,ward_out_time,location\n\
                      T7,P7,not a date,2024-01-02,ICU\n";
        assert!(import_csv(&mut db, broken, MICROBIOLOGY, &IngestConfig::default()).is_err());
        assert_eq!(db.record_counts().unwrap().total_stays, 2);
    }
}

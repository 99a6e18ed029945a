//! Infection Clusters Core Library
//!
//! Detects clusters of hospital-acquired infection from patient movement
//! (ward stays) and microbiology results.
//!
//! # Architecture
//!
//! ```text
//!  transfers.csv      microbiology.csv
//!        │                   │
//!        └──────► ingest ◄───┘
//!                   │  (one transaction, batched inserts)
//!                   ▼
//!          ┌─────────────────┐
//!          │  Record Store   │  SQLite `Database` or in-memory `RecordSnapshot`
//!          └────────┬────────┘
//!                   │
//!       ┌───────────┴─────────────────────────┐
//!       │                                     │
//!       ▼                                     ▼
//!  Link Predicate (per infection,       Relational Cluster Query
//!  pairwise, via StayIndex)             (per-location aggregate)
//!       │                                     │
//!       ▼                                     │
//!  Cluster Assembler                          │
//!  (greedy | connected components)            │
//!       │                                     │
//!       ├──────► Statistics                   │
//!       ▼                                     ▼
//!  ClusterReport (JSON / CSV)        LocationClusterReport
//! ```
//!
//! # Modules
//!
//! - [`db`]: SQLite store, `patient_infection_timeline` view, location query
//! - [`models`]: Domain types (StayRecord, TestRecord, Cluster, ...)
//! - [`detection`]: Store traits, link predicate, assembler, statistics
//! - [`ingest`]: CSV import
//! - [`export`]: Cluster reports
//! - [`config`]: Detection and ingestion settings

pub mod config;
pub mod db;
pub mod detection;
pub mod export;
pub mod ingest;
pub mod models;

// Re-export commonly used types
pub use config::{DetectionConfig, IngestConfig, LinkParams, MergeStrategy};
pub use db::{Database, DbError, ImportSummary};
pub use detection::{
    ClusterDetector, DetectionError, LocationClusterSource, RecordSnapshot, RecordStore,
    StoreError,
};
pub use export::{ClusterReport, LocationClusterReport, ReportExporter};
pub use models::{
    Cluster, ClusterMap, LocationClusterQuery, LocationClusterSummary, StatisticsSummary,
    StayRecord, TestRecord, TestResult,
};

// UniFFI setup - using proc macros
uniffi::setup_scaffolding!();

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Service name reported by health checks.
pub const SERVICE_NAME: &str = "infection-clusters";

// =========================================================================
// FFI Error Type
// =========================================================================

#[derive(Debug, thiserror::Error, uniffi::Error)]
pub enum InfectionClustersError {
    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("No data: {0}")]
    NoData(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl From<db::DbError> for InfectionClustersError {
    fn from(e: db::DbError) -> Self {
        InfectionClustersError::DatabaseError(e.to_string())
    }
}

impl From<serde_json::Error> for InfectionClustersError {
    fn from(e: serde_json::Error) -> Self {
        InfectionClustersError::SerializationError(e.to_string())
    }
}

impl From<detection::StoreError> for InfectionClustersError {
    fn from(e: detection::StoreError) -> Self {
        InfectionClustersError::DatabaseError(e.to_string())
    }
}

impl From<detection::DetectionError> for InfectionClustersError {
    fn from(e: detection::DetectionError) -> Self {
        match e {
            detection::DetectionError::InvalidParameter(msg) => {
                InfectionClustersError::InvalidInput(msg)
            }
            detection::DetectionError::Store(e) => e.into(),
        }
    }
}

impl From<ingest::IngestError> for InfectionClustersError {
    fn from(e: ingest::IngestError) -> Self {
        match e {
            ingest::IngestError::MissingColumn(_) | ingest::IngestError::InvalidRecord { .. } => {
                InfectionClustersError::InvalidInput(e.to_string())
            }
            other => InfectionClustersError::DatabaseError(other.to_string()),
        }
    }
}

impl From<export::ExportError> for InfectionClustersError {
    fn from(e: export::ExportError) -> Self {
        match e {
            export::ExportError::Detection(e) => e.into(),
            export::ExportError::Json(e) => e.into(),
        }
    }
}

impl<T> From<std::sync::PoisonError<T>> for InfectionClustersError {
    fn from(e: std::sync::PoisonError<T>) -> Self {
        InfectionClustersError::DatabaseError(format!("Lock poisoned: {}", e))
    }
}

// =========================================================================
// Factory Functions (exported to FFI)
// =========================================================================

/// Open or create a database at the given path.
#[uniffi::export]
pub fn open_database(path: String) -> Result<Arc<InfectionClustersCore>, InfectionClustersError> {
    let db = Database::open(&path)?;
    Ok(Arc::new(InfectionClustersCore::new(db)))
}

/// Create an in-memory database (for testing).
#[uniffi::export]
pub fn open_database_in_memory() -> Result<Arc<InfectionClustersCore>, InfectionClustersError> {
    let db = Database::open_in_memory()?;
    Ok(Arc::new(InfectionClustersCore::new(db)))
}

// =========================================================================
// Main API Object
// =========================================================================

/// Thread-safe database wrapper for FFI.
#[derive(uniffi::Object)]
pub struct InfectionClustersCore {
    db: Arc<Mutex<Database>>,
    ingest: IngestConfig,
}

impl InfectionClustersCore {
    fn new(db: Database) -> Self {
        Self {
            db: Arc::new(Mutex::new(db)),
            ingest: IngestConfig::from_env(),
        }
    }

    fn ensure_data(db: &Database) -> Result<(), InfectionClustersError> {
        if !db.record_counts()?.has_data() {
            return Err(InfectionClustersError::NoData(
                "import transfers and microbiology first".to_string(),
            ));
        }
        Ok(())
    }
}

#[uniffi::export]
impl InfectionClustersCore {
    // =========================================================================
    // Import
    // =========================================================================

    /// Replace all stored records with the contents of both CSV files.
    pub fn import_csv(
        &self,
        transfers_csv: String,
        microbiology_csv: String,
    ) -> Result<FfiImportSummary, InfectionClustersError> {
        let mut db = self.db.lock()?;
        let summary = ingest::import_csv(&mut db, &transfers_csv, &microbiology_csv, &self.ingest)?;
        Ok(summary.into())
    }

    // =========================================================================
    // Detection
    // =========================================================================

    /// Patient clusters per infection. `merge_strategy` is `greedy` or
    /// `connected-components`.
    pub fn detect_clusters(
        &self,
        time_window_days: i64,
        require_location_overlap: bool,
        merge_strategy: String,
    ) -> Result<Vec<FfiInfectionClusters>, InfectionClustersError> {
        let merge: MergeStrategy = merge_strategy
            .parse()
            .map_err(InfectionClustersError::InvalidInput)?;
        let db = self.db.lock()?;
        Self::ensure_data(&db)?;

        let config = DetectionConfig {
            time_window_days,
            require_location_overlap,
            merge_strategy: merge,
        };
        let clusters = ClusterDetector::with_config(&*db, config)
            .detect_clusters(time_window_days, require_location_overlap)?;

        Ok(clusters
            .into_iter()
            .map(|(infection, clusters)| FfiInfectionClusters {
                infection,
                clusters: clusters.into_iter().map(Into::into).collect(),
            })
            .collect())
    }

    /// Dashboard statistics with default detection settings.
    pub fn compute_statistics(&self) -> Result<FfiStatistics, InfectionClustersError> {
        let db = self.db.lock()?;
        let stats = ClusterDetector::new(&*db).compute_statistics()?;
        Ok(stats.into())
    }

    /// Location-level clusters for one infection.
    pub fn find_location_clusters(
        &self,
        infection: String,
        contact_window_days: i64,
        min_cluster_size: u32,
    ) -> Result<Vec<FfiLocationCluster>, InfectionClustersError> {
        let db = self.db.lock()?;
        let rows = ClusterDetector::new(&*db).find_location_clusters(
            &infection,
            contact_window_days,
            min_cluster_size,
        )?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    // =========================================================================
    // Export Operations
    // =========================================================================

    /// Cluster report as JSON, using default detection settings.
    pub fn export_clusters_json(&self) -> Result<String, InfectionClustersError> {
        let db = self.db.lock()?;
        Self::ensure_data(&db)?;
        let report = ReportExporter::new(&*db, DetectionConfig::default()).cluster_report()?;
        Ok(report.to_json()?)
    }

    /// Cluster report as CSV, using default detection settings.
    pub fn export_clusters_csv(&self) -> Result<String, InfectionClustersError> {
        let db = self.db.lock()?;
        Self::ensure_data(&db)?;
        let report = ReportExporter::new(&*db, DetectionConfig::default()).cluster_report()?;
        Ok(report.to_csv())
    }

    // =========================================================================
    // Health
    // =========================================================================

    /// Store connectivity. Never fails; a broken store reports `unhealthy`.
    pub fn health(&self) -> FfiHealth {
        let database = match self.db.lock() {
            Ok(db) => match db.ping() {
                Ok(()) => "connected".to_string(),
                Err(e) => format!("error: {}", e),
            },
            Err(e) => format!("error: lock poisoned: {}", e),
        };
        let status = if database == "connected" { "healthy" } else { "unhealthy" };

        FfiHealth {
            status: status.to_string(),
            database,
            service: SERVICE_NAME.to_string(),
        }
    }
}

// =========================================================================
// FFI Types
// =========================================================================

/// FFI-safe cluster.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiCluster {
    pub patients: Vec<String>,
    /// ISO-8601 date
    pub start_date: String,
    /// ISO-8601 date
    pub end_date: String,
}

impl From<Cluster> for FfiCluster {
    fn from(cluster: Cluster) -> Self {
        Self {
            patients: cluster.patients,
            start_date: cluster.start_date.to_string(),
            end_date: cluster.end_date.to_string(),
        }
    }
}

/// FFI-safe clusters for one infection.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiInfectionClusters {
    pub infection: String,
    pub clusters: Vec<FfiCluster>,
}

/// FFI-safe statistics.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiStatistics {
    pub total_stays: u64,
    pub total_tests: u64,
    pub positive_tests: u64,
    pub unique_patients: u64,
    pub unique_locations: u64,
    pub total_clusters: u64,
    pub clusters_by_infection: HashMap<String, u64>,
}

impl From<StatisticsSummary> for FfiStatistics {
    fn from(stats: StatisticsSummary) -> Self {
        Self {
            total_stays: stats.total_stays,
            total_tests: stats.total_tests,
            positive_tests: stats.positive_tests,
            unique_patients: stats.unique_patients,
            unique_locations: stats.unique_locations,
            total_clusters: stats.total_clusters,
            clusters_by_infection: stats.clusters_by_infection.into_iter().collect(),
        }
    }
}

/// FFI-safe location cluster row.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiLocationCluster {
    pub location: String,
    pub cluster_size: u32,
    pub cluster_start: String,
    pub cluster_end: String,
    pub cluster_duration_days: i64,
    pub avg_days_between_infections: f64,
}

impl From<LocationClusterSummary> for FfiLocationCluster {
    fn from(row: LocationClusterSummary) -> Self {
        Self {
            location: row.location,
            cluster_size: row.cluster_size,
            cluster_start: row.cluster_start.to_string(),
            cluster_end: row.cluster_end.to_string(),
            cluster_duration_days: row.cluster_duration_days,
            avg_days_between_infections: row.avg_days_between_infections,
        }
    }
}

/// FFI-safe import result.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiImportSummary {
    pub stays_imported: u64,
    pub tests_imported: u64,
}

impl From<ImportSummary> for FfiImportSummary {
    fn from(summary: ImportSummary) -> Self {
        Self {
            stays_imported: summary.stays_imported as u64,
            tests_imported: summary.tests_imported as u64,
        }
    }
}

/// FFI-safe health report.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiHealth {
    pub status: String,
    pub database: String,
    pub service: String,
}

//! Cluster reports for downstream consumers.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::config::DetectionConfig;
use crate::detection::{ClusterDetector, DetectionError, LocationClusterSource, RecordStore};
use crate::models::{ClusterMap, LocationClusterQuery, LocationClusterSummary};

/// Report format version.
pub const REPORT_FORMAT_VERSION: &str = "1.0";
/// Digest algorithm name recorded in report metadata.
pub const DIGEST_ALGORITHM: &str = "SHA-256";

/// Export errors.
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("Detection failed: {0}")]
    Detection(#[from] DetectionError),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type ExportResult<T> = Result<T, ExportError>;

/// Report metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportMetadata {
    /// Unique report ID
    pub report_id: String,
    /// Report format version
    pub format_version: String,
    /// Generation timestamp (RFC 3339, UTC)
    pub generated_at: String,
    /// Digest algorithm
    pub digest_algorithm: String,
    /// Hex digest of the canonical JSON of the report body
    pub content_digest: String,
}

impl ReportMetadata {
    fn new(content_digest: String) -> Self {
        Self {
            report_id: uuid::Uuid::new_v4().to_string(),
            format_version: REPORT_FORMAT_VERSION.to_string(),
            generated_at: chrono::Utc::now().to_rfc3339(),
            digest_algorithm: DIGEST_ALGORITHM.to_string(),
            content_digest,
        }
    }
}

/// Patient clusters from one detection run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterReport {
    pub metadata: ReportMetadata,
    /// Settings the clusters were computed with
    pub parameters: DetectionConfig,
    pub clusters: ClusterMap,
}

impl ClusterReport {
    /// Wrap an existing detection result.
    pub fn new(parameters: DetectionConfig, clusters: ClusterMap) -> ExportResult<Self> {
        let digest = content_digest(&clusters)?;
        Ok(Self {
            metadata: ReportMetadata::new(digest),
            parameters,
            clusters,
        })
    }

    /// Whether the clusters still match the recorded digest.
    pub fn verify_digest(&self) -> ExportResult<bool> {
        Ok(content_digest(&self.clusters)? == self.metadata.content_digest)
    }

    /// Total clusters across infections.
    pub fn total_clusters(&self) -> usize {
        self.clusters.values().map(Vec::len).sum()
    }

    /// Infection → member lists, dropping dates.
    pub fn simplified(&self) -> BTreeMap<String, Vec<Vec<String>>> {
        self.clusters
            .iter()
            .map(|(infection, clusters)| {
                (
                    infection.clone(),
                    clusters.iter().map(|c| c.patients.clone()).collect(),
                )
            })
            .collect()
    }

    /// Export to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Export to CSV, one row per cluster; patients are `;`-separated.
    pub fn to_csv(&self) -> String {
        let mut csv = String::new();

        csv.push_str("infection,cluster_index,patient_count,patients,start_date,end_date,report_id\n");

        for (infection, clusters) in &self.clusters {
            for (index, cluster) in clusters.iter().enumerate() {
                csv.push_str(&format!(
                    "{},{},{},{},{},{},{}\n",
                    escape_csv(infection),
                    index,
                    cluster.size(),
                    escape_csv(&cluster.patients.join(";")),
                    cluster.start_date,
                    cluster.end_date,
                    escape_csv(&self.metadata.report_id),
                ));
            }
        }

        csv
    }
}

/// Location summaries for one infection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocationClusterReport {
    pub metadata: ReportMetadata,
    pub query: LocationClusterQuery,
    pub locations: Vec<LocationClusterSummary>,
}

impl LocationClusterReport {
    pub fn new(
        query: LocationClusterQuery,
        locations: Vec<LocationClusterSummary>,
    ) -> ExportResult<Self> {
        let digest = content_digest(&locations)?;
        Ok(Self {
            metadata: ReportMetadata::new(digest),
            query,
            locations,
        })
    }

    /// Export to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Export to CSV.
    pub fn to_csv(&self) -> String {
        let mut csv = String::new();

        csv.push_str("infection,location,cluster_size,cluster_start,cluster_end,cluster_duration_days,avg_days_between_infections\n");

        for row in &self.locations {
            csv.push_str(&format!(
                "{},{},{},{},{},{},{:.1}\n",
                escape_csv(&self.query.infection),
                escape_csv(&row.location),
                row.cluster_size,
                row.cluster_start,
                row.cluster_end,
                row.cluster_duration_days,
                row.avg_days_between_infections,
            ));
        }

        csv
    }
}

/// Builds reports straight from a store.
pub struct ReportExporter<'a, S: ?Sized> {
    detector: ClusterDetector<'a, S>,
}

impl<'a, S: ?Sized> ReportExporter<'a, S> {
    pub fn new(store: &'a S, config: DetectionConfig) -> Self {
        Self {
            detector: ClusterDetector::with_config(store, config),
        }
    }
}

impl<S: RecordStore + ?Sized> ReportExporter<'_, S> {
    /// Run detection with the configured settings and wrap the result.
    pub fn cluster_report(&self) -> ExportResult<ClusterReport> {
        let clusters = self.detector.detect_configured()?;
        let report = ClusterReport::new(self.detector.config().clone(), clusters)?;

        tracing::info!(
            report_id = %report.metadata.report_id,
            clusters = report.total_clusters(),
            "Built cluster report"
        );

        Ok(report)
    }
}

impl<S: LocationClusterSource + ?Sized> ReportExporter<'_, S> {
    pub fn location_report(&self, query: LocationClusterQuery) -> ExportResult<LocationClusterReport> {
        let locations = self.detector.find_location_clusters(
            &query.infection,
            query.contact_window_days,
            query.min_cluster_size,
        )?;
        LocationClusterReport::new(query, locations)
    }
}

/// Hex SHA-256 of the compact JSON form. Map keys serialize in sorted order,
/// so equal content always hashes equally.
fn content_digest<T: Serialize + ?Sized>(body: &T) -> ExportResult<String> {
    let json = serde_json::to_vec(body)?;
    Ok(hex::encode(Sha256::digest(&json)))
}

/// Escape a string for CSV output.
fn escape_csv(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

//! Command handlers. Each writes its result as JSON (or CSV) to `out`.

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Args, ValueEnum};
use serde::Serialize;

use infection_clusters_core::ingest;
use infection_clusters_core::models::CaseFilter;
use infection_clusters_core::{
    ClusterDetector, ClusterReport, Database, DetectionConfig, IngestConfig, MergeStrategy,
};

use crate::Commands;

#[derive(Args, Debug)]
pub(crate) struct ImportArgs {
    /// transfers.csv (transfer_id, patient_id, ward_in_time, ward_out_time, location)
    #[arg(long)]
    pub transfers: PathBuf,

    /// microbiology.csv (test_id, patient_id, collection_date, infection, result)
    #[arg(long)]
    pub microbiology: PathBuf,

    /// Rows per insert batch
    #[arg(long, env = "INFECTION_CLUSTERS_INGEST_BATCH_SIZE")]
    pub batch_size: Option<usize>,
}

#[derive(Args, Debug)]
pub(crate) struct ClustersArgs {
    /// Maximum days between linked positive tests
    #[arg(long)]
    pub time_window: Option<i64>,

    /// Link on timing alone, ignoring shared locations
    #[arg(long)]
    pub no_location_overlap: bool,

    /// Merge strategy: greedy or connected-components
    #[arg(long)]
    pub merge: Option<MergeStrategy>,

    /// Output shape
    #[arg(long, value_enum, default_value_t = OutputFormat::Full)]
    pub format: OutputFormat,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum OutputFormat {
    /// Report with metadata, parameters and dated clusters
    Full,
    /// Infection to lists of patient IDs
    Patients,
    /// One CSV row per cluster
    Csv,
}

#[derive(Args, Debug)]
pub(crate) struct LocationClustersArgs {
    /// Infection to analyse
    #[arg(long)]
    pub infection: String,

    /// Maximum days between two infection dates
    #[arg(long, default_value_t = 14)]
    pub contact_window: i64,

    /// Minimum distinct patients per location
    #[arg(long, default_value_t = 2)]
    pub min_size: u32,

    /// Emit CSV instead of JSON
    #[arg(long)]
    pub csv: bool,
}

#[derive(Args, Debug)]
pub(crate) struct CaseArgs {
    /// Restrict to one infection
    #[arg(long)]
    pub infection: Option<String>,

    /// Earliest infection date (YYYY-MM-DD)
    #[arg(long)]
    pub from: Option<NaiveDate>,

    /// Latest infection date (YYYY-MM-DD)
    #[arg(long)]
    pub to: Option<NaiveDate>,
}

impl From<CaseArgs> for CaseFilter {
    fn from(args: CaseArgs) -> Self {
        CaseFilter {
            infection: args.infection,
            start_date: args.from,
            end_date: args.to,
        }
    }
}

#[derive(Serialize)]
struct HealthReport {
    status: &'static str,
    database: String,
    service: &'static str,
}

pub(crate) fn execute(command: Commands, db_path: &Path, out: &mut impl Write) -> Result<()> {
    match command {
        Commands::Import(args) => import(args, db_path, out),
        Commands::Clusters(args) => clusters(args, db_path, out),
        Commands::Stats => stats(db_path, out),
        Commands::LocationClusters(args) => location_clusters(args, db_path, out),
        Commands::Cases(args) => cases(args, db_path, out),
        Commands::LocationStats(args) => location_stats(args, db_path, out),
        Commands::Health => health(db_path, out),
    }
}

fn open(db_path: &Path) -> Result<Database> {
    Database::open(db_path)
        .with_context(|| format!("Failed to open database {}", db_path.display()))
}

fn write_json<T: Serialize>(out: &mut impl Write, value: &T) -> Result<()> {
    serde_json::to_writer_pretty(&mut *out, value)?;
    writeln!(out)?;
    Ok(())
}

fn import(args: ImportArgs, db_path: &Path, out: &mut impl Write) -> Result<()> {
    let mut db = open(db_path)?;
    let mut config = IngestConfig::from_env();
    if let Some(batch_size) = args.batch_size {
        config.batch_size = batch_size.max(1);
    }

    let summary = ingest::import_files(&mut db, &args.transfers, &args.microbiology, &config)
        .context("Import failed")?;
    write_json(out, &summary)
}

fn clusters(args: ClustersArgs, db_path: &Path, out: &mut impl Write) -> Result<()> {
    let db = open(db_path)?;
    if !db.record_counts()?.has_data() {
        bail!("No data found. Import transfers and microbiology files first.");
    }

    let mut config = DetectionConfig::from_env();
    if let Some(days) = args.time_window {
        config.time_window_days = days;
    }
    if args.no_location_overlap {
        config.require_location_overlap = false;
    }
    if let Some(merge) = args.merge {
        config.merge_strategy = merge;
    }

    let clusters = ClusterDetector::with_config(&db, config.clone())
        .detect_configured()
        .context("Cluster detection failed")?;
    let report = ClusterReport::new(config, clusters)?;

    match args.format {
        OutputFormat::Full => write_json(out, &report),
        OutputFormat::Patients => write_json(out, &report.simplified()),
        OutputFormat::Csv => {
            out.write_all(report.to_csv().as_bytes())?;
            Ok(())
        }
    }
}

fn stats(db_path: &Path, out: &mut impl Write) -> Result<()> {
    let db = open(db_path)?;
    let stats = ClusterDetector::with_config(&db, DetectionConfig::from_env())
        .compute_statistics()
        .context("Statistics failed")?;
    write_json(out, &stats)
}

fn location_clusters(args: LocationClustersArgs, db_path: &Path, out: &mut impl Write) -> Result<()> {
    let db = open(db_path)?;
    let rows = ClusterDetector::new(&db)
        .find_location_clusters(&args.infection, args.contact_window, args.min_size)
        .context("Location cluster query failed")?;

    if args.csv {
        let query = infection_clusters_core::LocationClusterQuery {
            infection: args.infection,
            contact_window_days: args.contact_window,
            min_cluster_size: args.min_size,
        };
        let report = infection_clusters_core::LocationClusterReport::new(query, rows)?;
        out.write_all(report.to_csv().as_bytes())?;
        return Ok(());
    }
    write_json(out, &rows)
}

fn cases(args: CaseArgs, db_path: &Path, out: &mut impl Write) -> Result<()> {
    let db = open(db_path)?;
    let cases = db.list_positive_cases(&args.into())?;
    write_json(out, &cases)
}

fn location_stats(args: CaseArgs, db_path: &Path, out: &mut impl Write) -> Result<()> {
    let db = open(db_path)?;
    let stats = db.location_infection_stats(&args.into())?;
    write_json(out, &stats)
}

fn health(db_path: &Path, out: &mut impl Write) -> Result<()> {
    let result = open(db_path).and_then(|db| db.ping().map_err(Into::into));

    let report = HealthReport {
        status: if result.is_ok() { "healthy" } else { "unhealthy" },
        database: match &result {
            Ok(()) => "connected".to_string(),
            Err(e) => format!("error: {:#}", e),
        },
        service: infection_clusters_core::SERVICE_NAME,
    };
    write_json(out, &report)?;

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const TRANSFERS: &str = "\
transfer_id,patient_id,ward_in_time,ward_out_time,location
T1,P1,2024-01-01 08:00,2024-01-12 08:00,ICU
T2,P2,2024-01-01 09:00,2024-01-12 09:00,ICU
T3,P3,2024-01-20 09:00,2024-01-25 09:00,Ward 3
";

    const MICROBIOLOGY: &str = "\
test_id,patient_id,collection_date,infection,result
M1,P1,2024-01-01,CRE,positive
M2,P2,2024-01-10,CRE,positive
M3,P3,2024-01-21,MRSA,positive
";

    fn run(command: Commands, db: &Path) -> Result<String> {
        let mut buf = Vec::new();
        execute(command, db, &mut buf)?;
        Ok(String::from_utf8(buf)?)
    }

    fn imported() -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let transfers = dir.path().join("transfers.csv");
        let microbiology = dir.path().join("microbiology.csv");
        fs::write(&transfers, TRANSFERS).unwrap();
        fs::write(&microbiology, MICROBIOLOGY).unwrap();

        let db = dir.path().join("clusters.db");
        let output = run(
            Commands::Import(ImportArgs {
                transfers,
                microbiology,
                batch_size: Some(2),
            }),
            &db,
        )
        .unwrap();
        assert!(output.contains("\"stays_imported\": 3"));
        (dir, db)
    }

    fn clusters_args(format: OutputFormat) -> ClustersArgs {
        ClustersArgs {
            time_window: None,
            no_location_overlap: false,
            merge: None,
            format,
        }
    }

    #[test]
    fn test_clusters_refuses_empty_database() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("empty.db");

        let err = run(Commands::Clusters(clusters_args(OutputFormat::Full)), &db).unwrap_err();
        assert!(err.to_string().contains("No data found"));
    }

    #[test]
    fn test_clusters_patients_format() {
        let (_dir, db) = imported();

        let output = run(Commands::Clusters(clusters_args(OutputFormat::Patients)), &db).unwrap();
        let value: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(value["CRE"], serde_json::json!([["P1", "P2"]]));
        assert_eq!(value["MRSA"], serde_json::json!([]));
    }

    #[test]
    fn test_clusters_csv_format() {
        let (_dir, db) = imported();

        let output = run(Commands::Clusters(clusters_args(OutputFormat::Csv)), &db).unwrap();
        assert_eq!(output.lines().count(), 2);
        assert!(output.contains("CRE,0,2,P1;P2,2024-01-01,2024-01-10"));
    }

    #[test]
    fn test_stats_and_location_commands() {
        let (_dir, db) = imported();

        let stats: serde_json::Value =
            serde_json::from_str(&run(Commands::Stats, &db).unwrap()).unwrap();
        assert_eq!(stats["total_stays"], 3);
        assert_eq!(stats["total_clusters"], 1);

        let rows: serde_json::Value = serde_json::from_str(
            &run(
                Commands::LocationClusters(LocationClustersArgs {
                    infection: "CRE".into(),
                    contact_window: 14,
                    min_size: 2,
                    csv: false,
                }),
                &db,
            )
            .unwrap(),
        )
        .unwrap();
        assert_eq!(rows[0]["location"], "ICU");
        assert_eq!(rows[0]["cluster_size"], 2);

        let cases: serde_json::Value = serde_json::from_str(
            &run(
                Commands::Cases(CaseArgs {
                    infection: Some("MRSA".into()),
                    from: None,
                    to: None,
                }),
                &db,
            )
            .unwrap(),
        )
        .unwrap();
        assert_eq!(cases.as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_health() {
        let (_dir, db) = imported();

        let output = run(Commands::Health, &db).unwrap();
        assert!(output.contains("\"status\": \"healthy\""));
        assert!(output.contains("\"service\": \"infection-clusters\""));
    }
}

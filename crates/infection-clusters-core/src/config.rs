//! Runtime configuration for detection and ingestion.
//!
//! Defaults match the clinical defaults (14-day window, shared location
//! required, greedy merging). Every field can be overridden from the
//! environment:
//!
//! | variable | field |
//! |---|---|
//! | `INFECTION_CLUSTERS_TIME_WINDOW_DAYS` | [`DetectionConfig::time_window_days`] |
//! | `INFECTION_CLUSTERS_REQUIRE_LOCATION_OVERLAP` | [`DetectionConfig::require_location_overlap`] |
//! | `INFECTION_CLUSTERS_MERGE` | [`DetectionConfig::merge_strategy`] |
//! | `INFECTION_CLUSTERS_INGEST_BATCH_SIZE` | [`IngestConfig::batch_size`] |
//!
//! Unparseable values fall back to the default.

use std::env;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub const ENV_TIME_WINDOW_DAYS: &str = "INFECTION_CLUSTERS_TIME_WINDOW_DAYS";
pub const ENV_REQUIRE_LOCATION_OVERLAP: &str = "INFECTION_CLUSTERS_REQUIRE_LOCATION_OVERLAP";
pub const ENV_MERGE: &str = "INFECTION_CLUSTERS_MERGE";
pub const ENV_INGEST_BATCH_SIZE: &str = "INFECTION_CLUSTERS_INGEST_BATCH_SIZE";

/// Default maximum day-gap between two linked positive tests.
pub const DEFAULT_TIME_WINDOW_DAYS: i64 = 14;
/// Default rows per insert batch during import.
pub const DEFAULT_INGEST_BATCH_SIZE: usize = 500;

/// How linked pairs are folded into clusters.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum MergeStrategy {
    /// Add each linked pair to the first cluster containing either patient.
    /// Links that bridge two existing clusters do not join them.
    #[default]
    Greedy,
    /// Union-find over patients; bridged clusters are joined.
    ConnectedComponents,
}

impl MergeStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            MergeStrategy::Greedy => "greedy",
            MergeStrategy::ConnectedComponents => "connected-components",
        }
    }
}

impl fmt::Display for MergeStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MergeStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "greedy" => Ok(MergeStrategy::Greedy),
            "connected-components" | "connected_components" | "union-find" => {
                Ok(MergeStrategy::ConnectedComponents)
            }
            other => Err(format!("Unknown merge strategy: {}", other)),
        }
    }
}

/// Parameters of the pairwise link predicate.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct LinkParams {
    /// Maximum whole-day gap between collection dates
    pub time_window_days: i64,
    /// Require overlapping stays in a shared location
    pub require_location_overlap: bool,
}

impl Default for LinkParams {
    fn default() -> Self {
        Self {
            time_window_days: DEFAULT_TIME_WINDOW_DAYS,
            require_location_overlap: true,
        }
    }
}

/// Detection settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DetectionConfig {
    pub time_window_days: i64,
    pub require_location_overlap: bool,
    pub merge_strategy: MergeStrategy,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            time_window_days: DEFAULT_TIME_WINDOW_DAYS,
            require_location_overlap: true,
            merge_strategy: MergeStrategy::Greedy,
        }
    }
}

impl DetectionConfig {
    /// Defaults overridden by process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for each variable.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        Self {
            time_window_days: parse_or(&lookup, ENV_TIME_WINDOW_DAYS, defaults.time_window_days),
            require_location_overlap: lookup(ENV_REQUIRE_LOCATION_OVERLAP)
                .and_then(|v| parse_bool(&v))
                .unwrap_or(defaults.require_location_overlap),
            merge_strategy: parse_or(&lookup, ENV_MERGE, defaults.merge_strategy),
        }
    }

    /// Link predicate parameters for this configuration.
    pub fn link_params(&self) -> LinkParams {
        LinkParams {
            time_window_days: self.time_window_days,
            require_location_overlap: self.require_location_overlap,
        }
    }
}

/// Import settings.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct IngestConfig {
    /// Rows per insert batch (all batches share one transaction)
    pub batch_size: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_INGEST_BATCH_SIZE,
        }
    }
}

impl IngestConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let batch_size = parse_or(&lookup, ENV_INGEST_BATCH_SIZE, DEFAULT_INGEST_BATCH_SIZE);
        Self {
            batch_size: batch_size.max(1),
        }
    }
}

fn parse_or<F, T>(lookup: &F, name: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    lookup(name)
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim() {
        "1" | "true" | "TRUE" | "yes" | "YES" => Some(true),
        "0" | "false" | "FALSE" | "no" | "NO" => Some(false),
        _ => None,
    }
}

//! Cluster detection over a record store.
//!
//! Two strategies share the idea of a contact between positive patients:
//!
//! - Patient clusters: every pair of positive tests of one infection is run
//!   through the link predicate ([`link`]) and linked pairs are folded into
//!   clusters ([`assembler`]).
//! - Location clusters: a per-location aggregate answered by the store itself
//!   ([`LocationClusterSource`]).
//!
//! Neither strategy mutates the store; repeated runs over unchanged data give
//! identical output.

pub mod assembler;
pub mod link;
pub mod location;
pub mod statistics;
pub mod store;

pub use assembler::{component_merge, greedy_merge, ClusterAssembler, LinkedPair};
pub use link::{days_between, is_linked, StayIndex};
pub use location::summarize_locations;
pub use statistics::summarize;
pub use store::{LocationClusterSource, RecordSnapshot, RecordStore, StoreError, StoreResult};

use std::collections::{BTreeSet, HashMap};

use thiserror::Error;

use crate::config::{DetectionConfig, LinkParams};
use crate::models::{
    ClusterMap, LocationClusterQuery, LocationClusterSummary, StatisticsSummary,
};

/// Detection errors.
#[derive(Error, Debug)]
pub enum DetectionError {
    #[error("Record store error: {0}")]
    Store(#[from] StoreError),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
}

pub type DetectionResult<T> = Result<T, DetectionError>;

/// Runs both detection strategies against a store.
pub struct ClusterDetector<'a, S: ?Sized> {
    store: &'a S,
    config: DetectionConfig,
}

impl<'a, S: ?Sized> ClusterDetector<'a, S> {
    /// Detector with default settings.
    pub fn new(store: &'a S) -> Self {
        Self::with_config(store, DetectionConfig::default())
    }

    pub fn with_config(store: &'a S, config: DetectionConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &DetectionConfig {
        &self.config
    }
}

impl<S: RecordStore + ?Sized> ClusterDetector<'_, S> {
    /// Patient clusters for every infection with positive tests, using the
    /// given window and location requirement and the configured merge
    /// strategy.
    pub fn detect_clusters(
        &self,
        time_window_days: i64,
        require_location_overlap: bool,
    ) -> DetectionResult<ClusterMap> {
        self.run(LinkParams {
            time_window_days,
            require_location_overlap,
        })
    }

    /// Patient clusters using the configured parameters.
    pub fn detect_configured(&self) -> DetectionResult<ClusterMap> {
        self.run(self.config.link_params())
    }

    fn run(&self, params: LinkParams) -> DetectionResult<ClusterMap> {
        if params.time_window_days < 0 {
            return Err(DetectionError::InvalidParameter(format!(
                "time_window_days must be non-negative, got {}",
                params.time_window_days
            )));
        }

        let tests = self.store.fetch_positive_tests(None)?;
        if tests.is_empty() {
            tracing::info!("No positive tests; nothing to cluster");
            return Ok(ClusterMap::new());
        }

        let stays = if params.require_location_overlap {
            let patients: BTreeSet<String> = tests.iter().map(|t| t.patient_id.clone()).collect();
            self.store.fetch_stays(&patients)?
        } else {
            HashMap::new()
        };
        let index = StayIndex::from_histories(&stays);

        let clusters =
            ClusterAssembler::new(&index, params, self.config.merge_strategy).assemble(&tests);

        tracing::info!(
            positive_tests = tests.len(),
            patients_with_stays = index.patient_count(),
            infections = clusters.len(),
            clusters = clusters.values().map(Vec::len).sum::<usize>(),
            time_window_days = params.time_window_days,
            require_location_overlap = params.require_location_overlap,
            merge = %self.config.merge_strategy,
            "Cluster detection complete"
        );

        Ok(clusters)
    }

    /// Table counts plus a fresh detection run with the configured settings.
    pub fn compute_statistics(&self) -> DetectionResult<StatisticsSummary> {
        let counts = self.store.record_counts()?;
        let clusters = self.detect_configured()?;
        Ok(summarize(counts, &clusters))
    }
}

impl<S: LocationClusterSource + ?Sized> ClusterDetector<'_, S> {
    /// Location-level clusters for one infection.
    pub fn find_location_clusters(
        &self,
        infection: &str,
        contact_window_days: i64,
        min_cluster_size: u32,
    ) -> DetectionResult<Vec<LocationClusterSummary>> {
        if infection.trim().is_empty() {
            return Err(DetectionError::InvalidParameter(
                "infection must not be empty".to_string(),
            ));
        }
        if contact_window_days < 0 {
            return Err(DetectionError::InvalidParameter(format!(
                "contact_window_days must be non-negative, got {}",
                contact_window_days
            )));
        }

        let query = LocationClusterQuery {
            infection: infection.to_string(),
            contact_window_days,
            min_cluster_size,
        };
        let summaries = self.store.execute_relational_cluster_query(&query)?;

        tracing::info!(
            infection,
            contact_window_days,
            min_cluster_size,
            locations = summaries.len(),
            "Location cluster detection complete"
        );

        Ok(summaries)
    }
}

//! Prometheus metrics for one loader process.
use prometheus::{
    Counter, Histogram, IntCounterVec, Registry, register_counter_with_registry,
    register_histogram_with_registry, register_int_counter_vec_with_registry,
};
use std::sync::Arc;

use crate::pipeline::enrich::GenderOutcome;

#[derive(Debug, Clone)]
pub struct Metrics {
    pub titles_loaded: Counter,
    pub titles_skipped_duplicate: Counter,
    pub gender_lookups: IntCounterVec,
    pub runs_completed: Counter,
    pub runs_failed: Counter,

    pub gender_lookup_duration: Histogram,
    pub enrichment_duration: Histogram,
    pub run_duration: Histogram,
}

impl Metrics {
    /// Registers every loader metric on `registry`.
    ///
    /// # Errors
    /// Fails when a metric with the same name is already registered.
    pub fn new(registry: Arc<Registry>) -> Result<Self, prometheus::Error> {
        Ok(Self {
            titles_loaded: register_counter_with_registry!(
                "catalog_titles_loaded_total",
                "Titles written to the catalog database",
                registry
            )?,
            titles_skipped_duplicate: register_counter_with_registry!(
                "catalog_titles_skipped_duplicate_total",
                "Titles dropped because their show_id was already loaded",
                registry
            )?,
            gender_lookups: register_int_counter_vec_with_registry!(
                "catalog_gender_lookups_total",
                "Gender lookups by outcome",
                &["outcome"],
                registry
            )?,
            runs_completed: register_counter_with_registry!(
                "catalog_runs_completed_total",
                "Pipeline runs that committed their batch",
                registry
            )?,
            runs_failed: register_counter_with_registry!(
                "catalog_runs_failed_total",
                "Pipeline runs aborted before commit",
                registry
            )?,
            gender_lookup_duration: register_histogram_with_registry!(
                "catalog_gender_lookup_duration_seconds",
                "Latency of a single gender lookup",
                registry
            )?,
            enrichment_duration: register_histogram_with_registry!(
                "catalog_enrichment_duration_seconds",
                "Duration of the whole gender enrichment stage",
                registry
            )?,
            run_duration: register_histogram_with_registry!(
                "catalog_run_duration_seconds",
                "Duration of a pipeline run",
                registry
            )?,
        })
    }

    pub fn record_lookup(&self, outcome: &GenderOutcome, elapsed_secs: f64) {
        self.gender_lookups
            .with_label_values(&[outcome.metric_label()])
            .inc();
        self.gender_lookup_duration.observe(elapsed_secs);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::enrich::Gender;

    #[test]
    fn record_lookup_counts_by_outcome() {
        let metrics = Metrics::new(Arc::new(Registry::new())).expect("metrics register");

        metrics.record_lookup(&GenderOutcome::Resolved(Gender::Female), 0.2);
        metrics.record_lookup(&GenderOutcome::Resolved(Gender::Male), 0.1);
        metrics.record_lookup(&GenderOutcome::Failed, 1.5);

        assert_eq!(
            metrics.gender_lookups.with_label_values(&["resolved"]).get(),
            2
        );
        assert_eq!(metrics.gender_lookups.with_label_values(&["failed"]).get(), 1);
        assert_eq!(metrics.gender_lookups.with_label_values(&["unknown"]).get(), 0);
        assert_eq!(metrics.gender_lookup_duration.get_sample_count(), 3);
    }

    #[test]
    fn registering_twice_on_one_registry_fails() {
        let registry = Arc::new(Registry::new());
        Metrics::new(Arc::clone(&registry)).expect("first registration");

        assert!(Metrics::new(registry).is_err());
    }
}

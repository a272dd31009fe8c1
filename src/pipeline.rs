//! Catalog load pipeline: ingest, validate, transform, enrich, persist.

pub mod audit;
pub mod cast;
pub mod enrich;
pub mod ingest;
pub mod merge;
pub mod orchestrator;
pub mod transform;
pub mod validate;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use anyhow::anyhow;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::observability::metrics::Metrics;
use crate::store::{CatalogStore, LoadBatch};

use self::audit::{CatalogAudit, audit_batch};
use self::cast::{EmptyCastPolicy, explode_cast};
use self::enrich::{EnrichmentError, FanOutCoordinator, GenderLookup, OutcomeTally};
use self::ingest::{TitleRecord, TitleSource};
use self::orchestrator::EnrichmentOrchestrator;
use self::transform::{movie_rows, title_rows, tv_show_rows};
use self::validate::{ValidationReport, validate_titles};

/// Identity of one pipeline run, carried through every log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunContext {
    pub run_id: Uuid,
}

impl RunContext {
    #[must_use]
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
        }
    }
}

impl Default for RunContext {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("input validation failed: {0}")]
    InvalidInput(ValidationReport),
    #[error(transparent)]
    Enrichment(#[from] EnrichmentError),
    #[error("failed to load titles")]
    Source(#[source] anyhow::Error),
    #[error("failed to write catalog")]
    Store(#[source] anyhow::Error),
}

/// What one run loaded and how enrichment went.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub titles_read: usize,
    pub titles_skipped_duplicate: usize,
    pub titles_loaded: usize,
    pub movies: usize,
    pub tv_shows: usize,
    pub cast_rows: usize,
    pub distinct_names: usize,
    pub lookups: OutcomeTally,
    pub audit: CatalogAudit,
}

pub struct CatalogPipeline {
    source: Arc<dyn TitleSource>,
    store: Arc<dyn CatalogStore>,
    enrichment: EnrichmentOrchestrator,
    empty_cast_policy: EmptyCastPolicy,
    check_duplicates: bool,
    metrics: Option<Arc<Metrics>>,
}

impl CatalogPipeline {
    #[must_use]
    pub fn builder() -> CatalogPipelineBuilder {
        CatalogPipelineBuilder::default()
    }

    /// Runs the whole load once. Nothing reaches the store unless every
    /// earlier stage succeeded.
    ///
    /// # Errors
    /// Returns the first stage failure; see [`PipelineError`].
    pub async fn run(&self) -> Result<RunSummary, PipelineError> {
        let context = RunContext::new();
        let started = Instant::now();
        info!(run_id = %context.run_id, "catalog pipeline started");

        let result = self.execute(&context).await;

        if let Some(metrics) = &self.metrics {
            metrics.run_duration.observe(started.elapsed().as_secs_f64());
            match &result {
                Ok(_) => metrics.runs_completed.inc(),
                Err(_) => metrics.runs_failed.inc(),
            }
        }

        match &result {
            Ok(summary) => info!(
                run_id = %context.run_id,
                titles_loaded = summary.titles_loaded,
                cast_rows = summary.cast_rows,
                elapsed_ms = started.elapsed().as_millis(),
                "catalog pipeline completed"
            ),
            Err(error) => warn!(
                run_id = %context.run_id,
                error = %error,
                elapsed_ms = started.elapsed().as_millis(),
                "catalog pipeline failed"
            ),
        }
        result
    }

    async fn execute(&self, context: &RunContext) -> Result<RunSummary, PipelineError> {
        let batch = self.source.load().await.map_err(PipelineError::Source)?;
        info!(
            run_id = %context.run_id,
            stage = "load",
            records = batch.records.len(),
            "titles loaded from source"
        );

        let report = validate_titles(&batch);
        if !report.is_valid() {
            warn!(
                run_id = %context.run_id,
                stage = "validate",
                issues = report.issues.len(),
                "input validation failed"
            );
            return Err(PipelineError::InvalidInput(report));
        }

        let titles_read = batch.records.len();
        let records = self.drop_existing(context, batch.records).await?;
        let skipped = titles_read - records.len();
        if let Some(metrics) = &self.metrics {
            #[allow(clippy::cast_precision_loss)]
            metrics.titles_skipped_duplicate.inc_by(skipped as f64);
        }

        let titles = title_rows(&records);
        let movies = movie_rows(&records);
        let tv_shows = tv_show_rows(&records);
        let cast = explode_cast(&records, self.empty_cast_policy);
        info!(
            run_id = %context.run_id,
            stage = "transform",
            titles = titles.len(),
            movies = movies.len(),
            tv_shows = tv_shows.len(),
            cast_records = cast.len(),
            "catalog rows prepared"
        );

        let enriched = self.enrichment.enrich(context, &cast).await?;

        let load = LoadBatch {
            titles,
            movies,
            tv_shows,
            cast_members: enriched.rows,
        };
        self.store
            .persist(&load)
            .await
            .map_err(PipelineError::Store)?;
        info!(run_id = %context.run_id, stage = "persist", "catalog committed");

        let audit = audit_batch(&load, chrono::Utc::now().date_naive());
        log_audit(context, &audit);

        if let Some(metrics) = &self.metrics {
            #[allow(clippy::cast_precision_loss)]
            metrics.titles_loaded.inc_by(load.titles.len() as f64);
        }

        Ok(RunSummary {
            run_id: context.run_id,
            titles_read,
            titles_skipped_duplicate: skipped,
            titles_loaded: load.titles.len(),
            movies: load.movies.len(),
            tv_shows: load.tv_shows.len(),
            cast_rows: load.cast_members.len(),
            distinct_names: enriched.distinct_names,
            lookups: enriched.tally,
            audit,
        })
    }

    async fn drop_existing(
        &self,
        context: &RunContext,
        records: Vec<TitleRecord>,
    ) -> Result<Vec<TitleRecord>, PipelineError> {
        if !self.check_duplicates {
            return Ok(records);
        }

        let existing: HashSet<String> = self
            .store
            .existing_show_ids()
            .await
            .map_err(PipelineError::Store)?;
        let before = records.len();
        let fresh: Vec<TitleRecord> = records
            .into_iter()
            .filter(|record| !existing.contains(record.show_id()))
            .collect();

        info!(
            run_id = %context.run_id,
            stage = "dedup",
            already_loaded = before - fresh.len(),
            remaining = fresh.len(),
            "filtered titles already in the catalog"
        );
        Ok(fresh)
    }
}

fn log_audit(context: &RunContext, audit: &CatalogAudit) {
    for column in audit.columns_with_nulls() {
        info!(
            run_id = %context.run_id,
            table = column.table,
            column = column.column,
            nulls = column.nulls,
            percent = column.percent(),
            "null values in loaded column"
        );
    }

    let invalid = &audit.invalid;
    info!(
        run_id = %context.run_id,
        stage = "audit",
        unknown_type = invalid.unknown_type,
        movie_release_year_out_of_range = invalid.movies.release_year_out_of_range,
        movie_date_added_out_of_range = invalid.movies.date_added_out_of_range,
        movie_added_before_release = invalid.movies.added_before_release,
        movie_length_out_of_range = invalid.movie_length_out_of_range,
        tv_show_release_year_out_of_range = invalid.tv_shows.release_year_out_of_range,
        tv_show_date_added_out_of_range = invalid.tv_shows.date_added_out_of_range,
        tv_show_added_before_release = invalid.tv_shows.added_before_release,
        season_qty_out_of_range = invalid.season_qty_out_of_range,
        gender_unknown = invalid.gender_unknown,
        gender_unknown_percent = invalid.gender_unknown_percent(),
        gender_request_failed = invalid.gender_request_failed,
        gender_request_failed_percent = invalid.gender_request_failed_percent(),
        "load audit"
    );
}

/// Builder for [`CatalogPipeline`]; source, store and lookup are required.
pub struct CatalogPipelineBuilder {
    source: Option<Arc<dyn TitleSource>>,
    store: Option<Arc<dyn CatalogStore>>,
    lookup: Option<Arc<dyn GenderLookup>>,
    concurrency: usize,
    empty_cast_policy: EmptyCastPolicy,
    check_duplicates: bool,
    metrics: Option<Arc<Metrics>>,
}

impl Default for CatalogPipelineBuilder {
    fn default() -> Self {
        Self {
            source: None,
            store: None,
            lookup: None,
            concurrency: 100,
            empty_cast_policy: EmptyCastPolicy::default(),
            check_duplicates: true,
            metrics: None,
        }
    }
}

impl CatalogPipelineBuilder {
    #[must_use]
    pub fn with_source(mut self, source: Arc<dyn TitleSource>) -> Self {
        self.source = Some(source);
        self
    }

    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn CatalogStore>) -> Self {
        self.store = Some(store);
        self
    }

    #[must_use]
    pub fn with_lookup(mut self, lookup: Arc<dyn GenderLookup>) -> Self {
        self.lookup = Some(lookup);
        self
    }

    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    #[must_use]
    pub fn with_empty_cast_policy(mut self, policy: EmptyCastPolicy) -> Self {
        self.empty_cast_policy = policy;
        self
    }

    #[must_use]
    pub fn with_duplicate_check(mut self, enabled: bool) -> Self {
        self.check_duplicates = enabled;
        self
    }

    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// # Errors
    /// Fails when the source, store or lookup client was not configured.
    pub fn build(self) -> anyhow::Result<CatalogPipeline> {
        let source = self
            .source
            .ok_or_else(|| anyhow!("title source must be configured before build"))?;
        let store = self
            .store
            .ok_or_else(|| anyhow!("catalog store must be configured before build"))?;
        let lookup = self
            .lookup
            .ok_or_else(|| anyhow!("gender lookup must be configured before build"))?;

        let mut coordinator = FanOutCoordinator::new(lookup);
        let mut enrichment_metrics = None;
        if let Some(metrics) = &self.metrics {
            coordinator = coordinator.with_metrics(Arc::clone(metrics));
            enrichment_metrics = Some(Arc::clone(metrics));
        }
        let mut enrichment = EnrichmentOrchestrator::new(coordinator, self.concurrency);
        if let Some(metrics) = enrichment_metrics {
            enrichment = enrichment.with_metrics(metrics);
        }

        Ok(CatalogPipeline {
            source,
            store,
            enrichment,
            empty_cast_policy: self.empty_cast_policy,
            check_duplicates: self.check_duplicates,
            metrics: self.metrics,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::enrich::{Gender, GenderOutcome, LookupResult};
    use crate::pipeline::ingest::TitleBatch;
    use crate::pipeline::merge::EnrichedCastRecord;
    use anyhow::Result;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StaticSource {
        batch: TitleBatch,
    }

    #[async_trait]
    impl TitleSource for StaticSource {
        async fn load(&self) -> Result<TitleBatch> {
            Ok(self.batch.clone())
        }
    }

    #[derive(Default)]
    struct MemoryStore {
        existing: HashSet<String>,
        persisted: Mutex<Vec<LoadBatch>>,
        fail_persist: bool,
    }

    #[async_trait]
    impl CatalogStore for MemoryStore {
        async fn existing_show_ids(&self) -> Result<HashSet<String>> {
            Ok(self.existing.clone())
        }

        async fn persist(&self, batch: &LoadBatch) -> Result<()> {
            if self.fail_persist {
                anyhow::bail!("connection reset");
            }
            self.persisted.lock().expect("persisted lock").push(batch.clone());
            Ok(())
        }
    }

    #[derive(Default)]
    struct CountingLookup {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl GenderLookup for CountingLookup {
        async fn lookup(&self, name: &str) -> LookupResult {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let outcome = if name == "Alice" {
                GenderOutcome::Resolved(Gender::Female)
            } else {
                GenderOutcome::Unknown
            };
            LookupResult::new(name, outcome)
        }
    }

    fn title(show_id: &str, kind: &str, cast: Option<&str>, duration: &str) -> TitleRecord {
        TitleRecord {
            show_id: Some(show_id.to_string()),
            kind: Some(kind.to_string()),
            title: Some(format!("Title {show_id}")),
            cast: cast.map(ToString::to_string),
            date_added: Some("September 9, 2019".to_string()),
            release_year: Some(2019),
            duration: Some(duration.to_string()),
            ..TitleRecord::default()
        }
    }

    fn catalog() -> TitleBatch {
        TitleBatch::with_expected_headers(vec![
            title("s1", "Movie", Some("Alice, Bob"), "90 min"),
            title("s2", "TV Show", None, "2 Seasons"),
            title("s3", "Movie", Some("Alice"), "104 min"),
        ])
    }

    fn pipeline(
        batch: TitleBatch,
        store: Arc<MemoryStore>,
        lookup: Arc<CountingLookup>,
    ) -> CatalogPipeline {
        CatalogPipeline::builder()
            .with_source(Arc::new(StaticSource { batch }))
            .with_store(store)
            .with_lookup(lookup)
            .with_concurrency(2)
            .build()
            .expect("pipeline")
    }

    #[tokio::test]
    async fn run_persists_every_table_in_one_batch() {
        let store = Arc::new(MemoryStore::default());
        let lookup = Arc::new(CountingLookup::default());

        let summary = pipeline(catalog(), store.clone(), lookup.clone())
            .run()
            .await
            .expect("run");

        assert_eq!(summary.titles_loaded, 3);
        assert_eq!(summary.movies, 2);
        assert_eq!(summary.tv_shows, 1);
        assert_eq!(summary.cast_rows, 4);
        assert_eq!(summary.distinct_names, 2);
        assert_eq!(lookup.calls.load(Ordering::SeqCst), 2);
        assert_eq!(summary.audit.invalid.cast_rows, 4);
        assert_eq!(summary.audit.invalid.gender_unknown, 1);
        assert!(
            summary
                .audit
                .columns_with_nulls()
                .any(|column| column.table == "titles" && column.column == "director")
        );

        let persisted = store.persisted.lock().expect("persisted lock");
        assert_eq!(persisted.len(), 1);
        assert_eq!(
            persisted[0].cast_members[2],
            EnrichedCastRecord {
                record_id: "s2".to_string(),
                cast_member: None,
                gender: None,
            }
        );
    }

    #[tokio::test]
    async fn invalid_input_stops_before_lookups_and_writes() {
        let mut batch = catalog();
        batch.records[1].kind = Some("Podcast".to_string());
        let store = Arc::new(MemoryStore::default());
        let lookup = Arc::new(CountingLookup::default());

        let error = pipeline(batch, store.clone(), lookup.clone())
            .run()
            .await
            .expect_err("unknown type must fail validation");

        assert!(matches!(error, PipelineError::InvalidInput(_)));
        assert_eq!(lookup.calls.load(Ordering::SeqCst), 0);
        assert!(store.persisted.lock().expect("persisted lock").is_empty());
    }

    #[tokio::test]
    async fn already_loaded_titles_are_skipped() {
        let store = Arc::new(MemoryStore {
            existing: HashSet::from(["s1".to_string(), "s3".to_string()]),
            ..MemoryStore::default()
        });
        let lookup = Arc::new(CountingLookup::default());

        let summary = pipeline(catalog(), store.clone(), lookup.clone())
            .run()
            .await
            .expect("run");

        assert_eq!(summary.titles_skipped_duplicate, 2);
        assert_eq!(summary.titles_loaded, 1);
        assert_eq!(summary.cast_rows, 1);
        assert_eq!(lookup.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn persist_failure_is_reported_as_store_error() {
        let store = Arc::new(MemoryStore {
            fail_persist: true,
            ..MemoryStore::default()
        });
        let telemetry = crate::observability::Telemetry::without_tracing().expect("telemetry");
        let pipeline = CatalogPipeline::builder()
            .with_source(Arc::new(StaticSource { batch: catalog() }))
            .with_store(store)
            .with_lookup(Arc::new(CountingLookup::default()))
            .with_metrics(telemetry.metrics())
            .build()
            .expect("pipeline");

        let error = pipeline.run().await.expect_err("persist must fail");

        assert!(matches!(error, PipelineError::Store(_)));
        assert!((telemetry.metrics().runs_failed.get() - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn build_requires_a_source() {
        let result = CatalogPipeline::builder()
            .with_store(Arc::new(MemoryStore::default()))
            .with_lookup(Arc::new(CountingLookup::default()))
            .build();

        assert!(result.is_err());
    }
}

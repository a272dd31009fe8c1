use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use async_trait::async_trait;
use tracing::{info, warn};

use super::cast::{CastRecord, distinct_names};
use super::enrich::{EnrichmentError, FanOutCoordinator, OutcomeTally};
use super::merge::{EnrichedCastRecord, merge};
use super::{PipelineError, RunContext};
use crate::observability::metrics::Metrics;

/// Durable destination for enriched cast rows (append-only).
#[async_trait]
pub trait CastMemberSink: Send + Sync {
    async fn append_cast_members(&self, rows: &[EnrichedCastRecord]) -> Result<()>;
}

/// Enrichment run states. A run moves forward only; any stage may fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnrichmentState {
    Extracting,
    LookingUp,
    Merging,
    Done,
    Failed,
}

impl EnrichmentState {
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Extracting, Self::LookingUp)
                | (Self::LookingUp, Self::Merging)
                | (Self::Merging, Self::Done)
                | (Self::Extracting | Self::LookingUp | Self::Merging, Self::Failed)
        )
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Extracting => "extracting",
            Self::LookingUp => "looking_up",
            Self::Merging => "merging",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for EnrichmentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output of a completed enrichment run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrichedCast {
    pub rows: Vec<EnrichedCastRecord>,
    pub distinct_names: usize,
    pub tally: OutcomeTally,
    pub states: Vec<EnrichmentState>,
}

struct StateTracker<'a> {
    context: &'a RunContext,
    history: Vec<EnrichmentState>,
}

impl<'a> StateTracker<'a> {
    fn start(context: &'a RunContext) -> Self {
        let tracker = Self {
            context,
            history: vec![EnrichmentState::Extracting],
        };
        tracker.log(EnrichmentState::Extracting);
        tracker
    }

    fn current(&self) -> EnrichmentState {
        self.history
            .last()
            .copied()
            .unwrap_or(EnrichmentState::Extracting)
    }

    fn advance(&mut self, next: EnrichmentState) {
        debug_assert!(
            self.current().can_transition_to(next),
            "illegal enrichment transition {} -> {next}",
            self.current()
        );
        self.history.push(next);
        self.log(next);
    }

    fn fail(&mut self, error: &dyn fmt::Display) {
        warn!(
            run_id = %self.context.run_id,
            stage = EnrichmentState::Failed.as_str(),
            from = self.current().as_str(),
            error = %error,
            "enrichment run failed"
        );
        self.history.push(EnrichmentState::Failed);
    }

    fn log(&self, state: EnrichmentState) {
        info!(
            run_id = %self.context.run_id,
            stage = state.as_str(),
            "enrichment state changed"
        );
    }
}

/// Sequences name extraction, concurrent lookup and merge for one run.
#[derive(Clone)]
pub struct EnrichmentOrchestrator {
    coordinator: FanOutCoordinator,
    concurrency: usize,
    metrics: Option<Arc<Metrics>>,
}

impl EnrichmentOrchestrator {
    pub fn new(coordinator: FanOutCoordinator, concurrency: usize) -> Self {
        Self {
            coordinator,
            concurrency,
            metrics: None,
        }
    }

    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Enriches `records` without writing anywhere.
    ///
    /// # Errors
    /// Fails on invalid concurrency or a merge row-count mismatch.
    pub async fn enrich(
        &self,
        context: &RunContext,
        records: &[CastRecord],
    ) -> Result<EnrichedCast, EnrichmentError> {
        let mut tracker = StateTracker::start(context);
        match self.extract_lookup_merge(&mut tracker, records).await {
            Ok((rows, distinct_names, tally)) => {
                tracker.advance(EnrichmentState::Done);
                Ok(EnrichedCast {
                    rows,
                    distinct_names,
                    tally,
                    states: tracker.history,
                })
            }
            Err(error) => {
                tracker.fail(&error);
                Err(error)
            }
        }
    }

    /// Enriches `records` and hands the full result to `sink`.
    ///
    /// The sink sees nothing unless every stage succeeded, and the run only
    /// reaches `Done` once the sink has accepted the rows.
    ///
    /// # Errors
    /// Enrichment errors, or the sink's own error.
    pub async fn run(
        &self,
        context: &RunContext,
        records: &[CastRecord],
        sink: &dyn CastMemberSink,
    ) -> Result<EnrichedCast, PipelineError> {
        let mut tracker = StateTracker::start(context);
        let (rows, distinct_names, tally) =
            match self.extract_lookup_merge(&mut tracker, records).await {
                Ok(merged) => merged,
                Err(error) => {
                    tracker.fail(&error);
                    return Err(error.into());
                }
            };

        if let Err(error) = sink.append_cast_members(&rows).await {
            tracker.fail(&error);
            return Err(PipelineError::Store(error));
        }

        tracker.advance(EnrichmentState::Done);
        Ok(EnrichedCast {
            rows,
            distinct_names,
            tally,
            states: tracker.history,
        })
    }

    async fn extract_lookup_merge(
        &self,
        tracker: &mut StateTracker<'_>,
        records: &[CastRecord],
    ) -> Result<(Vec<EnrichedCastRecord>, usize, OutcomeTally), EnrichmentError> {
        let started = Instant::now();

        let names = distinct_names(records);
        info!(
            run_id = %tracker.context.run_id,
            cast_records = records.len(),
            distinct_names = names.len(),
            "extracted distinct cast names"
        );

        tracker.advance(EnrichmentState::LookingUp);
        let results = self.coordinator.enrich_all(&names, self.concurrency).await?;
        let tally = OutcomeTally::from_results(results.values());

        tracker.advance(EnrichmentState::Merging);
        let rows = merge(records, &results)?;

        if let Some(metrics) = &self.metrics {
            metrics
                .enrichment_duration
                .observe(started.elapsed().as_secs_f64());
        }
        info!(
            run_id = %tracker.context.run_id,
            rows = rows.len(),
            resolved = tally.resolved,
            unknown = tally.unknown,
            failed = tally.failed,
            elapsed_ms = started.elapsed().as_millis(),
            "cast enrichment merged"
        );

        Ok((rows, names.len(), tally))
    }
}

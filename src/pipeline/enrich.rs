//! Concurrent gender enrichment of distinct cast names.
//!
//! The distinct-name set is cut into at most `concurrency` contiguous batches
//! whose sizes differ by at most one. Each batch is owned by one tokio task
//! that looks its names up sequentially and returns its own result vector;
//! the coordinator joins every task before assembling the name→result map.
//! There is no shared mutable state between workers and no rebalancing, so a
//! batch full of slow names sets the latency floor for the whole stage.
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use futures::future::join_all;
use indexmap::IndexSet;
use thiserror::Error;
use tracing::{Instrument, debug, error, info, info_span};

use crate::observability::metrics::Metrics;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Gender {
    Male,
    Female,
}

impl Gender {
    /// Maps the lookup service's label; anything else is not a determinable gender.
    #[must_use]
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "male" | "m" => Some(Self::Male),
            "female" | "f" => Some(Self::Female),
            _ => None,
        }
    }
}

/// Result of one lookup. `Failed` means the call did not complete; it is data, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GenderOutcome {
    Resolved(Gender),
    Unknown,
    Failed,
}

impl GenderOutcome {
    /// Text stored in `cast_members.gender`.
    #[must_use]
    pub fn as_db_str(&self) -> &'static str {
        match self {
            Self::Resolved(Gender::Male) => "male",
            Self::Resolved(Gender::Female) => "female",
            Self::Unknown => "UNKNOWN",
            Self::Failed => "request_failed",
        }
    }

    #[must_use]
    pub fn metric_label(&self) -> &'static str {
        match self {
            Self::Resolved(_) => "resolved",
            Self::Unknown => "unknown",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for GenderOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_db_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupResult {
    pub name: String,
    pub outcome: GenderOutcome,
}

impl LookupResult {
    pub fn new(name: impl Into<String>, outcome: GenderOutcome) -> Self {
        Self {
            name: name.into(),
            outcome,
        }
    }
}

/// One external gender lookup per call. Implementations never fail:
/// transport or decoding problems come back as [`GenderOutcome::Failed`].
#[async_trait]
pub trait GenderLookup: Send + Sync {
    async fn lookup(&self, name: &str) -> LookupResult;
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnrichmentError {
    #[error("lookup concurrency must be at least 1, got {requested}")]
    InvalidConcurrency { requested: usize },
    #[error("merge produced {actual} rows for {expected} cast records")]
    JoinInvariantViolation { expected: usize, actual: usize },
}

/// Splits `items` into `min(concurrency, len)` contiguous, non-empty batches
/// whose sizes differ by at most one. Earlier batches take the remainder.
///
/// # Errors
/// [`EnrichmentError::InvalidConcurrency`] when `concurrency` is zero.
pub fn partition<T: Clone>(
    items: &[T],
    concurrency: usize,
) -> Result<Vec<Vec<T>>, EnrichmentError> {
    if concurrency == 0 {
        return Err(EnrichmentError::InvalidConcurrency {
            requested: concurrency,
        });
    }
    if items.is_empty() {
        return Ok(Vec::new());
    }

    let batch_count = concurrency.min(items.len());
    let base = items.len() / batch_count;
    let remainder = items.len() % batch_count;

    let mut batches = Vec::with_capacity(batch_count);
    let mut start = 0;
    for index in 0..batch_count {
        let size = base + usize::from(index < remainder);
        batches.push(items[start..start + size].to_vec());
        start += size;
    }

    Ok(batches)
}

/// Drives the bounded fan-out of lookups.
#[derive(Clone)]
pub struct FanOutCoordinator {
    client: Arc<dyn GenderLookup>,
    metrics: Option<Arc<Metrics>>,
}

impl FanOutCoordinator {
    pub fn new(client: Arc<dyn GenderLookup>) -> Self {
        Self {
            client,
            metrics: None,
        }
    }

    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Looks up every name exactly once using at most `concurrency` workers.
    ///
    /// The returned map has one entry per distinct input name. Duplicate
    /// input names are collapsed before batching.
    ///
    /// # Errors
    /// [`EnrichmentError::InvalidConcurrency`] when `concurrency` is zero;
    /// nothing is looked up in that case.
    pub async fn enrich_all(
        &self,
        names: &[String],
        concurrency: usize,
    ) -> Result<HashMap<String, LookupResult>, EnrichmentError> {
        if concurrency == 0 {
            return Err(EnrichmentError::InvalidConcurrency {
                requested: concurrency,
            });
        }

        let names: Vec<String> = names
            .iter()
            .cloned()
            .collect::<IndexSet<_>>()
            .into_iter()
            .collect();
        let batches = partition(&names, concurrency)?;
        let started = Instant::now();

        info!(
            names = names.len(),
            workers = batches.len(),
            concurrency,
            "starting gender lookups"
        );

        let tasks = batches.iter().enumerate().map(|(worker, batch)| {
            let client = Arc::clone(&self.client);
            let metrics = self.metrics.clone();
            let batch = batch.clone();
            tokio::spawn(
                run_batch(client, metrics, batch)
                    .instrument(info_span!("lookup_worker", worker)),
            )
        });

        // join barrier: nothing is merged until every worker has returned
        let outcomes = join_all(tasks).await;

        let mut results = HashMap::with_capacity(names.len());
        for (worker, (outcome, batch)) in outcomes.into_iter().zip(batches).enumerate() {
            match outcome {
                Ok(batch_results) => {
                    for (name, result) in batch.into_iter().zip(batch_results) {
                        results.insert(name, result);
                    }
                }
                Err(join_error) => {
                    error!(
                        worker,
                        batch_size = batch.len(),
                        error = %join_error,
                        "lookup worker aborted, marking its batch as failed"
                    );
                    for name in batch {
                        let result = LookupResult::new(name.clone(), GenderOutcome::Failed);
                        results.insert(name, result);
                    }
                }
            }
        }

        let tally = OutcomeTally::from_results(results.values());
        info!(
            names = results.len(),
            resolved = tally.resolved,
            unknown = tally.unknown,
            failed = tally.failed,
            elapsed_ms = started.elapsed().as_millis(),
            "gender lookups finished"
        );

        Ok(results)
    }
}

async fn run_batch(
    client: Arc<dyn GenderLookup>,
    metrics: Option<Arc<Metrics>>,
    batch: Vec<String>,
) -> Vec<LookupResult> {
    let started = Instant::now();
    let mut results = Vec::with_capacity(batch.len());

    for name in &batch {
        let call_started = Instant::now();
        let result = client.lookup(name).await;
        if let Some(metrics) = &metrics {
            metrics.record_lookup(&result.outcome, call_started.elapsed().as_secs_f64());
        }
        results.push(result);
    }

    debug!(
        batch_size = batch.len(),
        elapsed_ms = started.elapsed().as_millis(),
        "lookup worker finished"
    );
    results
}

/// Counts of each outcome kind over a set of lookup results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OutcomeTally {
    pub resolved: usize,
    pub unknown: usize,
    pub failed: usize,
}

impl OutcomeTally {
    pub fn from_results<'a>(results: impl IntoIterator<Item = &'a LookupResult>) -> Self {
        results
            .into_iter()
            .fold(Self::default(), |mut tally, result| {
                match result.outcome {
                    GenderOutcome::Resolved(_) => tally.resolved += 1,
                    GenderOutcome::Unknown => tally.unknown += 1,
                    GenderOutcome::Failed => tally.failed += 1,
                }
                tally
            })
    }

    #[must_use]
    pub fn total(&self) -> usize {
        self.resolved + self.unknown + self.failed
    }
}

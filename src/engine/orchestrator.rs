//! Collection orchestrator.
//!
//! Runs every configured source through its own extraction session,
//! retries a source once when it fails to load, and merges the per-source
//! maps into the run's master map.
//!
//! Merge precedence: sources are merged in configuration order and a later
//! source overwrites an earlier one for the same symbol. In parallel mode
//! the sources are still merged in that order after all of them finish, so
//! completion timing never decides a winner.

use futures::future::join_all;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::engine::fingerprint::Fingerprinter;
use crate::engine::paginator::{PaginationDriver, SourceHarvest};
use crate::engine::waiter::StabilityWaiter;
use crate::sources::SessionFactory;
use crate::types::{CollectorError, MasterMap, SourceDescriptor, SourceOutcome, SourceReport};

/// Attempts per source: the first try plus one retry.
const MAX_ATTEMPTS: u32 = 2;

// ---------------------------------------------------------------------------
// Settings and result
// ---------------------------------------------------------------------------

/// Orchestrator tuning, derived from `[collector]` and `[timeouts]`.
#[derive(Debug, Clone, Copy)]
pub struct CollectionSettings {
    pub ready: StabilityWaiter,
    pub transition: StabilityWaiter,
    pub max_skipped_rows: usize,
    pub retry_delay: Duration,
    pub parallel: bool,
}

/// Output of one collection pass.
#[derive(Debug, Clone, Default)]
pub struct CollectionResult {
    pub master: MasterMap,
    pub reports: Vec<SourceReport>,
}

impl CollectionResult {
    pub fn failed_sources(&self) -> impl Iterator<Item = &SourceReport> {
        self.reports
            .iter()
            .filter(|r| matches!(r.outcome, SourceOutcome::Failed(_)))
    }
}

/// Result of running one source to completion (all attempts).
struct SourceRun {
    harvest: Result<SourceHarvest, CollectorError>,
    attempts: u32,
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

pub struct CollectionOrchestrator<'a> {
    sessions: &'a dyn SessionFactory,
    fingerprinter: &'a dyn Fingerprinter,
    settings: CollectionSettings,
}

impl<'a> CollectionOrchestrator<'a> {
    pub fn new(
        sessions: &'a dyn SessionFactory,
        fingerprinter: &'a dyn Fingerprinter,
        settings: CollectionSettings,
    ) -> Self {
        Self {
            sessions,
            fingerprinter,
            settings,
        }
    }

    /// Collect every source and merge the results.
    ///
    /// Never fails: a source that cannot be read is reported as `failed`
    /// and the run continues with the rest.
    pub async fn collect(&self, sources: &[SourceDescriptor]) -> CollectionResult {
        info!(
            sources = sources.len(),
            parallel = self.settings.parallel,
            "Starting collection"
        );

        let runs: Vec<SourceRun> = if self.settings.parallel {
            join_all(sources.iter().map(|s| self.run_source(s))).await
        } else {
            let mut runs = Vec::with_capacity(sources.len());
            for source in sources {
                runs.push(self.run_source(source).await);
            }
            runs
        };

        let mut result = CollectionResult::default();
        for (source, run) in sources.iter().zip(runs) {
            let report = Self::merge(&mut result.master, source, run);
            result.reports.push(report);
        }

        info!(
            quotes = result.master.len(),
            failed = result.failed_sources().count(),
            "Collection complete"
        );

        result
    }

    /// Single-writer merge step. Consumes the harvest and records the
    /// source's outcome.
    fn merge(master: &mut MasterMap, source: &SourceDescriptor, run: SourceRun) -> SourceReport {
        match run.harvest {
            Ok(harvest) => {
                let quotes = harvest.quotes.len();
                let outcome = match &harvest.stopped {
                    None => SourceOutcome::Ok,
                    Some(e) => SourceOutcome::Partial(e.to_string()),
                };
                let overwritten = master.merge_from(harvest.quotes);
                if overwritten > 0 {
                    debug!(source = %source.name, overwritten, "Source overrode earlier quotes");
                }
                SourceReport {
                    source: source.name.clone(),
                    outcome,
                    quotes,
                    pages_read: harvest.pages_read,
                    skipped_rows: harvest.skipped_rows,
                    error_samples: harvest.error_samples,
                    attempts: run.attempts,
                }
            }
            Err(e) => {
                warn!(source = %source.name, error = %e, "Source failed, continuing without it");
                SourceReport {
                    source: source.name.clone(),
                    outcome: SourceOutcome::Failed(e.to_string()),
                    quotes: 0,
                    pages_read: 0,
                    skipped_rows: 0,
                    error_samples: Vec::new(),
                    attempts: run.attempts,
                }
            }
        }
    }

    /// Run one source, retrying once with a fresh session on a load
    /// failure.
    async fn run_source(&self, source: &SourceDescriptor) -> SourceRun {
        let mut last_error = None;

        for attempt in 1..=MAX_ATTEMPTS {
            if attempt > 1 {
                debug!(
                    source = %source.name,
                    attempt,
                    delay_ms = self.settings.retry_delay.as_millis() as u64,
                    "Retrying source with a fresh session"
                );
                tokio::time::sleep(self.settings.retry_delay).await;
            }

            match self.attempt(source).await {
                Ok(harvest) => {
                    return SourceRun {
                        harvest: Ok(harvest),
                        attempts: attempt,
                    }
                }
                Err(e) if e.is_transient() => {
                    warn!(source = %source.name, attempt, error = %e, "Source failed to load");
                    last_error = Some(e);
                }
                Err(e) => {
                    return SourceRun {
                        harvest: Err(e),
                        attempts: attempt,
                    }
                }
            }
        }

        SourceRun {
            harvest: Err(last_error
                .unwrap_or_else(|| CollectorError::transient(&source.name, "no attempt made"))),
            attempts: MAX_ATTEMPTS,
        }
    }

    /// One attempt: open a session, drive it, and always close it.
    async fn attempt(&self, source: &SourceDescriptor) -> Result<SourceHarvest, CollectorError> {
        info!(source = %source.name, url = %source.url, strategy = %source.extraction_strategy, "Opening source");

        let session = self
            .sessions
            .open(source)
            .await
            .map_err(|e| CollectorError::transient(&source.name, format!("{e:#}")))?;

        let driver = PaginationDriver::new(
            self.settings.ready,
            self.settings.transition,
            self.fingerprinter,
            self.settings.max_skipped_rows,
        );
        let harvest = driver.drive(session.as_ref(), source).await;

        if let Err(e) = session.close().await {
            warn!(source = %source.name, error = %e, "Failed to release session");
        }

        harvest
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! Per-source pagination driver.
//!
//! Walks one source through its pages:
//!
//! ```text
//! Idle → PageLoaded(1) → Transitioning(1→2) → PageLoaded(2) → … → Done
//! ```
//!
//! A transition is only accepted once the first data row's fingerprint differs
//! from the one captured before the page was turned, so a stale table is
//! never read twice. A failed transition ends pagination early and keeps
//! everything collected so far. Only a first page that never shows rows
//! fails the source outright.

use tracing::{debug, info, warn};

use crate::engine::fingerprint::Fingerprinter;
use crate::engine::waiter::StabilityWaiter;
use crate::sources::PageExtractor;
use crate::types::{
    CollectorError, ExtractionError, PaginationError, Quote, QuoteMap, RowResult,
    SourceDescriptor,
};

/// How many row errors are kept verbatim for diagnostics.
const MAX_ERROR_SAMPLES: usize = 5;

// ---------------------------------------------------------------------------
// Harvest
// ---------------------------------------------------------------------------

/// Everything one source produced in one attempt.
#[derive(Debug, Clone, Default)]
pub struct SourceHarvest {
    pub quotes: QuoteMap,
    pub pages_read: usize,
    pub skipped_rows: usize,
    /// First few unreadable rows, for the run log.
    pub error_samples: Vec<ExtractionError>,
    /// Set when pagination ended before the configured page count.
    pub stopped: Option<PaginationError>,
}

#[derive(Debug)]
enum PageState {
    Idle,
    PageLoaded(usize),
    Transitioning {
        from: usize,
        to: usize,
        before: Option<String>,
    },
    Done,
}

// ---------------------------------------------------------------------------
// Driver
// ---------------------------------------------------------------------------

pub struct PaginationDriver<'a> {
    /// Wait for the first page to show rows.
    ready: StabilityWaiter,
    /// Wait for a page turn to land.
    transition: StabilityWaiter,
    fingerprinter: &'a dyn Fingerprinter,
    max_skipped_rows: usize,
}

impl<'a> PaginationDriver<'a> {
    pub fn new(
        ready: StabilityWaiter,
        transition: StabilityWaiter,
        fingerprinter: &'a dyn Fingerprinter,
        max_skipped_rows: usize,
    ) -> Self {
        Self {
            ready,
            transition,
            fingerprinter,
            max_skipped_rows,
        }
    }

    /// Read every page of `source` through `extractor`.
    ///
    /// Returns `TransientLoad` only if page 1 never becomes readable;
    /// later failures are recorded in `SourceHarvest::stopped`.
    pub async fn drive(
        &self,
        extractor: &dyn PageExtractor,
        source: &SourceDescriptor,
    ) -> Result<SourceHarvest, CollectorError> {
        let limit = source.page_limit();
        let mut harvest = SourceHarvest::default();
        let mut rows: Vec<RowResult> = Vec::new();
        let mut state = PageState::Idle;

        loop {
            state = match state {
                PageState::Idle => {
                    rows = self.await_first_page(extractor, source).await?;
                    PageState::PageLoaded(1)
                }

                PageState::PageLoaded(page) => {
                    let before = page_fingerprint(self.fingerprinter, source, &rows);
                    self.absorb(&mut harvest, source, page, std::mem::take(&mut rows));

                    if page >= limit {
                        PageState::Done
                    } else if harvest.skipped_rows > self.max_skipped_rows {
                        harvest.stopped = Some(PaginationError::TooManySkippedRows {
                            skipped: harvest.skipped_rows,
                            limit: self.max_skipped_rows,
                        });
                        PageState::Done
                    } else {
                        PageState::Transitioning {
                            from: page,
                            to: page + 1,
                            before,
                        }
                    }
                }

                PageState::Transitioning { from, to, before } => {
                    match self.turn_page(extractor, source, from, before).await {
                        Ok(next) => {
                            rows = next;
                            PageState::PageLoaded(to)
                        }
                        Err(e) => {
                            warn!(source = %source.name, page = to, error = %e, "Pagination stopped early");
                            harvest.stopped = Some(e);
                            PageState::Done
                        }
                    }
                }

                PageState::Done => break,
            };
        }

        info!(
            source = %source.name,
            pages = harvest.pages_read,
            of = limit,
            quotes = harvest.quotes.len(),
            skipped = harvest.skipped_rows,
            "Source pages read"
        );

        Ok(harvest)
    }

    // -- States ----------------------------------------------------------

    async fn await_first_page(
        &self,
        extractor: &dyn PageExtractor,
        source: &SourceDescriptor,
    ) -> Result<Vec<RowResult>, CollectorError> {
        let waited = self
            .ready
            .wait_until(
                move || async move { extractor.fetch_page(source, 1).await },
                |seen| matches!(seen, Ok(rows) if !rows.is_empty()),
            )
            .await;

        match waited {
            Ok(Ok(rows)) => Ok(rows),
            Ok(Err(e)) => Err(CollectorError::transient(&source.name, e.to_string())),
            Err(timeout) => {
                let message = match timeout.last {
                    Err(e) => format!("first page unreadable: {e}"),
                    Ok(_) => format!("no rows rendered within {:?}", timeout.waited),
                };
                Err(CollectorError::transient(&source.name, message))
            }
        }
    }

    async fn turn_page(
        &self,
        extractor: &dyn PageExtractor,
        source: &SourceDescriptor,
        from: usize,
        before: Option<String>,
    ) -> Result<Vec<RowResult>, PaginationError> {
        let to = from + 1;

        match extractor.has_next_page(source, from).await {
            Ok(true) => {}
            Ok(false) => return Err(PaginationError::ControlNotFound { to }),
            Err(e) => {
                return Err(PaginationError::Navigation {
                    to,
                    message: e.to_string(),
                })
            }
        }

        extractor
            .goto_next_page(source, from)
            .await
            .map_err(|e| PaginationError::Navigation {
                to,
                message: e.to_string(),
            })?;

        let fingerprinter = self.fingerprinter;
        let waited = self
            .transition
            .wait_until(
                move || async move { extractor.fetch_page(source, to).await },
                |seen| match seen {
                    Ok(rows) => {
                        let now = page_fingerprint(fingerprinter, source, rows);
                        now.is_some() && now != before
                    }
                    Err(_) => false,
                },
            )
            .await;

        match waited {
            Ok(Ok(rows)) => {
                debug!(source = %source.name, from, to, "Page transition confirmed");
                Ok(rows)
            }
            // The predicate only accepts Ok values.
            Ok(Err(e)) => Err(PaginationError::PageRead {
                page: to,
                message: e.to_string(),
            }),
            Err(timeout) => {
                if let Err(e) = &timeout.last {
                    debug!(source = %source.name, page = to, error = %e, "Last poll before timeout failed");
                }
                Err(PaginationError::TransitionTimeout {
                    from,
                    to,
                    waited_ms: timeout.waited.as_millis() as u64,
                })
            }
        }
    }

    /// Fold one page's rows into the harvest. Later rows overwrite earlier
    /// ones for the same symbol.
    fn absorb(
        &self,
        harvest: &mut SourceHarvest,
        source: &SourceDescriptor,
        page: usize,
        rows: Vec<RowResult>,
    ) {
        harvest.pages_read += 1;
        let mut kept = 0usize;

        for row in rows {
            match row {
                Ok(row) => {
                    if !source.keeps_symbol(&row.symbol) {
                        continue;
                    }
                    let quote = Quote::from_row(row, &source.category);
                    if let Some(prev) = harvest.quotes.get(&quote.symbol) {
                        if prev != &quote {
                            debug!(
                                source = %source.name,
                                symbol = %quote.symbol,
                                page,
                                "Symbol repeated with different rates, keeping the later one"
                            );
                        }
                    }
                    if harvest.quotes.upsert(quote) {
                        kept += 1;
                    }
                }
                Err(e) => {
                    debug!(source = %source.name, page, error = %e, "Skipping unreadable row");
                    harvest.skipped_rows += 1;
                    if harvest.error_samples.len() < MAX_ERROR_SAMPLES {
                        harvest.error_samples.push(e);
                    }
                }
            }
        }

        debug!(source = %source.name, page, rows = kept, "Page absorbed");
    }
}

/// Fingerprint of the first row `absorb` would keep. Header and blank rows
/// repeat on every page, so they cannot tell pages apart.
fn page_fingerprint(
    fingerprinter: &dyn Fingerprinter,
    source: &SourceDescriptor,
    rows: &[RowResult],
) -> Option<String> {
    rows.iter()
        .filter_map(|r| r.as_ref().ok())
        .find(|row| source.keeps_symbol(&row.symbol))
        .map(|row| fingerprinter.fingerprint(row))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

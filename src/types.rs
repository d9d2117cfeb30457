//! Shared types for the SWAPWATCH collector.
//!
//! These types form the data model used across all modules: raw rows as
//! read off a page, merged quotes, source descriptors, the canonical
//! instrument ordering, and the reconciled snapshot rows.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;

// ---------------------------------------------------------------------------
// Rows and quotes
// ---------------------------------------------------------------------------

/// One row as extracted from a rendered page, before it is attributed
/// to a source category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawRow {
    pub symbol: String,
    pub long_rate: String,
    pub short_rate: String,
}

impl RawRow {
    pub fn new(symbol: &str, long_rate: &str, short_rate: &str) -> Self {
        Self {
            symbol: symbol.to_string(),
            long_rate: long_rate.to_string(),
            short_rate: short_rate.to_string(),
        }
    }
}

/// Result of reading a single table row. A row that cannot be parsed is
/// reported rather than dropped so the driver can count it.
pub type RowResult = std::result::Result<RawRow, ExtractionError>;

/// A swap quote for one instrument.
///
/// Rates are kept as the source displayed them (locale decimal marks,
/// explicit signs, trailing text). They are never parsed as numbers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
    pub symbol: String,
    pub long_rate: String,
    pub short_rate: String,
    pub category: String,
}

impl Quote {
    pub fn from_row(row: RawRow, category: &str) -> Self {
        Self {
            symbol: row.symbol,
            long_rate: row.long_rate,
            short_rate: row.short_rate,
            category: category.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Symbol maps
// ---------------------------------------------------------------------------

/// Symbol-keyed quote map.
///
/// Used both for the per-source accumulation and for the run-wide master
/// map. Empty symbols are rejected on insert, so the map never holds an
/// empty key. Iteration is in ascending symbol order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QuoteMap {
    quotes: BTreeMap<String, Quote>,
}

/// Run-scoped map built by the orchestrator and consumed by reconciliation.
pub type MasterMap = QuoteMap;

impl QuoteMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite the quote for its symbol.
    ///
    /// Returns `false` (and stores nothing) if the symbol is empty.
    pub fn upsert(&mut self, quote: Quote) -> bool {
        if quote.symbol.is_empty() {
            return false;
        }
        self.quotes.insert(quote.symbol.clone(), quote);
        true
    }

    /// Merge another map into this one. Entries from `other` win.
    pub fn merge_from(&mut self, other: QuoteMap) -> usize {
        let mut overwritten = 0;
        for (symbol, quote) in other.quotes {
            if self.quotes.insert(symbol, quote).is_some() {
                overwritten += 1;
            }
        }
        overwritten
    }

    pub fn get(&self, symbol: &str) -> Option<&Quote> {
        self.quotes.get(symbol)
    }

    pub fn contains(&self, symbol: &str) -> bool {
        self.quotes.contains_key(symbol)
    }

    pub fn symbols(&self) -> impl Iterator<Item = &str> {
        self.quotes.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.quotes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.quotes.is_empty()
    }
}

impl FromIterator<Quote> for QuoteMap {
    fn from_iter<I: IntoIterator<Item = Quote>>(iter: I) -> Self {
        let mut map = QuoteMap::new();
        for quote in iter {
            map.upsert(quote);
        }
        map
    }
}

// ---------------------------------------------------------------------------
// Source configuration
// ---------------------------------------------------------------------------

/// How a source's table is read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionStrategy {
    /// Everything is on one page (possibly after expanding the table).
    SinglePage,
    /// The table is split over a fixed number of pages.
    Paginated,
}

impl fmt::Display for ExtractionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExtractionStrategy::SinglePage => write!(f, "single_page"),
            ExtractionStrategy::Paginated => write!(f, "paginated"),
        }
    }
}

/// Locates a cell inside a table row.
///
/// A string matches any `<td>` carrying that attribute value
/// (`data-xm-qa-name="currencyPair"`); a number is a zero-based column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellSelector {
    Column(usize),
    Attribute(String),
}

impl fmt::Display for CellSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellSelector::Column(i) => write!(f, "column {i}"),
            CellSelector::Attribute(a) => write!(f, "[{a}]"),
        }
    }
}

fn default_long_attribute() -> CellSelector {
    CellSelector::Attribute("swapLong".to_string())
}

fn default_short_attribute() -> CellSelector {
    CellSelector::Attribute("swapShort".to_string())
}

fn default_page_count() -> usize {
    1
}

fn default_strategy() -> ExtractionStrategy {
    ExtractionStrategy::SinglePage
}

/// Immutable description of one source page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDescriptor {
    pub name: String,
    /// Page URL. Paginated sources put `{page}` where the 1-based page
    /// number goes.
    pub url: String,
    /// Category stamped on every quote from this source ("Forex", "Metals").
    #[serde(default)]
    pub category: String,
    pub symbol_attribute: CellSelector,
    #[serde(default = "default_long_attribute")]
    pub long_attribute: CellSelector,
    #[serde(default = "default_short_attribute")]
    pub short_attribute: CellSelector,
    /// Upper bound on pages, fixed at configuration time.
    #[serde(default = "default_page_count")]
    pub page_count: usize,
    #[serde(default = "default_strategy", rename = "strategy")]
    pub extraction_strategy: ExtractionStrategy,
    /// Rows whose symbol contains any of these are header rows, not data.
    #[serde(default)]
    pub ignore_symbols: Vec<String>,
    /// Only read tables carrying this attribute value or class token
    /// (`DataTables_Table_0`, `tableCommon03`). All tables when unset.
    #[serde(default, rename = "table")]
    pub table_attribute: Option<String>,
}

impl SourceDescriptor {
    /// Number of pages the driver will visit at most.
    pub fn page_limit(&self) -> usize {
        match self.extraction_strategy {
            ExtractionStrategy::SinglePage => 1,
            ExtractionStrategy::Paginated => self.page_count,
        }
    }

    /// URL of the given 1-based page.
    pub fn page_url(&self, page: usize) -> String {
        self.url.replace("{page}", &page.to_string())
    }

    pub fn is_templated(&self) -> bool {
        self.url.contains("{page}")
    }

    /// Whether a symbol read from this source is really a header cell.
    pub fn is_ignored_symbol(&self, symbol: &str) -> bool {
        self.ignore_symbols.iter().any(|marker| symbol.contains(marker.as_str()))
    }

    /// Whether a row with this symbol is data worth keeping.
    pub fn keeps_symbol(&self, symbol: &str) -> bool {
        !symbol.is_empty() && !self.is_ignored_symbol(symbol)
    }

    /// Helper to build a test descriptor with sensible defaults.
    #[cfg(test)]
    pub fn sample(name: &str, pages: usize) -> Self {
        SourceDescriptor {
            name: name.to_string(),
            url: format!("https://broker.example.com/{name}?page={{page}}"),
            category: name.to_string(),
            symbol_attribute: CellSelector::Attribute("symbol".to_string()),
            long_attribute: default_long_attribute(),
            short_attribute: default_short_attribute(),
            page_count: pages,
            extraction_strategy: if pages > 1 {
                ExtractionStrategy::Paginated
            } else {
                ExtractionStrategy::SinglePage
            },
            ignore_symbols: Vec::new(),
            table_attribute: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Canonical order
// ---------------------------------------------------------------------------

/// Operator-curated instrument ordering. Validated once at startup and
/// never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalOrder {
    symbols: Vec<String>,
    known: HashSet<String>,
}

impl CanonicalOrder {
    /// Build a canonical order, rejecting empty lists, empty symbols and
    /// duplicates.
    pub fn new<I, S>(symbols: I) -> Result<Self, CollectorError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let symbols: Vec<String> = symbols.into_iter().map(Into::into).collect();
        if symbols.is_empty() {
            return Err(CollectorError::Config("canonical order is empty".to_string()));
        }

        let mut known = HashSet::with_capacity(symbols.len());
        for (i, symbol) in symbols.iter().enumerate() {
            if symbol.trim().is_empty() {
                return Err(CollectorError::Config(format!(
                    "canonical order entry {i} is empty"
                )));
            }
            if !known.insert(symbol.clone()) {
                return Err(CollectorError::Config(format!(
                    "duplicate symbol in canonical order: {symbol}"
                )));
            }
        }

        Ok(Self { symbols, known })
    }

    pub fn symbols(&self) -> &[String] {
        &self.symbols
    }

    pub fn contains(&self, symbol: &str) -> bool {
        self.known.contains(symbol)
    }
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// Where a snapshot row came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowKind {
    /// Canonical symbol with a collected quote.
    Quoted,
    /// Canonical symbol not seen on any source; rates are the placeholder.
    Missing,
    /// Symbol seen on a source but absent from the canonical order.
    Novel,
}

/// One output row of a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotRow {
    pub symbol: String,
    pub long_rate: String,
    pub short_rate: String,
    pub category: String,
    pub kind: RowKind,
}

impl SnapshotRow {
    pub fn quoted(quote: &Quote, kind: RowKind) -> Self {
        Self {
            symbol: quote.symbol.clone(),
            long_rate: quote.long_rate.clone(),
            short_rate: quote.short_rate.clone(),
            category: quote.category.clone(),
            kind,
        }
    }

    pub fn placeholder(symbol: &str, placeholder: &str) -> Self {
        Self {
            symbol: symbol.to_string(),
            long_rate: placeholder.to_string(),
            short_rate: placeholder.to_string(),
            category: String::new(),
            kind: RowKind::Missing,
        }
    }
}

/// One run's reconciled, ordered output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub id: String,
    pub taken_at: DateTime<Utc>,
    pub rows: Vec<SnapshotRow>,
    pub novel: Vec<String>,
}

impl Snapshot {
    /// Date-keyed snapshot identifier. Re-running on the same date yields
    /// the same id so persistence overwrites instead of duplicating.
    pub fn id_for(date: NaiveDate) -> String {
        date.format("%Y-%m-%d").to_string()
    }

    pub fn count(&self, kind: RowKind) -> usize {
        self.rows.iter().filter(|r| r.kind == kind).count()
    }
}

// ---------------------------------------------------------------------------
// Diagnostics
// ---------------------------------------------------------------------------

/// Per-source outcome of a collection run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceOutcome {
    Ok,
    /// Rows were kept but extraction stopped early.
    Partial(String),
    /// Nothing was collected after the retry.
    Failed(String),
}

impl SourceOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            SourceOutcome::Ok => "ok",
            SourceOutcome::Partial(_) => "partial",
            SourceOutcome::Failed(_) => "failed",
        }
    }
}

impl fmt::Display for SourceOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceOutcome::Ok => write!(f, "ok"),
            SourceOutcome::Partial(reason) => write!(f, "partial ({reason})"),
            SourceOutcome::Failed(reason) => write!(f, "failed ({reason})"),
        }
    }
}

/// Diagnostic record for one configured source.
#[derive(Debug, Clone)]
pub struct SourceReport {
    pub source: String,
    pub outcome: SourceOutcome,
    pub quotes: usize,
    pub pages_read: usize,
    pub skipped_rows: usize,
    pub attempts: u32,
    /// First few unreadable rows of the attempt that produced the outcome.
    pub error_samples: Vec<ExtractionError>,
}

impl fmt::Display for SourceReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} | quotes: {} | pages: {} | skipped: {} | attempts: {}",
            self.source, self.outcome, self.quotes, self.pages_read, self.skipped_rows, self.attempts,
        )
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// A single table row that could not be read.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("row {row}: {reason}")]
pub struct ExtractionError {
    /// 0-based row position on the page.
    pub row: usize,
    pub reason: String,
}

/// Why pagination of a source stopped before its configured page count.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PaginationError {
    #[error("page {to} did not replace page {from} within {waited_ms}ms")]
    TransitionTimeout { from: usize, to: usize, waited_ms: u64 },

    #[error("no control to reach page {to}")]
    ControlNotFound { to: usize },

    #[error("navigation to page {to} failed: {message}")]
    Navigation { to: usize, message: String },

    #[error("page {page} could not be read: {message}")]
    PageRead { page: usize, message: String },

    #[error("{skipped} unreadable rows exceeds the limit of {limit}")]
    TooManySkippedRows { skipped: usize, limit: usize },
}

/// Domain-specific error types for SWAPWATCH.
#[derive(Debug, thiserror::Error)]
pub enum CollectorError {
    #[error("Source {source_name} failed to load: {message}")]
    TransientLoad { source_name: String, message: String },

    #[error("Failed to persist snapshot {snapshot_id}: {message}")]
    Persistence { snapshot_id: String, message: String },

    #[error("Configuration error: {0}")]
    Config(String),
}

impl CollectorError {
    pub fn transient(source_name: &str, message: impl Into<String>) -> Self {
        CollectorError::TransientLoad {
            source_name: source_name.to_string(),
            message: message.into(),
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, CollectorError::TransientLoad { .. })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

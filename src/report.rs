//! Operator-facing output: the rendered snapshot table, the novel-symbol
//! banner, the per-source summary and outcome logging.

use std::fmt::Write as _;
use tracing::{info, warn};

use crate::types::{SnapshotRow, SourceOutcome, SourceReport};

const RED_BOLD: &str = "\x1b[1;91m";
const RESET: &str = "\x1b[0m";

/// Render rows as an aligned `Symbol | Long | Short` table.
pub fn render_table(rows: &[SnapshotRow]) -> String {
    let header = ("Symbol", "Long", "Short");
    let w_sym = column_width(rows, header.0, |r| r.symbol.as_str());
    let w_long = column_width(rows, header.1, |r| r.long_rate.as_str());
    let w_short = column_width(rows, header.2, |r| r.short_rate.as_str());

    let mut out = String::new();
    let _ = writeln!(
        out,
        "{} | {} | {}",
        pad(header.0, w_sym),
        pad(header.1, w_long),
        pad(header.2, w_short)
    );
    let _ = writeln!(
        out,
        "{}-+-{}-+-{}",
        "-".repeat(w_sym),
        "-".repeat(w_long),
        "-".repeat(w_short)
    );
    for row in rows {
        let _ = writeln!(
            out,
            "{} | {} | {}",
            pad(&row.symbol, w_sym),
            pad(&row.long_rate, w_long),
            pad(&row.short_rate, w_short)
        );
    }
    let _ = writeln!(out, "\nTotal Records: {}", rows.len());
    out
}

fn column_width(rows: &[SnapshotRow], title: &str, field: fn(&SnapshotRow) -> &str) -> usize {
    rows.iter()
        .map(|r| field(r).chars().count())
        .chain(std::iter::once(title.chars().count()))
        .max()
        .unwrap_or(0)
}

/// `format!("{:<w$}")` pads by chars, which is what we want for the
/// Japanese placeholder text too.
fn pad(s: &str, width: usize) -> String {
    format!("{s:<width$}")
}

/// Highlighted console block listing symbols missing from the canonical
/// order. Empty when there is nothing to report.
pub fn novel_banner(novel: &[String]) -> String {
    if novel.is_empty() {
        return String::new();
    }
    let mut out = format!("\n{RED_BOLD}NEW SYMBOL(S) SPOTTED!{RESET}\n");
    for symbol in novel {
        let _ = writeln!(out, "{RED_BOLD}-> {symbol}{RESET}");
    }
    out
}

/// One line per source, followed by the sampled unreadable rows of any
/// source that did not finish cleanly.
pub fn render_sources(reports: &[SourceReport]) -> String {
    let mut out = String::new();
    for report in reports {
        let _ = writeln!(out, "{report}");
        if report.outcome != SourceOutcome::Ok {
            for sample in &report.error_samples {
                let _ = writeln!(out, "    {sample}");
            }
        }
    }
    out
}

/// Emit the operator notification for one run: one warning per novel
/// symbol and one line per source outcome.
pub fn notify(novel: &[String], sources: &[SourceReport]) {
    for symbol in novel {
        warn!(symbol = %symbol, "New symbol on source, not in canonical order");
    }

    for report in sources {
        match &report.outcome {
            SourceOutcome::Ok => info!(
                source = %report.source,
                outcome = report.outcome.label(),
                quotes = report.quotes,
                pages = report.pages_read,
                skipped = report.skipped_rows,
                attempts = report.attempts,
                "Source collected"
            ),
            SourceOutcome::Partial(reason) | SourceOutcome::Failed(reason) => warn!(
                source = %report.source,
                outcome = report.outcome.label(),
                reason = %reason,
                quotes = report.quotes,
                pages = report.pages_read,
                skipped = report.skipped_rows,
                attempts = report.attempts,
                "Source incomplete"
            ),
        }

        if report.outcome != SourceOutcome::Ok {
            for sample in &report.error_samples {
                warn!(
                    source = %report.source,
                    row = sample.row,
                    reason = %sample.reason,
                    "Unreadable row"
                );
            }
        }
    }
}

//! Full-run tests: scripted sites through collection, reconciliation and
//! persistence.

use chrono::NaiveDate;
use mockall::mock;
use mockall::predicate::eq;
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

use async_trait::async_trait;
use swapwatch::config::AppConfig;
use swapwatch::engine::cycle::{run_cycle, CycleContext, RunReport};
use swapwatch::engine::fingerprint::RowHash;
use swapwatch::engine::orchestrator::{CollectionOrchestrator, CollectionSettings};
use swapwatch::engine::waiter::StabilityWaiter;
use swapwatch::storage::{load_snapshot, JsonSnapshotWriter, SnapshotWriter};
use swapwatch::types::*;

use crate::mock_sessions::{descriptor, page, ScriptedFactory, ScriptedSite};

const PLACEHOLDER: &str = "Web記載なし";

mock! {
    pub Writer {}

    #[async_trait]
    impl SnapshotWriter for Writer {
        async fn write(&self, snapshot_id: &str, rows: &[SnapshotRow]) -> Result<(), CollectorError>;
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn settings(parallel: bool) -> CollectionSettings {
    let poll = Duration::from_millis(250);
    CollectionSettings {
        ready: StabilityWaiter::new(Duration::from_secs(15), poll),
        transition: StabilityWaiter::new(Duration::from_secs(10), poll),
        max_skipped_rows: 25,
        retry_delay: Duration::from_secs(2),
        parallel,
    }
}

fn run_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 10, 15).unwrap()
}

fn canonical(symbols: &[&str]) -> CanonicalOrder {
    CanonicalOrder::new(symbols.iter().copied()).unwrap()
}

fn temp_dir() -> PathBuf {
    std::env::temp_dir().join(format!("swapwatch-it-{}", Uuid::new_v4()))
}

fn json_writer(dir: &PathBuf) -> JsonSnapshotWriter {
    let dir = dir.to_string_lossy().into_owned();
    JsonSnapshotWriter::new(Some(&dir))
}

fn accepting_writer() -> MockWriter {
    let mut writer = MockWriter::new();
    writer.expect_write().returning(|_, _| Ok(()));
    writer
}

async fn run(
    factory: &ScriptedFactory,
    sources: &[SourceDescriptor],
    canonical: &CanonicalOrder,
    writer: &dyn SnapshotWriter,
    parallel: bool,
) -> RunReport {
    let orchestrator = CollectionOrchestrator::new(factory, &RowHash, settings(parallel));
    let ctx = CycleContext {
        orchestrator: &orchestrator,
        sources,
        canonical,
        placeholder: PLACEHOLDER,
        writer,
    };
    run_cycle(&ctx, run_date()).await
}

fn row<'r>(report: &'r RunReport, symbol: &str) -> &'r SnapshotRow {
    report
        .snapshot
        .rows
        .iter()
        .find(|r| r.symbol == symbol)
        .unwrap_or_else(|| panic!("{symbol} missing from snapshot"))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_end_to_end_canonical_then_novel() {
    let factory = ScriptedFactory::new().with_site(
        "Forex",
        ScriptedSite::new(vec![page(&[("EURUSD", "0.5", "-1.2"), ("AUDUSD", "0.1", "-0.3")])]),
    );
    let sources = vec![descriptor("Forex", 1)];
    let order = canonical(&["USDJPY", "EURUSD", "GBPJPY"]);
    let dir = temp_dir();
    let writer = json_writer(&dir);

    let report = run(&factory, &sources, &order, &writer, false).await;

    let symbols: Vec<&str> = report.snapshot.rows.iter().map(|r| r.symbol.as_str()).collect();
    assert_eq!(symbols, vec!["USDJPY", "EURUSD", "GBPJPY", "AUDUSD"]);
    assert_eq!(row(&report, "USDJPY").long_rate, PLACEHOLDER);
    assert_eq!(row(&report, "USDJPY").kind, RowKind::Missing);
    assert_eq!(row(&report, "EURUSD").long_rate, "0.5");
    assert_eq!(row(&report, "EURUSD").short_rate, "-1.2");
    assert_eq!(row(&report, "GBPJPY").short_rate, PLACEHOLDER);
    assert_eq!(row(&report, "AUDUSD").kind, RowKind::Novel);
    assert_eq!(report.snapshot.novel, vec!["AUDUSD".to_string()]);
    assert!(report.persisted());

    let stored = load_snapshot(&dir, "2026-10-15").unwrap().unwrap();
    assert_eq!(stored.rows, report.snapshot.rows);
    assert_eq!(stored.header, vec!["Symbol", "Long", "Short"]);

    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test(start_paused = true)]
async fn test_every_source_failing_still_yields_placeholders() {
    // No scripted sites: every open is refused.
    let factory = ScriptedFactory::new();
    let sources = vec![descriptor("Forex", 1), descriptor("Metals", 1)];
    let order = canonical(&["USDJPY", "EURUSD", "GOLD"]);
    let writer = accepting_writer();

    let report = run(&factory, &sources, &order, &writer, false).await;

    assert_eq!(report.snapshot.rows.len(), 3);
    assert!(report.snapshot.rows.iter().all(|r| r.kind == RowKind::Missing));
    assert!(report.snapshot.rows.iter().all(|r| r.long_rate == PLACEHOLDER));
    assert!(report.snapshot.novel.is_empty());

    assert_eq!(report.sources.len(), 2);
    for source in &report.sources {
        assert!(matches!(source.outcome, SourceOutcome::Failed(_)));
        assert_eq!(source.attempts, 2);
    }
    assert!(report.persisted());
}

#[tokio::test(start_paused = true)]
async fn test_stuck_third_page_keeps_first_two() {
    let pages = (1..=6)
        .map(|p| {
            let a = format!("P{p}A");
            let b = format!("P{p}B");
            page(&[(a.as_str(), "1", "-1"), (b.as_str(), "2", "-2")])
        })
        .collect();
    let factory = ScriptedFactory::new().with_site("Axiory", ScriptedSite::new(pages).stuck_at(2));
    let sources = vec![descriptor("Axiory", 6)];
    let order = canonical(&["P1A"]);
    let writer = accepting_writer();

    let report = run(&factory, &sources, &order, &writer, false).await;

    let source = &report.sources[0];
    assert_eq!(source.outcome.label(), "partial");
    assert_eq!(source.pages_read, 2);
    assert_eq!(source.quotes, 4);
    assert_eq!(source.attempts, 1);

    let mut novel = report.snapshot.novel.clone();
    novel.sort();
    assert_eq!(novel, vec!["P1B", "P2A", "P2B"]);
    assert!(report.snapshot.rows.iter().all(|r| !r.symbol.starts_with("P3")));
    assert_eq!(factory.site("Axiory").closes.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_later_source_wins_even_when_it_finishes_first() {
    for parallel in [false, true] {
        let factory = ScriptedFactory::new()
            .with_site(
                "Forex",
                ScriptedSite::new(vec![page(&[("GOLD", "forex-long", "forex-short")])])
                    .slow(Duration::from_secs(5)),
            )
            .with_site(
                "Metals",
                ScriptedSite::new(vec![page(&[("GOLD", "-54.1", "30.2")])]),
            );
        let sources = vec![descriptor("Forex", 1), descriptor("Metals", 1)];
        let order = canonical(&["GOLD"]);
        let writer = accepting_writer();

        let report = run(&factory, &sources, &order, &writer, parallel).await;

        let gold = row(&report, "GOLD");
        assert_eq!(gold.long_rate, "-54.1", "parallel = {parallel}");
        assert_eq!(gold.category, "Metals");
    }
}

#[tokio::test(start_paused = true)]
async fn test_load_failure_retried_with_fresh_session() {
    let factory = ScriptedFactory::new().with_site(
        "Indices",
        ScriptedSite::new(vec![page(&[("JP225Cash", "-3.18", "-1.02")])]).failing_opens(1),
    );
    let sources = vec![descriptor("Indices", 1)];
    let order = canonical(&["JP225Cash"]);
    let writer = accepting_writer();

    let report = run(&factory, &sources, &order, &writer, false).await;

    assert_eq!(report.sources[0].outcome, SourceOutcome::Ok);
    assert_eq!(report.sources[0].attempts, 2);
    let site = factory.site("Indices");
    assert_eq!(site.opens.load(Ordering::SeqCst), 2);
    assert_eq!(site.closes.load(Ordering::SeqCst), 1);
    assert_eq!(row(&report, "JP225Cash").long_rate, "-3.18");
}

#[tokio::test(start_paused = true)]
async fn test_header_row_never_reaches_snapshot() {
    let factory = ScriptedFactory::new().with_site(
        "Crypto",
        ScriptedSite::new(vec![page(&[
            ("商品/銘柄", "買い", "売り"),
            ("BTCUSD", "-20.1", "-15"),
            ("", "1", "1"),
        ])]),
    );
    let sources = vec![descriptor("Crypto", 1)];
    let order = canonical(&["BTCUSD"]);
    let writer = accepting_writer();

    let report = run(&factory, &sources, &order, &writer, false).await;

    assert_eq!(report.snapshot.rows.len(), 1);
    assert!(report.snapshot.novel.is_empty());
    assert_eq!(row(&report, "BTCUSD").kind, RowKind::Quoted);
}

#[tokio::test(start_paused = true)]
async fn test_persistence_failure_keeps_snapshot() {
    let factory = ScriptedFactory::new().with_site(
        "Forex",
        ScriptedSite::new(vec![page(&[("EURUSD", "0.5", "-1.2")])]),
    );
    let sources = vec![descriptor("Forex", 1)];
    let order = canonical(&["EURUSD", "USDJPY"]);

    let mut writer = MockWriter::new();
    writer
        .expect_write()
        .times(1)
        .returning(|id, _| {
            Err(CollectorError::Persistence {
                snapshot_id: id.to_string(),
                message: "quota exceeded".into(),
            })
        });

    let report = run(&factory, &sources, &order, &writer, false).await;

    assert!(!report.persisted());
    assert!(report
        .persistence_error
        .as_deref()
        .unwrap()
        .contains("quota exceeded"));
    assert_eq!(report.snapshot.rows.len(), 2);
    assert_eq!(row(&report, "EURUSD").long_rate, "0.5");
}

#[tokio::test(start_paused = true)]
async fn test_writer_receives_dated_id_and_ordered_rows() {
    let factory = ScriptedFactory::new().with_site(
        "Forex",
        ScriptedSite::new(vec![page(&[("USDJPY", "1.1", "-2.2"), ("ZARJPY", "0.1", "-0.1")])]),
    );
    let sources = vec![descriptor("Forex", 1)];
    let order = canonical(&["EURUSD", "USDJPY"]);

    let captured: Arc<Mutex<Vec<SnapshotRow>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = captured.clone();
    let mut writer = MockWriter::new();
    writer
        .expect_write()
        .with(eq("2026-10-15"), mockall::predicate::always())
        .times(1)
        .returning(move |_, rows| {
            sink.lock().unwrap().extend_from_slice(rows);
            Ok(())
        });

    let report = run(&factory, &sources, &order, &writer, false).await;
    assert!(report.persisted());

    let written = captured.lock().unwrap();
    let symbols: Vec<&str> = written.iter().map(|r| r.symbol.as_str()).collect();
    assert_eq!(symbols, vec!["EURUSD", "USDJPY", "ZARJPY"]);
}

#[tokio::test(start_paused = true)]
async fn test_same_day_rerun_overwrites_snapshot() {
    let dir = temp_dir();
    let writer = json_writer(&dir);
    let sources = vec![descriptor("Metals", 1)];
    let order = canonical(&["GOLD"]);

    let first = ScriptedFactory::new()
        .with_site("Metals", ScriptedSite::new(vec![page(&[("GOLD", "-50", "25")])]));
    run(&first, &sources, &order, &writer, false).await;

    let second = ScriptedFactory::new()
        .with_site("Metals", ScriptedSite::new(vec![page(&[("GOLD", "-54.1", "30.2")])]));
    run(&second, &sources, &order, &writer, false).await;

    let files: Vec<_> = std::fs::read_dir(&dir).unwrap().collect();
    assert_eq!(files.len(), 1);
    let stored = load_snapshot(&dir, "2026-10-15").unwrap().unwrap();
    assert_eq!(stored.rows[0].long_rate, "-54.1");

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn test_shipped_config_is_valid() {
    let cfg = AppConfig::load("config.toml").unwrap();
    let order = cfg.validate().unwrap();

    assert!(order.contains("USDJPY"));
    assert!(order.contains("GOLD"));
    let names: Vec<&str> = cfg.sources.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["Forex", "Indices", "Metals", "Energies", "Crypto"]);
    assert_eq!(cfg.collector.placeholder, PLACEHOLDER);
}

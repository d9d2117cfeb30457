//! One collection run: collect → reconcile → notify → persist.
//!
//! Collection and persistence fail independently. A writer error is
//! logged and recorded on the report; the snapshot it failed to store is
//! still returned to the caller.

use chrono::{NaiveDate, Utc};
use tracing::{error, info, Instrument};
use uuid::Uuid;

use crate::engine::orchestrator::CollectionOrchestrator;
use crate::engine::reconciler::reconcile;
use crate::report;
use crate::storage::SnapshotWriter;
use crate::types::{CanonicalOrder, RowKind, Snapshot, SourceDescriptor, SourceReport};

/// Everything a run produced.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: Uuid,
    pub snapshot: Snapshot,
    pub sources: Vec<SourceReport>,
    /// Set when the snapshot could not be written.
    pub persistence_error: Option<String>,
}

impl RunReport {
    pub fn persisted(&self) -> bool {
        self.persistence_error.is_none()
    }
}

/// Inputs fixed for the lifetime of the process.
pub struct CycleContext<'a> {
    pub orchestrator: &'a CollectionOrchestrator<'a>,
    pub sources: &'a [SourceDescriptor],
    pub canonical: &'a CanonicalOrder,
    pub placeholder: &'a str,
    pub writer: &'a dyn SnapshotWriter,
}

/// Run one full collection for `date`.
pub async fn run_cycle(ctx: &CycleContext<'_>, date: NaiveDate) -> RunReport {
    let run_id = Uuid::new_v4();
    let span = tracing::info_span!("run", %run_id, date = %date);

    async move {
        let collected = ctx.orchestrator.collect(ctx.sources).await;
        let reconciled = reconcile(&collected.master, ctx.canonical, ctx.placeholder);

        let snapshot = Snapshot {
            id: Snapshot::id_for(date),
            taken_at: Utc::now(),
            rows: reconciled.rows,
            novel: reconciled.novel,
        };

        report::notify(&snapshot.novel, &collected.reports);

        info!(
            snapshot_id = %snapshot.id,
            quotes = collected.master.len(),
            canonical_hits = snapshot.count(RowKind::Quoted),
            placeholders = snapshot.count(RowKind::Missing),
            novel = snapshot.novel.len(),
            "Snapshot reconciled"
        );

        let persistence_error = match ctx.writer.write(&snapshot.id, &snapshot.rows).await {
            Ok(()) => None,
            Err(e) => {
                error!(error = %e, "Snapshot not persisted; keeping it in memory");
                Some(e.to_string())
            }
        };

        RunReport {
            run_id,
            snapshot,
            sources: collected.reports,
            persistence_error,
        }
    }
    .instrument(span)
    .await
}

//! Snapshot persistence.
//!
//! Defines the `SnapshotWriter` seam and a JSON-file implementation that
//! stores one document per snapshot id. Writing the same id again replaces
//! the earlier document.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::types::{CollectorError, SnapshotRow};

/// Default snapshot directory.
const DEFAULT_SNAPSHOT_DIR: &str = "snapshots";

/// Column headers written alongside the rows.
pub const HEADER: [&str; 3] = ["Symbol", "Long", "Short"];

/// Persists reconciled rows under a date-derived id.
#[async_trait]
pub trait SnapshotWriter: Send + Sync {
    /// Write `rows` under `snapshot_id`, overwriting any earlier write
    /// with the same id.
    async fn write(&self, snapshot_id: &str, rows: &[SnapshotRow]) -> Result<(), CollectorError>;
}

/// On-disk document shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotDocument {
    pub id: String,
    pub written_at: DateTime<Utc>,
    pub header: Vec<String>,
    pub rows: Vec<SnapshotRow>,
}

/// Writes `<dir>/<snapshot_id>.json`.
#[derive(Debug, Clone)]
pub struct JsonSnapshotWriter {
    dir: PathBuf,
}

impl JsonSnapshotWriter {
    pub fn new(dir: Option<&str>) -> Self {
        Self {
            dir: PathBuf::from(dir.unwrap_or(DEFAULT_SNAPSHOT_DIR)),
        }
    }

    pub fn path_for(&self, snapshot_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", sanitize_id(snapshot_id)))
    }

    fn write_document(&self, snapshot_id: &str, rows: &[SnapshotRow]) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create {}", self.dir.display()))?;

        let doc = SnapshotDocument {
            id: snapshot_id.to_string(),
            written_at: Utc::now(),
            header: HEADER.iter().map(|h| h.to_string()).collect(),
            rows: rows.to_vec(),
        };
        let json = serde_json::to_string_pretty(&doc).context("Failed to serialise snapshot")?;

        // Write beside the target, then rename over it.
        let path = self.path_for(snapshot_id);
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json)
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        std::fs::rename(&tmp, &path)
            .with_context(|| format!("Failed to move snapshot into {}", path.display()))?;

        Ok(path)
    }
}

#[async_trait]
impl SnapshotWriter for JsonSnapshotWriter {
    async fn write(&self, snapshot_id: &str, rows: &[SnapshotRow]) -> Result<(), CollectorError> {
        let existed = self.path_for(snapshot_id).exists();
        let path = self
            .write_document(snapshot_id, rows)
            .map_err(|e| CollectorError::Persistence {
                snapshot_id: snapshot_id.to_string(),
                message: format!("{e:#}"),
            })?;

        if existed {
            info!(path = %path.display(), rows = rows.len(), "Snapshot for this date already existed, overwritten");
        } else {
            info!(path = %path.display(), rows = rows.len(), "Snapshot saved");
        }
        Ok(())
    }
}

/// Load a snapshot document back from disk.
/// Returns None if no snapshot with that id exists.
pub fn load_snapshot(dir: &Path, snapshot_id: &str) -> Result<Option<SnapshotDocument>> {
    let path = dir.join(format!("{}.json", sanitize_id(snapshot_id)));
    if !path.exists() {
        debug!(path = %path.display(), "No snapshot found");
        return Ok(None);
    }

    let json = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let doc = serde_json::from_str(&json)
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    Ok(Some(doc))
}

/// Snapshot ids become file names; keep them to a safe character set.
fn sanitize_id(id: &str) -> String {
    id.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '-' })
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! Page-content fingerprints.
//!
//! A page transition is confirmed when the fingerprint of the first row
//! changes. Which row fields are stable enough to fingerprint differs by
//! source, so the comparator is swappable.

use serde::Deserialize;
use sha2::{Digest, Sha256};

use crate::types::RawRow;

/// Reduces a row to a comparable fingerprint.
pub trait Fingerprinter: Send + Sync {
    fn fingerprint(&self, row: &RawRow) -> String;
}

/// SHA-256 over every field of the row.
#[derive(Debug, Clone, Copy, Default)]
pub struct RowHash;

impl Fingerprinter for RowHash {
    fn fingerprint(&self, row: &RawRow) -> String {
        let mut hasher = Sha256::new();
        for field in [&row.symbol, &row.long_rate, &row.short_rate] {
            hasher.update(field.as_bytes());
            hasher.update([0x1f]);
        }
        format!("{:x}", hasher.finalize())
    }
}

/// The symbol alone. Use when rate cells re-render independently of paging.
#[derive(Debug, Clone, Copy, Default)]
pub struct SymbolOnly;

impl Fingerprinter for SymbolOnly {
    fn fingerprint(&self, row: &RawRow) -> String {
        row.symbol.clone()
    }
}

/// Config-facing choice of fingerprinter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FingerprintKind {
    #[default]
    RowHash,
    Symbol,
}

impl FingerprintKind {
    pub fn build(self) -> Box<dyn Fingerprinter> {
        match self {
            FingerprintKind::RowHash => Box::new(RowHash),
            FingerprintKind::Symbol => Box::new(SymbolOnly),
        }
    }
}

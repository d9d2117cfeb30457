//! Canonical-order reconciliation.
//!
//! Pure function of the master map, the canonical order and the
//! placeholder text. The output starts with exactly one row per canonical
//! symbol in canonical order, then one row per novel symbol in ascending
//! order.

use crate::types::{CanonicalOrder, MasterMap, RowKind, SnapshotRow};

/// Ordered rows plus the novel symbols that need operator attention.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciliation {
    pub rows: Vec<SnapshotRow>,
    pub novel: Vec<String>,
}

pub fn reconcile(master: &MasterMap, canonical: &CanonicalOrder, placeholder: &str) -> Reconciliation {
    let mut rows = Vec::with_capacity(canonical.symbols().len() + master.len());

    for symbol in canonical.symbols() {
        let row = match master.get(symbol) {
            Some(quote) => SnapshotRow::quoted(quote, RowKind::Quoted),
            None => SnapshotRow::placeholder(symbol, placeholder),
        };
        rows.push(row);
    }

    // The master map iterates in ascending symbol order, so this is
    // already sorted and free of duplicates.
    let novel: Vec<String> = master
        .symbols()
        .filter(|s| !canonical.contains(s))
        .map(str::to_string)
        .collect();

    rows.extend(
        novel
            .iter()
            .filter_map(|s| master.get(s))
            .map(|quote| SnapshotRow::quoted(quote, RowKind::Novel)),
    );

    Reconciliation { rows, novel }
}

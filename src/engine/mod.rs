//! Core engine: stability waits, per-source pagination, multi-source
//! collection, and canonical reconciliation.

pub mod cycle;
pub mod fingerprint;
pub mod orchestrator;
pub mod paginator;
pub mod reconciler;
pub mod waiter;

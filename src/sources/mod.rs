//! Source page access.
//!
//! Defines the `PageExtractor` trait (one live, isolated session on one
//! source page) and the `SessionFactory` that hands out a fresh session per
//! source attempt. The HTTP implementation lives in `http`; the tolerant
//! table scanner it uses lives in `html`.

pub mod html;
pub mod http;

use anyhow::Result;
use async_trait::async_trait;

use crate::types::{RowResult, SourceDescriptor};

/// Read access to the rendered table of one source.
///
/// Every call reflects the live state at call time, so callers may poll
/// `fetch_page` repeatedly while waiting for a page to settle. Pages are
/// 1-based.
#[async_trait]
pub trait PageExtractor: Send + Sync {
    /// Rows currently rendered for `page`. Unreadable rows come back as
    /// `Err` entries rather than failing the whole call.
    async fn fetch_page(&self, source: &SourceDescriptor, page: usize) -> Result<Vec<RowResult>>;

    /// Whether a control to move past `page` exists.
    async fn has_next_page(&self, source: &SourceDescriptor, page: usize) -> Result<bool>;

    /// Ask the page to move from `page` to `page + 1`. Returns once the
    /// request is issued; the caller confirms the transition.
    async fn goto_next_page(&self, source: &SourceDescriptor, page: usize) -> Result<()>;

    /// Release the session. Called exactly once, on success or failure.
    async fn close(&self) -> Result<()>;
}

/// Opens isolated extraction sessions.
///
/// Each call must return a session sharing no mutable state with any
/// other session, so a retry always starts clean.
#[async_trait]
pub trait SessionFactory: Send + Sync {
    /// Open `source` and bring it to a ready state.
    async fn open(&self, source: &SourceDescriptor) -> Result<Box<dyn PageExtractor>>;
}

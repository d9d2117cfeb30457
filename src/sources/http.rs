//! HTTP page sessions.
//!
//! Each session owns its own `reqwest::Client` (and therefore its own
//! connection pool) plus the document it last loaded, so two
//! sessions never see each other's state. Paginated sources are reached
//! by substituting the page number into the source URL.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::sync::Mutex;
use std::time::Duration;
use tracing::debug;

use super::html::extract_rows;
use super::{PageExtractor, SessionFactory};
use crate::types::{RowResult, SourceDescriptor};

const DEFAULT_USER_AGENT: &str = "SWAPWATCH/0.1.0 (swap-rate-collector)";

// ---------------------------------------------------------------------------
// Factory
// ---------------------------------------------------------------------------

/// Opens one `HttpTableSession` per source attempt.
#[derive(Debug, Clone)]
pub struct HttpSessionFactory {
    page_load_timeout: Duration,
    user_agent: String,
}

impl HttpSessionFactory {
    pub fn new(page_load_timeout: Duration, user_agent: Option<String>) -> Self {
        Self {
            page_load_timeout,
            user_agent: user_agent.unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
        }
    }
}

#[async_trait]
impl SessionFactory for HttpSessionFactory {
    async fn open(&self, source: &SourceDescriptor) -> Result<Box<dyn PageExtractor>> {
        let http = Client::builder()
            .timeout(self.page_load_timeout)
            .user_agent(self.user_agent.as_str())
            .build()
            .context("Failed to build HTTP client for source session")?;

        let session = HttpTableSession {
            http,
            loaded: Mutex::new(None),
        };
        session.load(source, 1).await?;
        Ok(Box::new(session))
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct LoadedPage {
    page: usize,
    html: String,
}

/// A source page fetched over HTTP and held in memory.
pub struct HttpTableSession {
    http: Client,
    loaded: Mutex<Option<LoadedPage>>,
}

impl HttpTableSession {
    /// Fetch `page` of `source` and make it the current document.
    async fn load(&self, source: &SourceDescriptor, page: usize) -> Result<()> {
        let url = source.page_url(page);
        debug!(source = %source.name, page, url = %url, "Fetching page");

        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .with_context(|| format!("Request to {url} failed"))?;

        if !resp.status().is_success() {
            let status = resp.status();
            anyhow::bail!("{url} returned {status}");
        }

        let html = resp
            .text()
            .await
            .with_context(|| format!("Failed to read body of {url}"))?;

        self.set_document(page, html);
        Ok(())
    }

    fn set_document(&self, page: usize, html: String) {
        if let Ok(mut loaded) = self.loaded.lock() {
            *loaded = Some(LoadedPage { page, html });
        }
    }
}

#[async_trait]
impl PageExtractor for HttpTableSession {
    /// Rows of whatever document is currently loaded; `page` is only
    /// informational, matching how a live page behaves mid-transition.
    async fn fetch_page(&self, source: &SourceDescriptor, page: usize) -> Result<Vec<RowResult>> {
        let loaded = self
            .loaded
            .lock()
            .map_err(|_| anyhow::anyhow!("session state poisoned"))?;
        let doc = loaded
            .as_ref()
            .with_context(|| format!("No document loaded for {} page {page}", source.name))?;
        if doc.page != page {
            debug!(source = %source.name, requested = page, loaded = doc.page, "Reading previous document");
        }
        Ok(extract_rows(&doc.html, source))
    }

    async fn has_next_page(&self, source: &SourceDescriptor, _page: usize) -> Result<bool> {
        Ok(source.is_templated())
    }

    async fn goto_next_page(&self, source: &SourceDescriptor, page: usize) -> Result<()> {
        self.load(source, page + 1).await
    }

    async fn close(&self) -> Result<()> {
        if let Ok(mut loaded) = self.loaded.lock() {
            *loaded = None;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

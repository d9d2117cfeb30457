//! Scripted broker sites for integration testing.
//!
//! Provides a deterministic `SessionFactory` whose sessions serve fixed
//! pages from memory. Load failures, stuck page transitions and slow
//! sources are all controllable from test code, and every open/close is
//! counted.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use swapwatch::sources::{PageExtractor, SessionFactory};
use swapwatch::types::*;

/// Build a descriptor for a scripted site.
pub fn descriptor(name: &str, pages: usize) -> SourceDescriptor {
    SourceDescriptor {
        name: name.to_string(),
        url: format!("https://broker.test/{name}?page={{page}}"),
        category: name.to_string(),
        symbol_attribute: CellSelector::Attribute("symbol".into()),
        long_attribute: CellSelector::Attribute("swapLong".into()),
        short_attribute: CellSelector::Attribute("swapShort".into()),
        page_count: pages,
        extraction_strategy: if pages > 1 {
            ExtractionStrategy::Paginated
        } else {
            ExtractionStrategy::SinglePage
        },
        ignore_symbols: vec!["商品/銘柄".to_string()],
        table_attribute: None,
    }
}

/// A page of well-formed rows.
pub fn page(rows: &[(&str, &str, &str)]) -> Vec<RowResult> {
    rows.iter()
        .map(|(s, l, r)| Ok(RawRow::new(s, l, r)))
        .collect()
}

/// One simulated broker site.
pub struct ScriptedSite {
    pages: Vec<Vec<RowResult>>,
    /// Turning the page away from this page number silently does nothing.
    stuck_at: Option<usize>,
    /// Every fetch takes this long.
    delay: Duration,
    /// Opens that fail before one succeeds.
    open_failures: Mutex<u32>,
    pub opens: AtomicU32,
    pub closes: AtomicU32,
}

impl ScriptedSite {
    pub fn new(pages: Vec<Vec<RowResult>>) -> Self {
        Self {
            pages,
            stuck_at: None,
            delay: Duration::ZERO,
            open_failures: Mutex::new(0),
            opens: AtomicU32::new(0),
            closes: AtomicU32::new(0),
        }
    }

    pub fn stuck_at(mut self, page: usize) -> Self {
        self.stuck_at = Some(page);
        self
    }

    pub fn slow(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn failing_opens(self, n: u32) -> Self {
        *self.open_failures.lock().unwrap() = n;
        self
    }
}

/// Session factory over a set of scripted sites, keyed by source name.
/// Sources with no site fail to open every time.
#[derive(Default)]
pub struct ScriptedFactory {
    sites: HashMap<String, Arc<ScriptedSite>>,
}

impl ScriptedFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_site(mut self, name: &str, site: ScriptedSite) -> Self {
        self.sites.insert(name.to_string(), Arc::new(site));
        self
    }

    pub fn site(&self, name: &str) -> Arc<ScriptedSite> {
        self.sites[name].clone()
    }
}

#[async_trait]
impl SessionFactory for ScriptedFactory {
    async fn open(&self, source: &SourceDescriptor) -> Result<Box<dyn PageExtractor>> {
        let site = self
            .sites
            .get(&source.name)
            .cloned()
            .ok_or_else(|| anyhow!("connection refused: {}", source.url))?;
        site.opens.fetch_add(1, Ordering::SeqCst);

        {
            let mut failures = site.open_failures.lock().unwrap();
            if *failures > 0 {
                *failures -= 1;
                return Err(anyhow!("page load timed out"));
            }
        }

        Ok(Box::new(ScriptedSession {
            site,
            current: AtomicUsize::new(1),
        }))
    }
}

struct ScriptedSession {
    site: Arc<ScriptedSite>,
    current: AtomicUsize,
}

#[async_trait]
impl PageExtractor for ScriptedSession {
    async fn fetch_page(&self, _source: &SourceDescriptor, _page: usize) -> Result<Vec<RowResult>> {
        if !self.site.delay.is_zero() {
            tokio::time::sleep(self.site.delay).await;
        }
        let current = self.current.load(Ordering::SeqCst);
        Ok(self.site.pages.get(current - 1).cloned().unwrap_or_default())
    }

    async fn has_next_page(&self, _source: &SourceDescriptor, page: usize) -> Result<bool> {
        Ok(page < self.site.pages.len())
    }

    async fn goto_next_page(&self, _source: &SourceDescriptor, page: usize) -> Result<()> {
        if self.site.stuck_at != Some(page) {
            self.current.store(page + 1, Ordering::SeqCst);
        }
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.site.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

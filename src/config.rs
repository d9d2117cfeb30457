//! Configuration loading from TOML.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs. The
//! file carries the source list, the canonical instrument order, the
//! placeholder text and every timeout. It is loaded once at startup and
//! read-only afterwards; `validate` rejects anything that would make a run
//! meaningless before extraction starts.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::time::Duration;

use crate::engine::fingerprint::FingerprintKind;
use crate::engine::orchestrator::CollectionSettings;
use crate::engine::waiter::StabilityWaiter;
use crate::types::{CanonicalOrder, CollectorError, SourceDescriptor};

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub collector: CollectorConfig,
    #[serde(default)]
    pub timeouts: TimeoutsConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    pub canonical: CanonicalConfig,
    #[serde(default)]
    pub sources: Vec<SourceDescriptor>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CollectorConfig {
    pub name: String,
    /// Seconds between runs in loop mode.
    pub interval_secs: u64,
    /// Rate text for canonical symbols no source reported.
    pub placeholder: String,
    #[serde(default)]
    pub parallel_sources: bool,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    #[serde(default = "default_max_skipped_rows")]
    pub max_skipped_rows: usize,
    #[serde(default)]
    pub fingerprint: FingerprintKind,
    #[serde(default)]
    pub user_agent: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TimeoutsConfig {
    /// HTTP fetch of a single page.
    pub page_load_secs: u64,
    /// First page must show rows within this.
    pub element_wait_secs: u64,
    /// A page turn must land within this.
    pub transition_secs: u64,
    pub poll_interval_ms: u64,
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            page_load_secs: 25,
            element_wait_secs: 15,
            transition_secs: 10,
            poll_interval_ms: 250,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    pub snapshot_dir: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            snapshot_dir: "snapshots".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct CanonicalConfig {
    pub order: Vec<String>,
}

fn default_retry_delay_ms() -> u64 {
    2000
}

fn default_max_skipped_rows() -> usize {
    25
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        Self::parse(&contents).with_context(|| format!("Failed to parse config file: {path}"))
    }

    pub fn parse(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents)?;
        Ok(config)
    }

    /// Check everything that must hold before the first source is opened,
    /// returning the validated canonical order.
    pub fn validate(&self) -> Result<CanonicalOrder, CollectorError> {
        let canonical = CanonicalOrder::new(self.canonical.order.iter().cloned())?;

        if self.sources.is_empty() {
            return Err(CollectorError::Config("no sources configured".to_string()));
        }

        let mut names = HashSet::new();
        for source in &self.sources {
            if source.name.trim().is_empty() {
                return Err(CollectorError::Config("source with empty name".to_string()));
            }
            if !names.insert(source.name.as_str()) {
                return Err(CollectorError::Config(format!(
                    "duplicate source name: {}",
                    source.name
                )));
            }
            if source.page_count == 0 {
                return Err(CollectorError::Config(format!(
                    "source {} has page_count = 0",
                    source.name
                )));
            }
            if source.url.trim().is_empty() {
                return Err(CollectorError::Config(format!("source {} has no url", source.name)));
            }
        }

        if self.collector.placeholder.is_empty() {
            return Err(CollectorError::Config("placeholder must not be empty".to_string()));
        }

        Ok(canonical)
    }

    pub fn collection_settings(&self) -> CollectionSettings {
        let poll = Duration::from_millis(self.timeouts.poll_interval_ms);
        CollectionSettings {
            ready: StabilityWaiter::new(Duration::from_secs(self.timeouts.element_wait_secs), poll),
            transition: StabilityWaiter::new(Duration::from_secs(self.timeouts.transition_secs), poll),
            max_skipped_rows: self.collector.max_skipped_rows,
            retry_delay: Duration::from_millis(self.collector.retry_delay_ms),
            parallel: self.collector.parallel_sources,
        }
    }

    pub fn page_load_timeout(&self) -> Duration {
        Duration::from_secs(self.timeouts.page_load_secs)
    }
}

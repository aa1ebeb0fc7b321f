// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Mirror configuration: the validated runtime form consumed by the engine and
// the persisted JSON settings it is built from.

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ConfigError, Result};

/// Default time between polling cycles.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Runtime configuration of one engine run. Immutable once the run started.
#[derive(Debug, Clone, PartialEq)]
pub struct MirrorConfig {
    /// Source queues, polled in this order every cycle.
    pub sources: Vec<String>,
    /// Queue every new job is relayed to.
    pub destination: String,
    pub poll_interval: Duration,
    /// Upper bound on relays running at the same time within a cycle.
    pub max_concurrent_relays: usize,
    /// Maximum number of fingerprints remembered; oldest are evicted first.
    pub fingerprint_capacity: usize,
    /// Mark jobs already queued at start-up as seen instead of relaying them.
    pub skip_existing_jobs: bool,
    /// Wait before reading a freshly dispatched job's payload.
    pub settle_delay: Duration,
    /// Extra attempts for payload reads that failed transiently.
    pub read_retries: u32,
    /// Base delay of the read retry backoff.
    pub retry_base_delay: Duration,
    /// Number of outcome records kept for status reporting.
    pub history_len: usize,
}

impl MirrorConfig {
    /// Configuration with default tuning for the given queues.
    pub fn new(sources: Vec<String>, destination: impl Into<String>) -> Self {
        Self {
            sources,
            destination: destination.into(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_concurrent_relays: 4,
            fingerprint_capacity: 10_000,
            skip_existing_jobs: true,
            settle_delay: Duration::from_secs(1),
            read_retries: 3,
            retry_base_delay: Duration::from_millis(500),
            history_len: 50,
        }
    }

    /// Check every invariant the engine relies on.
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.sources.is_empty() {
            return Err(ConfigError::NoSources);
        }
        if self.destination.trim().is_empty() || self.sources.iter().any(|s| s.trim().is_empty()) {
            return Err(ConfigError::BlankQueueName);
        }

        let mut seen = HashSet::with_capacity(self.sources.len());
        for source in &self.sources {
            if !seen.insert(source.as_str()) {
                return Err(ConfigError::DuplicateSource(source.clone()));
            }
        }

        // Self-loop guard.
        if seen.contains(self.destination.as_str()) {
            return Err(ConfigError::DestinationIsSource(self.destination.clone()));
        }

        if self.poll_interval.is_zero() {
            return Err(ConfigError::ZeroPollInterval);
        }
        if self.max_concurrent_relays == 0 {
            return Err(ConfigError::ZeroConcurrency);
        }
        if self.fingerprint_capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        Ok(())
    }
}

/// Persistent mirror settings, stored as JSON.
///
/// Key names follow the service's historical config file so existing files
/// keep loading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MirrorSettings {
    pub source_printers: Vec<String>,
    pub dest_printer: String,
    /// Poll interval in seconds.
    pub interval: f64,
    pub skip_existing_jobs: bool,
    /// Settle delay in seconds.
    pub settle_delay: f64,
    pub max_concurrent_relays: usize,
    pub read_retries: u32,
    pub fingerprint_capacity: usize,
}

impl Default for MirrorSettings {
    fn default() -> Self {
        Self {
            source_printers: Vec::new(),
            dest_printer: String::new(),
            interval: 1.0,
            skip_existing_jobs: true,
            settle_delay: 1.0,
            max_concurrent_relays: 4,
            read_retries: 3,
            fingerprint_capacity: 10_000,
        }
    }
}

impl MirrorSettings {
    /// Load settings from `path`, falling back to defaults when the file does
    /// not exist. Missing keys take their default value.
    ///
    /// Files written before multi-source support carry a single
    /// `source_printer` string; it is promoted to `source_printers`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            debug!(path = %path.display(), "no settings file, using defaults");
            return Ok(Self::default());
        }

        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Parse settings from JSON text.
    pub fn from_json(text: &str) -> Result<Self> {
        let mut value: serde_json::Value = serde_json::from_str(text)?;

        if let Some(obj) = value.as_object_mut() {
            if !obj.contains_key("source_printers") {
                if let Some(legacy) = obj.remove("source_printer") {
                    obj.insert(
                        "source_printers".into(),
                        serde_json::Value::Array(vec![legacy]),
                    );
                }
            }
        }

        Ok(serde_json::from_value(value)?)
    }

    /// Write settings to `path` as pretty JSON, creating parent directories.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        debug!(path = %path.display(), "settings saved");
        Ok(())
    }

    /// Build and validate the runtime configuration.
    pub fn to_mirror_config(&self) -> std::result::Result<MirrorConfig, ConfigError> {
        let poll_interval = seconds(self.interval)?;
        let settle_delay = seconds(self.settle_delay)?;

        let config = MirrorConfig {
            poll_interval,
            settle_delay,
            skip_existing_jobs: self.skip_existing_jobs,
            max_concurrent_relays: self.max_concurrent_relays,
            read_retries: self.read_retries,
            fingerprint_capacity: self.fingerprint_capacity,
            ..MirrorConfig::new(
                self.source_printers
                    .iter()
                    .map(|s| s.trim().to_string())
                    .collect(),
                self.dest_printer.trim(),
            )
        };
        config.validate()?;
        Ok(config)
    }
}

fn seconds(secs: f64) -> std::result::Result<Duration, ConfigError> {
    Duration::try_from_secs_f64(secs)
        .map_err(|e| ConfigError::InvalidInterval(format!("{secs}: {e}")))
}

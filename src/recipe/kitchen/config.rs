// src/recipe/kitchen/config.rs

//! Configuration types for the Kitchen

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Configuration for the Kitchen
///
/// Loaded from the `[kitchen]` table of `crossbake.toml`; every field has a
/// default so the table may be omitted entirely.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KitchenConfig {
    /// Number of attempts for a transient fetch failure
    pub fetch_retries: u32,
    /// Base delay between fetch attempts; grows linearly with the attempt
    pub fetch_retry_delay_ms: u64,
    /// Per-request HTTP timeout
    pub http_timeout_secs: u64,
    /// Upper bound on any single external tool invocation
    pub tool_timeout_secs: u64,
    /// Number of parallel make jobs inside one build
    pub jobs: usize,
    /// Ignore the skip rule and rebuild everything
    pub force_rebuild: bool,
    /// Log every tool output line at info level
    pub verbose: bool,
    /// Strip collected libraries into a separate directory when assembling
    pub strip_libraries: bool,
    /// Extra host PATH entries prepended for tool lookup
    pub extra_path: Vec<PathBuf>,
}

impl Default for KitchenConfig {
    fn default() -> Self {
        let jobs = std::thread::available_parallelism()
            .map(|p| p.get())
            .unwrap_or(4);

        Self {
            fetch_retries: 3,
            fetch_retry_delay_ms: 1000,
            http_timeout_secs: 30,
            tool_timeout_secs: 3600, // 1 hour
            jobs,
            force_rebuild: false,
            verbose: false,
            strip_libraries: true,
            extra_path: Vec::new(),
        }
    }
}

impl KitchenConfig {
    /// Create a configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of fetch attempts
    pub fn with_fetch_retries(mut self, retries: u32) -> Self {
        self.fetch_retries = retries.max(1);
        self
    }

    /// Set the base retry delay
    pub fn with_fetch_retry_delay(mut self, delay: Duration) -> Self {
        self.fetch_retry_delay_ms = delay.as_millis() as u64;
        self
    }

    /// Set the tool timeout
    pub fn with_tool_timeout(mut self, timeout: Duration) -> Self {
        self.tool_timeout_secs = timeout.as_secs().max(1);
        self
    }

    /// Set number of parallel jobs
    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs.max(1);
        self
    }

    /// Rebuild even when the skip rule would apply
    pub fn with_force_rebuild(mut self, force: bool) -> Self {
        self.force_rebuild = force;
        self
    }

    /// Enable verbose tool output
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn fetch_retry_delay(&self) -> Duration {
        Duration::from_millis(self.fetch_retry_delay_ms)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.tool_timeout_secs)
    }
}

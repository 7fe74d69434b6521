//! Sync engine configuration.

use crate::error::{SyncError, SyncResult};
use reportsync_storage::DEFAULT_STORE_KEY;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the queue and sync engine.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Automatic attempts before an item is left for manual intervention.
    pub max_retries: u32,

    /// Pause between item submissions within one pass (milliseconds).
    pub inter_item_delay_ms: u64,

    /// Period of the background sync timer (seconds).
    pub sync_interval_secs: u64,

    /// Key the queue document is stored under.
    pub store_key: String,

    /// Cross-process pass lease duration (seconds). 0 disables the lease.
    pub lease_ttl_secs: u64,

    /// Optional upper bound on a single submit call (seconds).
    pub submit_timeout_secs: Option<u64>,

    /// Treat a failed attachment upload as a failure of the whole item.
    pub fail_on_attachment_error: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            inter_item_delay_ms: 1000,
            sync_interval_secs: 30,
            store_key: DEFAULT_STORE_KEY.to_string(),
            lease_ttl_secs: 300,
            submit_timeout_secs: None,
            fail_on_attachment_error: false,
        }
    }
}

impl SyncConfig {
    /// Parses a (possibly partial) JSON config; missing fields take defaults.
    pub fn from_json(raw: &str) -> SyncResult<Self> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> SyncResult<()> {
        if self.max_retries == 0 {
            return Err(SyncError::Config("max_retries must be at least 1".into()));
        }
        if self.sync_interval_secs == 0 {
            return Err(SyncError::Config(
                "sync_interval_secs must be at least 1".into(),
            ));
        }
        if self.store_key.trim().is_empty() {
            return Err(SyncError::Config("store_key must not be empty".into()));
        }
        if self.submit_timeout_secs == Some(0) {
            return Err(SyncError::Config(
                "submit_timeout_secs must be positive when set".into(),
            ));
        }
        Ok(())
    }

    pub fn inter_item_delay(&self) -> Duration {
        Duration::from_millis(self.inter_item_delay_ms)
    }

    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval_secs)
    }

    pub fn lease_ttl(&self) -> Option<Duration> {
        (self.lease_ttl_secs > 0).then(|| Duration::from_secs(self.lease_ttl_secs))
    }

    pub fn submit_timeout(&self) -> Option<Duration> {
        self.submit_timeout_secs.map(Duration::from_secs)
    }
}

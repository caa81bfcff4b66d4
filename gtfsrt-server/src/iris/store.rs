//! Keyed retention of realtime items.
//!
//! Plans and changes are stored one item per key, keyed by their raw
//! composite id, so rewrites of the same timetable stop overwrite each
//! other and the newest version wins. Reads address a whole trip
//! instance via the id prefix. A plan stays relevant for the service
//! day plus a grace period; a change is superseded quickly and expires
//! after minutes, which is also what removes applied changes.

use std::sync::Arc;
use std::time::Duration;

use chrono::{Days, Utc};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::domain::{PartialStopId, ServiceDate, compare_by_sequence};
use crate::kv::{KeyValueStore, KvError};

use super::types::{IrisChangeItem, IrisPlanItem};

/// Retention for plans whose expiry instant cannot be computed.
const FALLBACK_PLAN_TTL: Duration = Duration::from_secs(48 * 60 * 60);

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error(transparent)]
    Kv(#[from] KvError),
    #[error("stored item is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("more than {cap} stored items in range `{prefix}`")]
    RangeOverflow { prefix: String, cap: usize },
}

#[derive(Debug, Clone)]
pub struct RealtimeItemStoreConfig {
    /// Namespace for all keys. Must not contain `-`, otherwise keys no
    /// longer sort by stop sequence.
    pub key_prefix: String,
    /// Upper bound on the number of items a single trip instance may
    /// have in store; exceeding it fails the read.
    pub scan_cap: usize,
    /// How many days past the start of its service day a plan is kept.
    pub plan_retention_days: u64,
    pub change_ttl: Duration,
}

impl RealtimeItemStoreConfig {
    pub fn new() -> Self {
        Self {
            key_prefix: "iris:".to_string(),
            scan_cap: 200,
            plan_retention_days: 2,
            change_ttl: Duration::from_secs(15 * 60),
        }
    }
}

impl Default for RealtimeItemStoreConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Store for decoded realtime items, on top of any [`KeyValueStore`].
pub struct RealtimeItemStore<K> {
    kv: Arc<K>,
    config: RealtimeItemStoreConfig,
}

impl<K: KeyValueStore> RealtimeItemStore<K> {
    pub fn new(kv: Arc<K>) -> Self {
        Self::with_config(kv, RealtimeItemStoreConfig::new())
    }

    pub fn with_config(kv: Arc<K>, config: RealtimeItemStoreConfig) -> Self {
        Self { kv, config }
    }

    pub async fn put_plan(&self, item: &IrisPlanItem) -> Result<(), StoreError> {
        let key = format!("{}{}", self.plans_prefix(), item.raw_id);
        let json = serde_json::to_string(item)?;
        let ttl = plan_ttl(item.service_date, self.config.plan_retention_days);
        self.kv.set(&key, &json, Some(ttl)).await?;
        Ok(())
    }

    pub async fn put_change(&self, item: &IrisChangeItem) -> Result<(), StoreError> {
        let key = format!("{}{}", self.changes_prefix(), item.raw_id);
        let json = serde_json::to_string(item)?;
        self.kv.set(&key, &json, Some(self.config.change_ttl)).await?;
        Ok(())
    }

    /// All stored plans of a trip-instance range, ordered by stop
    /// sequence.
    pub async fn read_plans(&self, range: &PartialStopId) -> Result<Vec<IrisPlanItem>, StoreError> {
        self.read_items(&self.plans_prefix(), range).await
    }

    /// All stored changes of a trip-instance range, ordered by stop
    /// sequence.
    pub async fn read_changes(
        &self,
        range: &PartialStopId,
    ) -> Result<Vec<IrisChangeItem>, StoreError> {
        self.read_items(&self.changes_prefix(), range).await
    }

    fn plans_prefix(&self) -> String {
        format!("{}plans:", self.config.key_prefix)
    }

    fn changes_prefix(&self) -> String {
        format!("{}changes:", self.config.key_prefix)
    }

    async fn read_items<T: DeserializeOwned>(
        &self,
        kind_prefix: &str,
        range: &PartialStopId,
    ) -> Result<Vec<T>, StoreError> {
        let prefix = format!("{kind_prefix}{}", range.format());
        let scan = self.kv.scan_prefix(&prefix, self.config.scan_cap).await?;
        if scan.truncated {
            return Err(StoreError::RangeOverflow {
                prefix,
                cap: self.config.scan_cap,
            });
        }
        // Keys embed the raw id, so they sort by stop sequence as-is.
        let mut keys = scan.keys;
        keys.sort_by(|a, b| compare_by_sequence(a, b));
        let values = self.kv.get_many(&keys).await?;
        let mut items = Vec::with_capacity(keys.len());
        for (key, value) in keys.iter().zip(values) {
            match value {
                Some(json) => items.push(serde_json::from_str(&json)?),
                // Expired between the scan and the read.
                None => debug!(key, "stored item vanished during read"),
            }
        }
        Ok(items)
    }
}

/// Time until the local midnight `retention_days` after the start of the
/// service day.
fn plan_ttl(service_date: ServiceDate, retention_days: u64) -> Duration {
    let expiry = service_date
        .date()
        .checked_add_days(Days::new(retention_days))
        .map(ServiceDate::new)
        .and_then(|date| date.start_of_day());
    match expiry {
        Some(expiry) => expiry
            .signed_duration_since(Utc::now())
            .to_std()
            .unwrap_or(Duration::ZERO),
        None => FALLBACK_PLAN_TTL,
    }
}

//! Key-value state backend.
//!
//! Realtime items and consumer cursors live in a shared key-value store
//! with optional per-key expiry. The trait is deliberately small: get,
//! multi-get, set-with-ttl and a capped prefix scan are all the pipeline
//! needs, and all of them map directly onto the usual networked stores.
//! The bundled in-memory backend keeps the same semantics for tests and
//! single-process deployments.

use std::collections::BTreeMap;
use std::future::Future;
use std::ops::Bound;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::time::Instant;

/// Error from the key-value backend.
#[derive(Debug, thiserror::Error)]
#[error("key-value store operation failed: {reason}")]
pub struct KvError {
    reason: String,
}

impl KvError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Result of a capped prefix scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanResult {
    /// Matching keys, in no guaranteed order.
    pub keys: Vec<String>,
    /// True when more keys matched than the cap allowed to return.
    pub truncated: bool,
}

pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<String>, KvError>> + Send;

    /// Looks up many keys at once; the result has one slot per requested
    /// key, in request order.
    fn get_many(
        &self,
        keys: &[String],
    ) -> impl Future<Output = Result<Vec<Option<String>>, KvError>> + Send;

    /// Writes a value, replacing any previous one. A ttl of `None` means
    /// the key never expires.
    fn set(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> impl Future<Output = Result<(), KvError>> + Send;

    /// Collects up to `limit` live keys starting with `prefix`.
    fn scan_prefix(
        &self,
        prefix: &str,
        limit: usize,
    ) -> impl Future<Output = Result<ScanResult, KvError>> + Send;
}

#[derive(Debug)]
struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// In-memory [`KeyValueStore`].
///
/// Expired entries are skipped on read but only reclaimed when
/// overwritten, which is fine for the workloads this backend serves.
#[derive(Debug, Default)]
pub struct InMemoryKv {
    entries: RwLock<BTreeMap<String, Entry>>,
}

impl InMemoryKv {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for InMemoryKv {
    async fn get(&self, key: &str) -> Result<Option<String>, KvError> {
        let now = Instant::now();
        let entries = self.entries.read().await;
        Ok(entries
            .get(key)
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| entry.value.clone()))
    }

    async fn get_many(&self, keys: &[String]) -> Result<Vec<Option<String>>, KvError> {
        let now = Instant::now();
        let entries = self.entries.read().await;
        Ok(keys
            .iter()
            .map(|key| {
                entries
                    .get(key)
                    .filter(|entry| !entry.is_expired(now))
                    .map(|entry| entry.value.clone())
            })
            .collect())
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), KvError> {
        let entry = Entry {
            value: value.to_string(),
            expires_at: ttl.map(|ttl| Instant::now() + ttl),
        };
        let mut entries = self.entries.write().await;
        entries.insert(key.to_string(), entry);
        Ok(())
    }

    async fn scan_prefix(&self, prefix: &str, limit: usize) -> Result<ScanResult, KvError> {
        let now = Instant::now();
        let entries = self.entries.read().await;
        let mut keys = Vec::new();
        let mut truncated = false;
        let range = entries.range::<String, _>((Bound::Included(&prefix.to_string()), Bound::Unbounded));
        for (key, entry) in range {
            if !key.starts_with(prefix) {
                break;
            }
            if entry.is_expired(now) {
                continue;
            }
            if keys.len() == limit {
                truncated = true;
                break;
            }
            keys.push(key.clone());
        }
        Ok(ScanResult { keys, truncated })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_then_get_round_trips() {
        let kv = InMemoryKv::new();
        kv.set("a", "1", None).await.unwrap();
        assert_eq!(kv.get("a").await.unwrap(), Some("1".to_string()));
        assert_eq!(kv.get("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn later_writes_replace_earlier_ones() {
        let kv = InMemoryKv::new();
        kv.set("a", "1", None).await.unwrap();
        kv.set("a", "2", None).await.unwrap();
        assert_eq!(kv.get("a").await.unwrap(), Some("2".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn keys_expire_after_their_ttl() {
        let kv = InMemoryKv::new();
        kv.set("a", "1", Some(Duration::from_secs(60))).await.unwrap();
        kv.set("b", "2", None).await.unwrap();

        tokio::time::advance(Duration::from_secs(59)).await;
        assert_eq!(kv.get("a").await.unwrap(), Some("1".to_string()));

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(kv.get("a").await.unwrap(), None);
        assert_eq!(kv.get("b").await.unwrap(), Some("2".to_string()));
    }

    #[tokio::test]
    async fn get_many_preserves_request_order() {
        let kv = InMemoryKv::new();
        kv.set("a", "1", None).await.unwrap();
        kv.set("c", "3", None).await.unwrap();
        let got = kv
            .get_many(&["c".to_string(), "b".to_string(), "a".to_string()])
            .await
            .unwrap();
        assert_eq!(
            got,
            vec![Some("3".to_string()), None, Some("1".to_string())]
        );
    }

    #[tokio::test]
    async fn scan_prefix_returns_only_matching_keys() {
        let kv = InMemoryKv::new();
        kv.set("plans:x", "1", None).await.unwrap();
        kv.set("plans:y", "2", None).await.unwrap();
        kv.set("changes:x", "3", None).await.unwrap();

        let scan = kv.scan_prefix("plans:", 10).await.unwrap();
        assert!(!scan.truncated);
        assert_eq!(scan.keys, vec!["plans:x".to_string(), "plans:y".to_string()]);
    }

    #[tokio::test]
    async fn scan_prefix_reports_truncation() {
        let kv = InMemoryKv::new();
        for i in 0..5 {
            kv.set(&format!("k:{i}"), "v", None).await.unwrap();
        }
        let scan = kv.scan_prefix("k:", 3).await.unwrap();
        assert!(scan.truncated);
        assert_eq!(scan.keys.len(), 3);

        let scan = kv.scan_prefix("k:", 5).await.unwrap();
        assert!(!scan.truncated);
    }

    #[tokio::test(start_paused = true)]
    async fn scan_prefix_skips_expired_keys() {
        let kv = InMemoryKv::new();
        kv.set("k:live", "v", None).await.unwrap();
        kv.set("k:gone", "v", Some(Duration::from_secs(1))).await.unwrap();
        tokio::time::advance(Duration::from_secs(2)).await;

        let scan = kv.scan_prefix("k:", 10).await.unwrap();
        assert_eq!(scan.keys, vec!["k:live".to_string()]);
    }
}

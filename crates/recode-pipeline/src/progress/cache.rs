use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

use recode_core::models::ProgressEntry;

/// Ephemeral-tier errors. The tier is allowed to be unavailable; callers
/// absorb these and degrade to the durable fallback.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Progress cache unavailable: {0}")]
    Unavailable(String),
}

/// The ephemeral progress tier: low latency, TTL-bounded, loses data
/// across restarts.
#[async_trait]
pub trait ProgressCache: Send + Sync {
    async fn put(&self, entry: ProgressEntry) -> Result<(), CacheError>;

    /// An expired entry is reported as absent, never revived.
    async fn get(&self, job_id: Uuid) -> Result<Option<ProgressEntry>, CacheError>;

    async fn remove(&self, job_id: Uuid) -> Result<(), CacheError>;

    /// Removes entries whose TTL has elapsed, returning how many.
    async fn sweep_expired(&self) -> Result<u64, CacheError>;
}

/// In-process TTL map. The default ephemeral tier for single-node
/// deployments and tests.
#[derive(Clone, Default)]
pub struct MemoryProgressCache {
    entries: Arc<RwLock<HashMap<Uuid, ProgressEntry>>>,
}

impl MemoryProgressCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProgressCache for MemoryProgressCache {
    async fn put(&self, entry: ProgressEntry) -> Result<(), CacheError> {
        self.entries.write().await.insert(entry.job_id, entry);
        Ok(())
    }

    async fn get(&self, job_id: Uuid) -> Result<Option<ProgressEntry>, CacheError> {
        let entries = self.entries.read().await;
        Ok(entries
            .get(&job_id)
            .filter(|e| !e.is_expired(Utc::now()))
            .cloned())
    }

    async fn remove(&self, job_id: Uuid) -> Result<(), CacheError> {
        self.entries.write().await.remove(&job_id);
        Ok(())
    }

    async fn sweep_expired(&self) -> Result<u64, CacheError> {
        let now = Utc::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, e| !e.is_expired(now));
        Ok((before - entries.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[tokio::test]
    async fn test_put_get_remove() {
        let cache = MemoryProgressCache::new();
        let entry = ProgressEntry::new(Uuid::new_v4(), 3600);
        let id = entry.job_id;

        cache.put(entry).await.unwrap();
        assert!(cache.get(id).await.unwrap().is_some());

        cache.remove(id).await.unwrap();
        assert!(cache.get(id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_expired_entry_is_absent() {
        let cache = MemoryProgressCache::new();
        let mut entry = ProgressEntry::new(Uuid::new_v4(), 3600);
        let id = entry.job_id;
        entry.expires_at = Utc::now() - Duration::seconds(1);

        cache.put(entry).await.unwrap();
        assert!(cache.get(id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_sweep_removes_only_expired() {
        let cache = MemoryProgressCache::new();

        let live = ProgressEntry::new(Uuid::new_v4(), 3600);
        let live_id = live.job_id;
        cache.put(live).await.unwrap();

        let mut stale = ProgressEntry::new(Uuid::new_v4(), 3600);
        stale.expires_at = Utc::now() - Duration::seconds(1);
        cache.put(stale).await.unwrap();

        assert_eq!(cache.sweep_expired().await.unwrap(), 1);
        assert!(cache.get(live_id).await.unwrap().is_some());
    }
}

//! Injectable page cache with per-entry TTL.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Mutex;

use screener_core::types::DbId;

use crate::api::ResultsPage;

/// Cache key: one page at one detail level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PageKey {
    pub batch_id: DbId,
    pub page: i64,
    pub heavy: bool,
}

/// Page cache seam. Implementations decide residency and expiry; the
/// loader only promises to consult `get` before fetching and to `evict`
/// a batch when its summary shows new terminal activity.
#[async_trait]
pub trait ResultCache: Send + Sync {
    async fn get(&self, key: &PageKey) -> Option<ResultsPage>;
    async fn set(&self, key: PageKey, page: ResultsPage);
    async fn evict(&self, batch_id: DbId);
}

struct Entry {
    page: ResultsPage,
    inserted_at: Instant,
}

/// In-memory cache with lazy expiry: entries past their TTL are dropped
/// on access, not by a sweeper task.
pub struct MemoryCache {
    ttl: Duration,
    entries: Mutex<HashMap<PageKey, Entry>>,
}

/// Default page TTL.
pub const DEFAULT_TTL: Duration = Duration::from_secs(30);

impl MemoryCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

#[async_trait]
impl ResultCache for MemoryCache {
    async fn get(&self, key: &PageKey) -> Option<ResultsPage> {
        let mut entries = self.entries.lock().await;
        match entries.get(key) {
            Some(entry) if entry.inserted_at.elapsed() < self.ttl => Some(entry.page.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    async fn set(&self, key: PageKey, page: ResultsPage) {
        let mut entries = self.entries.lock().await;
        entries.insert(
            key,
            Entry {
                page,
                inserted_at: Instant::now(),
            },
        );
    }

    async fn evict(&self, batch_id: DbId) {
        let mut entries = self.entries.lock().await;
        entries.retain(|key, _| key.batch_id != batch_id);
    }
}

//! Progressive two-pass loading of batch results.
//!
//! The light pass fetches the summary, then the first pages of light
//! records sequentially so something is on screen quickly without
//! hammering the read API. The heavy pass re-fetches loaded pages with
//! artifacts as a cancellable background task; cancellation is checked at
//! every page boundary so teardown never leaves an orphaned fetch loop.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use screener_core::types::{DbId, Timestamp};
use screener_db::models::JobRecord;

use crate::api::{BatchSummary, ResultsApi, ResultsPage};
use crate::cache::{PageKey, ResultCache};
use crate::error::ClientResult;

/// Knobs for the progressive loader.
#[derive(Debug, Clone, Copy)]
pub struct LoaderConfig {
    /// Rows per page requested from the read API.
    pub page_size: i64,
    /// Light pages fetched eagerly by `load`; the rest load on demand.
    pub eager_pages: i64,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            page_size: 50,
            eager_pages: 4,
        }
    }
}

/// Client-side view of one batch, readable while loading.
///
/// Records are keyed by creation order, so iteration yields the same
/// stable order the server pages in, regardless of fetch interleaving.
#[derive(Default)]
pub struct BatchView {
    pub summary: Option<BatchSummary>,
    records: BTreeMap<(Timestamp, DbId), JobRecord>,
    loaded_pages: BTreeSet<i64>,
}

impl BatchView {
    /// Records in creation order.
    pub fn records(&self) -> impl Iterator<Item = &JobRecord> {
        self.records.values()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Light pages merged so far.
    pub fn loaded_pages(&self) -> impl Iterator<Item = i64> + '_ {
        self.loaded_pages.iter().copied()
    }

    /// Merge a page into the view. Incoming records replace existing ones
    /// field-wise, except that a heavy result already on screen is never
    /// downgraded by a light re-read of the same job.
    fn merge_page(&mut self, page: &ResultsPage) {
        for incoming in &page.jobs {
            let key = (incoming.created_at, incoming.job_id);
            let mut record = incoming.clone();
            if let Some(existing) = self.records.remove(&key) {
                record.result = match (existing.result, record.result) {
                    (Some(old), Some(new)) => Some(old.merge(new)),
                    (Some(old), None) => Some(old),
                    (None, new) => new,
                };
            }
            self.records.insert(key, record);
        }
    }
}

/// Sequential light pass plus cancellable heavy hydration over a
/// [`ResultsApi`] transport and an injectable page cache.
#[derive(Clone)]
pub struct ProgressiveLoader {
    api: Arc<dyn ResultsApi>,
    cache: Arc<dyn ResultCache>,
    config: LoaderConfig,
    view: Arc<RwLock<BatchView>>,
}

impl ProgressiveLoader {
    pub fn new(
        api: Arc<dyn ResultsApi>,
        cache: Arc<dyn ResultCache>,
        mut config: LoaderConfig,
    ) -> Self {
        config.page_size = config.page_size.max(1);
        Self {
            api,
            cache,
            config,
            view: Arc::new(RwLock::new(BatchView::default())),
        }
    }

    /// Handle to the view; readable at any point during loading.
    pub fn view(&self) -> Arc<RwLock<BatchView>> {
        Arc::clone(&self.view)
    }

    /// Light pass: summary, then the first `eager_pages` pages.
    ///
    /// A summary failure is returned to the caller; a page failure is
    /// logged and skipped so one bad page never blanks the whole view.
    pub async fn load(&self, batch_id: DbId) -> ClientResult<BatchSummary> {
        let summary = self.api.summary(batch_id).await?;
        let total_pages = summary.total_pages(self.config.page_size);
        self.view.write().await.summary = Some(summary.clone());

        let eager = total_pages.min(self.config.eager_pages);
        for page in 1..=eager {
            if let Err(e) = self.load_page(batch_id, page).await {
                tracing::warn!(batch_id, page, error = %e, "Skipping failed page fetch");
            }
        }

        Ok(summary)
    }

    /// Fetch one light page on demand and merge it into the view.
    pub async fn load_page(&self, batch_id: DbId, page: i64) -> ClientResult<()> {
        self.fetch_page(batch_id, page, false).await?;
        self.view.write().await.loaded_pages.insert(page);
        Ok(())
    }

    /// Heavy pass: re-fetch every loaded page with artifacts, sequentially,
    /// as a background task. The token is checked at each page boundary;
    /// page failures are logged and skipped.
    pub fn hydrate_heavy(&self, batch_id: DbId, cancel: CancellationToken) -> JoinHandle<()> {
        let loader = self.clone();
        tokio::spawn(async move {
            let pages: Vec<i64> = loader.view.read().await.loaded_pages().collect();
            for page in pages {
                if cancel.is_cancelled() {
                    tracing::debug!(batch_id, page, "Heavy hydration cancelled");
                    break;
                }
                if let Err(e) = loader.fetch_page(batch_id, page, true).await {
                    tracing::warn!(batch_id, page, error = %e, "Skipping failed heavy fetch");
                }
            }
        })
    }

    /// Drop cached pages for a batch, forcing the next reads to refetch.
    pub async fn invalidate(&self, batch_id: DbId) {
        self.cache.evict(batch_id).await;
    }

    async fn fetch_page(&self, batch_id: DbId, page: i64, heavy: bool) -> ClientResult<()> {
        let key = PageKey {
            batch_id,
            page,
            heavy,
        };

        let fetched = match self.cache.get(&key).await {
            Some(cached) => {
                tracing::debug!(batch_id, page, heavy, "Page cache hit");
                cached
            }
            None => {
                let fresh = self
                    .api
                    .results_page(batch_id, page, self.config.page_size, heavy)
                    .await?;
                self.cache.set(key, fresh.clone()).await;
                fresh
            }
        };

        self.view.write().await.merge_page(&fetched);
        Ok(())
    }
}

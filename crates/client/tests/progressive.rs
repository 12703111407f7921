//! Loader behaviour against a scripted transport: eager light pass, page
//! failure policy, cache reuse, heavy hydration, and cancellation.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use assert_matches::assert_matches;
use async_trait::async_trait;
use chrono::{Duration, Utc};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use screener_client::{
    BatchSummary, ClientError, ClientResult, LoaderConfig, MemoryCache, ProgressiveLoader,
    ResultsApi, ResultsPage,
};
use screener_core::result::{HeavyResult, ResultPayload};
use screener_core::status::JobStatus;
use screener_core::types::DbId;
use screener_db::models::JobRecord;

const BATCH_ID: DbId = 7;

fn dataset(count: usize) -> Vec<JobRecord> {
    let base = Utc::now();
    (0..count)
        .map(|i| JobRecord {
            job_id: (i + 1) as DbId,
            candidate_id: format!("c{}", i + 1),
            status: JobStatus::Completed,
            attempt_count: 1,
            error: None,
            result: Some(ResultPayload::Heavy(HeavyResult {
                score: i as f64,
                metrics: serde_json::json!({"rank": i}),
                artifacts: serde_json::json!({"blob": format!("artifact-{i}")}),
            })),
            created_at: base + Duration::seconds(i as i64),
            completed_at: Some(base + Duration::seconds(i as i64 + 60)),
        })
        .collect()
}

/// Scripted transport serving a fixed dataset, with switchable failures
/// and per-detail call counters.
struct ScriptedApi {
    jobs: Vec<JobRecord>,
    fail_summary: AtomicBool,
    fail_light_pages: Mutex<HashSet<i64>>,
    light_calls: AtomicUsize,
    heavy_calls: AtomicUsize,
}

impl ScriptedApi {
    fn new(jobs: Vec<JobRecord>) -> Arc<Self> {
        Arc::new(Self {
            jobs,
            fail_summary: AtomicBool::new(false),
            fail_light_pages: Mutex::new(HashSet::new()),
            light_calls: AtomicUsize::new(0),
            heavy_calls: AtomicUsize::new(0),
        })
    }

    async fn fail_light_page(&self, page: i64) {
        self.fail_light_pages.lock().await.insert(page);
    }

    async fn heal_light_page(&self, page: i64) {
        self.fail_light_pages.lock().await.remove(&page);
    }
}

#[async_trait]
impl ResultsApi for ScriptedApi {
    async fn summary(&self, batch_id: DbId) -> ClientResult<BatchSummary> {
        if self.fail_summary.load(Ordering::SeqCst) {
            return Err(ClientError::Transport("summary unavailable".into()));
        }
        Ok(BatchSummary {
            id: batch_id,
            name: "scripted".into(),
            status_id: 3,
            total_jobs: self.jobs.len() as i64,
            completed_jobs: self.jobs.len() as i64,
            failed_jobs: 0,
            cancelled_jobs: 0,
            leaderboard: vec![],
        })
    }

    async fn results_page(
        &self,
        batch_id: DbId,
        page: i64,
        page_size: i64,
        include_heavy: bool,
    ) -> ClientResult<ResultsPage> {
        if include_heavy {
            self.heavy_calls.fetch_add(1, Ordering::SeqCst);
        } else {
            self.light_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_light_pages.lock().await.contains(&page) {
                return Err(ClientError::Status {
                    status: 500,
                    message: "scripted page failure".into(),
                });
            }
        }

        let start = ((page - 1) * page_size) as usize;
        let end = (start + page_size as usize).min(self.jobs.len());
        let jobs = self.jobs[start.min(self.jobs.len())..end]
            .iter()
            .map(|job| {
                let mut job = job.clone();
                if !include_heavy {
                    job.result = job
                        .result
                        .map(|r| ResultPayload::Light(r.as_light()));
                }
                job
            })
            .collect();

        Ok(ResultsPage {
            batch_id,
            page,
            page_size,
            jobs,
        })
    }
}

fn loader(api: Arc<ScriptedApi>, page_size: i64, eager_pages: i64) -> ProgressiveLoader {
    ProgressiveLoader::new(
        api,
        Arc::new(MemoryCache::default()),
        LoaderConfig {
            page_size,
            eager_pages,
        },
    )
}

#[tokio::test]
async fn light_pass_loads_eager_pages_in_creation_order() {
    let api = ScriptedApi::new(dataset(5));
    let loader = loader(Arc::clone(&api), 2, 2);

    let summary = loader.load(BATCH_ID).await.unwrap();
    assert_eq!(summary.total_jobs, 5);

    let view = loader.view();
    let view = view.read().await;
    assert!(view.summary.is_some());
    let ids: Vec<&str> = view.records().map(|r| r.candidate_id.as_str()).collect();
    // Two eager pages of two; the fifth job loads on demand.
    assert_eq!(ids, vec!["c1", "c2", "c3", "c4"]);
    assert!(view.records().all(|r| !r.result.as_ref().unwrap().is_heavy()));
    drop(view);

    loader.load_page(BATCH_ID, 3).await.unwrap();
    let view = loader.view();
    assert_eq!(view.read().await.len(), 5);
}

#[tokio::test]
async fn summary_failure_is_returned_to_the_caller() {
    let api = ScriptedApi::new(dataset(3));
    api.fail_summary.store(true, Ordering::SeqCst);
    let loader = loader(Arc::clone(&api), 2, 2);

    let err = loader.load(BATCH_ID).await.unwrap_err();
    assert_matches!(err, ClientError::Transport(_));

    let view = loader.view();
    assert!(view.read().await.is_empty());
    // No pages were attempted after the summary failed.
    assert_eq!(api.light_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn failed_page_is_skipped_and_loadable_later() {
    let api = ScriptedApi::new(dataset(6));
    api.fail_light_page(2).await;
    let loader = loader(Arc::clone(&api), 2, 3);

    loader.load(BATCH_ID).await.unwrap();

    let view = loader.view();
    let ids: Vec<String> = view
        .read()
        .await
        .records()
        .map(|r| r.candidate_id.clone())
        .collect();
    // Page 2 (c3, c4) failed; pages 1 and 3 still rendered.
    assert_eq!(ids, vec!["c1", "c2", "c5", "c6"]);

    api.heal_light_page(2).await;
    loader.load_page(BATCH_ID, 2).await.unwrap();
    assert_eq!(view.read().await.len(), 6);
}

#[tokio::test]
async fn cached_page_is_not_refetched() {
    let api = ScriptedApi::new(dataset(2));
    let loader = loader(Arc::clone(&api), 2, 1);

    loader.load_page(BATCH_ID, 1).await.unwrap();
    loader.load_page(BATCH_ID, 1).await.unwrap();

    assert_eq!(api.light_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn hydration_upgrades_records_without_losing_light_data() {
    let api = ScriptedApi::new(dataset(4));
    let loader = loader(Arc::clone(&api), 2, 2);
    loader.load(BATCH_ID).await.unwrap();

    let cancel = CancellationToken::new();
    loader.hydrate_heavy(BATCH_ID, cancel).await.unwrap();

    let view = loader.view();
    {
        let view = view.read().await;
        assert_eq!(view.len(), 4);
        for record in view.records() {
            let result = record.result.as_ref().unwrap();
            assert!(result.is_heavy(), "{} was not hydrated", record.candidate_id);
        }
    }
    assert_eq!(api.heavy_calls.load(Ordering::SeqCst), 2);

    // A light re-read (served from cache) never downgrades the view.
    loader.load_page(BATCH_ID, 1).await.unwrap();
    let view = view.read().await;
    assert!(view.records().all(|r| r.result.as_ref().unwrap().is_heavy()));
}

#[tokio::test]
async fn cancelled_hydration_fetches_nothing() {
    let api = ScriptedApi::new(dataset(4));
    let loader = loader(Arc::clone(&api), 2, 2);
    loader.load(BATCH_ID).await.unwrap();

    let cancel = CancellationToken::new();
    cancel.cancel();
    loader.hydrate_heavy(BATCH_ID, cancel).await.unwrap();

    assert_eq!(api.heavy_calls.load(Ordering::SeqCst), 0);
}

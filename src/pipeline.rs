//! Pipeline coordinator
//!
//! Owns the search and download queues and drives a run through its phases:
//! sessions are started, both worker pools spawned, the search queue is fed
//! and drained, then the download queue is drained, the workers are stopped
//! and the sessions disposed before the summary is written.
//!
//! The download queue is only awaited once every search worker has consumed
//! its stop signal, so no new download task can appear while it drains.

use crate::{
    extract_unique_items, format_duration, standard_providers, write_outputs, Category,
    ChromeSessionFactory, Config, DownloadTask, DownloadWorker, ImageDownloader, ImageFetcher,
    Item, OutputFiles, PipelineMetrics, ReqwestFetcher, ResultRecord, ResultsTable,
    ScraperError, SearchWorker, SessionFactory, SessionPool, SourceProvider, Summary,
    WorkQueue, WorkerStats,
};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

/// Outcome of one completed run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub search_workers: usize,
    pub search_stats: Vec<WorkerStats>,
    pub download_stats: Vec<WorkerStats>,
    pub summary: Summary,
    pub outputs: OutputFiles,
}

struct PhaseOutput {
    results: BTreeMap<String, ResultRecord>,
    search_workers: usize,
    search_stats: Vec<WorkerStats>,
    download_stats: Vec<WorkerStats>,
}

pub struct Pipeline {
    config: Config,
    session_factory: Arc<dyn SessionFactory>,
    providers: Arc<Vec<Arc<dyn SourceProvider>>>,
    fetcher: Arc<dyn ImageFetcher>,
    metrics: Arc<PipelineMetrics>,
    active_pool: Mutex<Option<Arc<SessionPool>>>,
}

impl Pipeline {
    pub fn new(
        config: Config,
        session_factory: Arc<dyn SessionFactory>,
        providers: Vec<Arc<dyn SourceProvider>>,
        fetcher: Arc<dyn ImageFetcher>,
    ) -> Self {
        Self {
            config,
            session_factory,
            providers: Arc::new(providers),
            fetcher,
            metrics: Arc::new(PipelineMetrics::noop()),
            active_pool: Mutex::new(None),
        }
    }

    /// Headless Chrome sessions, the standard provider list and a `reqwest` fetcher.
    pub fn production(config: Config) -> Self {
        let factory = Arc::new(ChromeSessionFactory::new(config.clone()));
        let providers = standard_providers(&config);
        Self::new(config, factory, providers, Arc::new(ReqwestFetcher::default()))
    }

    pub fn with_metrics(mut self, metrics: Arc<PipelineMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn provider_ids(&self) -> Vec<&'static str> {
        self.providers.iter().map(|p| p.id()).collect()
    }

    /// Run the whole pipeline over `catalog`.
    ///
    /// Fails before any session is started when the catalog has no items.
    /// Sessions are disposed whether or not the run succeeds.
    pub async fn run(&self, catalog: &[Category]) -> Result<RunReport, ScraperError> {
        let run_id = Uuid::new_v4();
        self.run_inner(catalog, run_id)
            .instrument(info_span!("run", %run_id))
            .await
    }

    async fn run_inner(
        &self,
        catalog: &[Category],
        run_id: Uuid,
    ) -> Result<RunReport, ScraperError> {
        let started_at = Utc::now();
        let clock = Instant::now();

        let items = extract_unique_items(catalog);
        if items.is_empty() {
            return Err(ScraperError::Catalog(
                "catalog contains no exercises".to_string(),
            ));
        }

        tokio::fs::create_dir_all(&self.config.output_dir).await?;

        let pool = Arc::new(
            SessionPool::initialize(self.session_factory.as_ref(), self.config.workers).await,
        );
        *self.active_pool.lock().await = Some(pool.clone());

        let phases = self.execute(&items, &pool).await;

        pool.shutdown().await;
        self.active_pool.lock().await.take();

        let phases = phases?;
        let summary = Summary::compute(&items, &phases.results);
        let outputs = write_outputs(&self.config.output_dir, &phases.results, &summary).await?;

        let finished_at = Utc::now();
        info!(
            "Successfully found images for {} out of {} asanas in {}",
            summary.succeeded,
            summary.total,
            format_duration(clock.elapsed())
        );

        Ok(RunReport {
            run_id,
            started_at,
            finished_at,
            search_workers: phases.search_workers,
            search_stats: phases.search_stats,
            download_stats: phases.download_stats,
            summary,
            outputs,
        })
    }

    async fn execute(
        &self,
        items: &[Item],
        pool: &SessionPool,
    ) -> Result<PhaseOutput, ScraperError> {
        let search_queue: Arc<WorkQueue<Item>> = WorkQueue::new();
        let download_queue: Arc<WorkQueue<DownloadTask>> = WorkQueue::new();
        let results = Arc::new(ResultsTable::new());

        let downloader = Arc::new(ImageDownloader::new(
            self.fetcher.clone(),
            self.config.output_dir.clone(),
            self.config.download_user_agent.clone(),
            self.config.download_timeout,
        ));

        let download_handles: Vec<JoinHandle<WorkerStats>> = (0..self.config.download_workers)
            .map(|id| {
                let worker = DownloadWorker::new(
                    id,
                    downloader.clone(),
                    download_queue.clone(),
                    results.clone(),
                    self.metrics.clone(),
                );
                tokio::spawn(
                    async move { worker.run().await }.instrument(info_span!("download_worker", id)),
                )
            })
            .collect();

        let sessions = pool.sessions(self.config.workers).await;
        let search_handles: Vec<JoinHandle<WorkerStats>> = sessions
            .into_iter()
            .enumerate()
            .map(|(id, session)| {
                let worker = SearchWorker::new(
                    id,
                    session,
                    self.providers.clone(),
                    search_queue.clone(),
                    download_queue.clone(),
                    self.metrics.clone(),
                );
                tokio::spawn(
                    async move { worker.run().await }.instrument(info_span!("search_worker", id)),
                )
            })
            .collect();

        if search_handles.is_empty() {
            warn!("No browser sessions available, every item will be reported missing");
        } else {
            info!(
                "Searching {} items with {} workers",
                items.len(),
                search_handles.len()
            );
            for item in items {
                search_queue.put(item.clone())?;
            }
            for _ in 0..search_handles.len() {
                search_queue.put_stop()?;
            }
        }

        search_queue.join().await;
        info!("Search phase complete");

        download_queue.join().await;
        for _ in 0..download_handles.len() {
            download_queue.put_stop()?;
        }

        let search_workers = search_handles.len();
        let search_stats = join_workers("search", search_handles).await;
        let download_stats = join_workers("download", download_handles).await;

        Ok(PhaseOutput {
            results: results.snapshot().await,
            search_workers,
            search_stats,
            download_stats,
        })
    }

    /// Dispose the sessions of a run in progress. Used when the process is
    /// interrupted; the run itself is abandoned by the caller.
    pub async fn shutdown(&self) {
        let pool = self.active_pool.lock().await.take();
        if let Some(pool) = pool {
            pool.shutdown().await;
        }
    }
}

async fn join_workers(kind: &str, handles: Vec<JoinHandle<WorkerStats>>) -> Vec<WorkerStats> {
    join_all(handles)
        .await
        .into_iter()
        .filter_map(|joined| match joined {
            Ok(stats) => Some(stats),
            Err(e) => {
                error!("A {} worker terminated abnormally: {}", kind, e);
                None
            }
        })
        .collect()
}

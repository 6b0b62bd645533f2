use crate::{
    BrowserSession, DownloadTask, ImageCandidate, ImageDownloader, Item, Message,
    PipelineMetrics, ResultRecord, ResultsTable, ScraperError, SourceProvider, WorkQueue,
};
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub id: usize,
    pub processed_count: usize,
    pub error_count: usize,
}

/// Searches items with one dedicated browser session.
///
/// Providers are tried strictly in order for each item; the first candidate
/// wins and is handed to the download queue without waiting for the download.
pub struct SearchWorker {
    id: usize,
    session: Arc<dyn BrowserSession>,
    providers: Arc<Vec<Arc<dyn SourceProvider>>>,
    search_queue: Arc<WorkQueue<Item>>,
    download_queue: Arc<WorkQueue<DownloadTask>>,
    metrics: Arc<PipelineMetrics>,
    processed_count: AtomicUsize,
    error_count: AtomicUsize,
}

impl SearchWorker {
    pub fn new(
        id: usize,
        session: Arc<dyn BrowserSession>,
        providers: Arc<Vec<Arc<dyn SourceProvider>>>,
        search_queue: Arc<WorkQueue<Item>>,
        download_queue: Arc<WorkQueue<DownloadTask>>,
        metrics: Arc<PipelineMetrics>,
    ) -> Self {
        Self {
            id,
            session,
            providers,
            search_queue,
            download_queue,
            metrics,
            processed_count: AtomicUsize::new(0),
            error_count: AtomicUsize::new(0),
        }
    }

    /// Process items until a stop signal is received.
    pub async fn run(&self) -> WorkerStats {
        info!("Starting search worker {}", self.id);

        loop {
            match self.search_queue.get().await {
                Message::Task(item) => {
                    // The message is acknowledged even if the search panics
                    let outcome = AssertUnwindSafe(self.process_item(&item))
                        .catch_unwind()
                        .await;
                    if outcome.is_err() {
                        self.error_count.fetch_add(1, Ordering::Relaxed);
                        error!("Worker {} panicked while searching for {}", self.id, item.name);
                    }
                    self.search_queue.task_done();
                }
                Message::Stop => {
                    self.search_queue.task_done();
                    break;
                }
            }
        }

        info!("Search worker {} finished", self.id);
        self.get_stats()
    }

    async fn process_item(&self, item: &Item) {
        let started = Instant::now();
        self.processed_count.fetch_add(1, Ordering::Relaxed);
        info!("Worker {} searching for: {}", self.id, item.name);

        let candidate = self.find_candidate(&item.name).await;
        self.metrics.record_search(
            candidate.as_ref().map(|c| c.provider_id.as_str()),
            started.elapsed(),
        );

        let Some(candidate) = candidate else {
            self.error_count.fetch_add(1, Ordering::Relaxed);
            warn!("Could not find an image for {}", item.name);
            return;
        };

        info!("Found image for {} on {}", item.name, candidate.provider_id);
        let task = DownloadTask {
            item_name: item.name.clone(),
            candidate,
        };
        if let Err(e) = self.download_queue.put(task) {
            self.error_count.fetch_add(1, Ordering::Relaxed);
            error!("Worker {} could not queue download for {}: {}", self.id, item.name, e);
        }
    }

    /// Try every provider in priority order until one yields a candidate.
    pub async fn find_candidate(&self, item_name: &str) -> Option<ImageCandidate> {
        for provider in self.providers.iter() {
            // Each provider starts from a clean cookie jar
            if let Err(e) = self.session.clear_cookies().await {
                debug!("Worker {} could not clear cookies: {}", self.id, e);
            }

            debug!("Worker {} trying {} for {}", self.id, provider.id(), item_name);
            let attempt = AssertUnwindSafe(provider.find_image(item_name, self.session.as_ref()))
                .catch_unwind()
                .await;

            match attempt {
                Ok(Some(candidate)) => return Some(candidate),
                Ok(None) => {}
                Err(_) => {
                    let err = ScraperError::provider(provider.id(), "panicked during search");
                    error!("Error searching for {}: {}", item_name, err);
                }
            }
        }

        None
    }

    pub fn get_stats(&self) -> WorkerStats {
        WorkerStats {
            id: self.id,
            processed_count: self.processed_count.load(Ordering::Relaxed),
            error_count: self.error_count.load(Ordering::Relaxed),
        }
    }
}

/// Streams queued candidates to disk and records the successes.
pub struct DownloadWorker {
    id: usize,
    downloader: Arc<ImageDownloader>,
    queue: Arc<WorkQueue<DownloadTask>>,
    results: Arc<ResultsTable>,
    metrics: Arc<PipelineMetrics>,
    processed_count: AtomicUsize,
    error_count: AtomicUsize,
}

impl DownloadWorker {
    pub fn new(
        id: usize,
        downloader: Arc<ImageDownloader>,
        queue: Arc<WorkQueue<DownloadTask>>,
        results: Arc<ResultsTable>,
        metrics: Arc<PipelineMetrics>,
    ) -> Self {
        Self {
            id,
            downloader,
            queue,
            results,
            metrics,
            processed_count: AtomicUsize::new(0),
            error_count: AtomicUsize::new(0),
        }
    }

    pub async fn run(&self) -> WorkerStats {
        debug!("Starting download worker {}", self.id);

        loop {
            match self.queue.get().await {
                Message::Task(task) => {
                    let item_name = task.item_name.clone();
                    let outcome = AssertUnwindSafe(self.process_task(task))
                        .catch_unwind()
                        .await;
                    if outcome.is_err() {
                        self.metrics.record_download(false);
                        self.error_count.fetch_add(1, Ordering::Relaxed);
                        error!(
                            "Download worker {} panicked while downloading {}",
                            self.id, item_name
                        );
                    }
                    self.queue.task_done();
                }
                Message::Stop => {
                    self.queue.task_done();
                    break;
                }
            }
        }

        debug!("Download worker {} finished", self.id);
        self.get_stats()
    }

    async fn process_task(&self, task: DownloadTask) {
        self.processed_count.fetch_add(1, Ordering::Relaxed);

        match self.downloader.download(&task).await {
            Ok(local_path) => {
                self.metrics.record_download(true);
                let DownloadTask {
                    item_name,
                    candidate,
                } = task;
                let record = ResultRecord {
                    url: candidate.url,
                    source_page: candidate.source_page,
                    local_path,
                    provider_id: candidate.provider_id,
                };
                self.results.insert(&item_name, record).await;
            }
            Err(e) => {
                self.metrics.record_download(false);
                self.error_count.fetch_add(1, Ordering::Relaxed);
                error!("Error downloading image for {}: {}", task.item_name, e);
            }
        }
    }

    pub fn get_stats(&self) -> WorkerStats {
        WorkerStats {
            id: self.id,
            processed_count: self.processed_count.load(Ordering::Relaxed),
            error_count: self.error_count.load(Ordering::Relaxed),
        }
    }
}

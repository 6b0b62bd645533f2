use crate::ScraperError;
use metrics::{Counter, Histogram, Key, Label, Recorder};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use tracing::info;

pub const ITEMS_SEARCHED: &str = "asana_items_searched_total";
pub const ITEMS_MISSED: &str = "asana_items_missed_total";
pub const PROVIDER_HITS: &str = "asana_provider_hits_total";
pub const DOWNLOADS_SUCCEEDED: &str = "asana_downloads_succeeded_total";
pub const DOWNLOADS_FAILED: &str = "asana_downloads_failed_total";
pub const SEARCH_DURATION: &str = "asana_search_duration_seconds";

/// Handles for every metric the pipeline records.
///
/// Handles are resolved once against a recorder; when no recorder is
/// installed they are no-ops.
pub struct PipelineMetrics {
    pub items_searched: Counter,
    pub items_missed: Counter,
    pub downloads_succeeded: Counter,
    pub downloads_failed: Counter,
    pub search_duration: Histogram,
    provider_hits: HashMap<String, Counter>,
}

impl PipelineMetrics {
    pub fn noop() -> Self {
        Self {
            items_searched: Counter::noop(),
            items_missed: Counter::noop(),
            downloads_succeeded: Counter::noop(),
            downloads_failed: Counter::noop(),
            search_duration: Histogram::noop(),
            provider_hits: HashMap::new(),
        }
    }

    /// Register against the global recorder.
    pub fn register(provider_ids: &[&'static str]) -> Self {
        Self::with_recorder(metrics::recorder(), provider_ids)
    }

    pub fn with_recorder(recorder: &dyn Recorder, provider_ids: &[&'static str]) -> Self {
        let provider_hits = provider_ids
            .iter()
            .map(|id| {
                let key = Key::from_parts(PROVIDER_HITS, vec![Label::new("provider", *id)]);
                (id.to_string(), recorder.register_counter(&key))
            })
            .collect();

        Self {
            items_searched: recorder.register_counter(&Key::from_name(ITEMS_SEARCHED)),
            items_missed: recorder.register_counter(&Key::from_name(ITEMS_MISSED)),
            downloads_succeeded: recorder.register_counter(&Key::from_name(DOWNLOADS_SUCCEEDED)),
            downloads_failed: recorder.register_counter(&Key::from_name(DOWNLOADS_FAILED)),
            search_duration: recorder.register_histogram(&Key::from_name(SEARCH_DURATION)),
            provider_hits,
        }
    }

    /// One finished search: `provider` is the site that produced the candidate,
    /// `None` for a miss.
    pub fn record_search(&self, provider: Option<&str>, duration: Duration) {
        self.items_searched.increment(1);
        self.search_duration.record(duration.as_secs_f64());

        match provider {
            Some(id) => {
                if let Some(counter) = self.provider_hits.get(id) {
                    counter.increment(1);
                }
            }
            None => self.items_missed.increment(1),
        }
    }

    pub fn record_download(&self, success: bool) {
        if success {
            self.downloads_succeeded.increment(1);
        } else {
            self.downloads_failed.increment(1);
        }
    }
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self::noop()
    }
}

/// Install the Prometheus recorder as the global recorder.
///
/// Must run before [`PipelineMetrics::register`] so the handles are live.
pub fn install_prometheus_recorder() -> Result<PrometheusHandle, ScraperError> {
    let recorder = PrometheusBuilder::new().build_recorder();
    let handle = recorder.handle();

    metrics::set_boxed_recorder(Box::new(recorder))
        .map_err(|e| ScraperError::Configuration(format!("metrics recorder: {e}")))?;

    Ok(handle)
}

/// Write the Prometheus text exposition of every recorded metric to `path`.
pub async fn write_metrics(handle: &PrometheusHandle, path: &Path) -> Result<(), ScraperError> {
    tokio::fs::write(path, handle.render()).await?;
    info!("Metrics written to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_noop_metrics_accept_records() {
        let metrics = PipelineMetrics::default();
        metrics.record_search(Some("pexels.com"), Duration::from_millis(250));
        metrics.record_search(None, Duration::from_secs(3));
        metrics.record_download(false);
    }

    #[test]
    fn test_prometheus_rendering() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        let metrics = PipelineMetrics::with_recorder(&recorder, &["pexels.com", "google.com"]);

        metrics.record_search(Some("pexels.com"), Duration::from_millis(250));
        metrics.record_search(Some("unknown.example"), Duration::from_millis(10));
        metrics.record_search(None, Duration::from_secs(3));
        metrics.record_download(true);

        let rendered = handle.render();
        assert!(rendered.contains(&format!("{ITEMS_SEARCHED} 3")));
        assert!(rendered.contains(&format!("{ITEMS_MISSED} 1")));
        assert!(rendered.contains(&format!("{DOWNLOADS_SUCCEEDED} 1")));
        assert!(rendered.contains(&format!("{PROVIDER_HITS}{{provider=\"pexels.com\"}} 1")));
        assert!(rendered.contains(SEARCH_DURATION));
    }
}

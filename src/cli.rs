use crate::{
    install_prometheus_recorder, load_catalog, write_metrics, Config, Pipeline, PipelineMetrics,
    RunReport,
};
use anyhow::Context;
use clap::Parser;
use metrics_exporter_prometheus::PrometheusHandle;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "asana-image-scraper")]
#[command(about = "Find and download a representative image for every yoga pose in a catalog")]
#[command(version)]
pub struct Cli {
    #[arg(long, help = "Input JSON file containing the pose catalog")]
    pub input: Option<PathBuf>,

    #[arg(long, help = "Output directory for downloaded images")]
    pub output: Option<PathBuf>,

    #[arg(long, help = "Delay between requests (seconds)")]
    pub delay: Option<f64>,

    #[arg(long, help = "Number of browser-backed search workers")]
    pub threads: Option<usize>,

    #[arg(long, help = "Number of download workers")]
    pub download_workers: Option<usize>,

    #[arg(long, help = "Configuration file path")]
    pub config: Option<PathBuf>,

    #[arg(long, help = "Chrome executable path")]
    pub chrome_path: Option<String>,

    #[arg(long, help = "Page navigation timeout in seconds")]
    pub timeout: Option<u64>,

    #[arg(long, help = "Write Prometheus metrics to this file after the run")]
    pub metrics_file: Option<PathBuf>,

    #[arg(long, help = "Enable verbose logging")]
    pub verbose: bool,
}

impl Cli {
    /// Command-line flags take precedence over the configuration file.
    pub fn apply_overrides(&self, config: &mut Config) {
        if let Some(input) = &self.input {
            config.input = Some(input.clone());
        }
        if let Some(output) = &self.output {
            config.output_dir = output.clone();
        }
        if let Some(delay) = self.delay {
            config.delay = delay;
        }
        if let Some(threads) = self.threads {
            config.workers = threads;
        }
        if let Some(download_workers) = self.download_workers {
            config.download_workers = download_workers;
        }
        if let Some(chrome_path) = &self.chrome_path {
            config.chrome_path = Some(chrome_path.clone());
        }
        if let Some(timeout) = self.timeout {
            config.navigation_timeout = Duration::from_secs(timeout);
        }
    }
}

/// Read the optional configuration file, apply command-line overrides and validate.
pub async fn load_config(args: &Cli) -> anyhow::Result<Config> {
    let mut config = match &args.config {
        Some(path) => {
            let content = fs::read_to_string(path)
                .await
                .with_context(|| format!("reading config file {}", path.display()))?;
            serde_json::from_str(&content)
                .with_context(|| format!("parsing config file {}", path.display()))?
        }
        None => Config::default(),
    };

    args.apply_overrides(&mut config);
    config.validate()?;

    info!("Configuration loaded successfully");
    info!("Output directory: {}", config.output_dir.display());
    info!("Search workers: {}", config.workers);
    info!("Delay: {}s", config.delay);

    Ok(config)
}

pub struct CliRunner {
    pub config: Config,
    pub pipeline: Arc<Pipeline>,
    metrics: Option<(PrometheusHandle, PathBuf)>,
}

impl CliRunner {
    pub fn new(config: Config, metrics_file: Option<PathBuf>) -> anyhow::Result<Self> {
        let metrics = match metrics_file {
            Some(path) => Some((install_prometheus_recorder()?, path)),
            None => None,
        };

        let pipeline = Pipeline::production(config.clone());
        let pipeline = if metrics.is_some() {
            let handles = PipelineMetrics::register(&pipeline.provider_ids());
            pipeline.with_metrics(Arc::new(handles))
        } else {
            pipeline
        };

        Ok(Self {
            config,
            pipeline: Arc::new(pipeline),
            metrics,
        })
    }

    /// Load the catalog and run the pipeline over it. A catalog that cannot be
    /// loaded fails the run before any browser is started.
    pub async fn run(&self) -> anyhow::Result<RunReport> {
        let catalog = load_catalog(self.config.input.as_deref()).await?;
        let report = self.pipeline.run(&catalog).await?;

        if let Some((handle, path)) = &self.metrics {
            write_metrics(handle, path).await?;
        }

        print_report(&report);
        Ok(report)
    }

    pub async fn shutdown(&self) {
        self.pipeline.shutdown().await;
    }
}

fn print_report(report: &RunReport) {
    let summary = &report.summary;
    println!("Run {} finished", report.run_id);
    println!("  Started:    {}", report.started_at.to_rfc3339());
    println!("  Finished:   {}", report.finished_at.to_rfc3339());
    println!("  Workers:    {}", report.search_workers);
    println!(
        "  Downloaded: {}/{} ({}%)",
        summary.succeeded,
        summary.total,
        summary.success_rate()
    );
    println!("  Missing:    {}", summary.missing.len());
    println!("  Summary:    {}", report.outputs.summary.display());
}

pub fn setup_logging(verbose: bool) -> anyhow::Result<()> {
    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .init();

    Ok(())
}

//! # Asana Image Scraper
//!
//! Finds and downloads one representative image for every pose in a yoga
//! catalog. Pose names are searched on a fixed list of sites using headless
//! Chrome sessions, and the first usable image is downloaded over plain HTTP
//! with its provenance recorded.
//!
//! ## Pipeline
//!
//! ```text
//! catalog ─► unique items ─► search queue ─► SearchWorker × sessions
//!                                               │  (providers in priority order)
//!                                               ▼
//!                               download queue ─► DownloadWorker × 2
//!                                                    │
//!                                                    ▼
//!                                  ResultsTable ─► results.json + summary.txt
//! ```
//!
//! - Each search worker owns one browser session for its whole lifetime
//! - Providers are tried strictly in order; the first candidate wins
//! - Downloads are decoupled from searching and never block a search worker
//! - Every queue is drained through an explicit stop signal per worker
//!
//! ## Providers
//!
//! | Priority | Site | Strategy |
//! |----------|------|----------|
//! | 1 | artofliving.org | site search, then article pages |
//! | 2 | yogajournal.com | site search, then article pages |
//! | 3 | healthline.com | site search, then article pages |
//! | 4 | wikimedia.org | media search grid |
//! | 5 | pexels.com | photo search grid, scrolled once |
//! | 6 | google.com | image search, last resort with relaxed relevance |
//!
//! ## Outputs
//!
//! The output directory (default `yoga_images`) receives one
//! `<sanitized name>.<ext>` file per found pose, `results.json` mapping pose
//! name to `{url, source, local_path, site}` and a plain-text `summary.txt`.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use asana_image_scraper::{default_catalog, Config, Pipeline};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config {
//!         workers: 4,
//!         ..Default::default()
//!     };
//!     let pipeline = Pipeline::production(config);
//!
//!     let report = pipeline.run(&default_catalog()?).await?;
//!     println!("Success rate: {}%", report.summary.success_rate());
//!
//!     Ok(())
//! }
//! ```
//!
//! ## CLI Usage
//!
//! ```bash
//! asana-image-scraper --input poses.json --output yoga_images --delay 1.0 --threads 12
//! ```

/// Configuration and Chrome launch settings
pub mod config;

/// Error types and error handling utilities
pub mod error;

/// Pose catalog loading and unique item extraction
pub mod catalog;

/// Browser session capability and the session pool
pub mod browser_pool;

/// Image sources and the shared extraction helpers
pub mod providers;

/// Work queue with stop signals and completion tracking
pub mod queue;

/// Search and download workers
pub mod worker;

/// HTTP image downloads
pub mod downloader;

/// Shared results table
pub mod results;

/// Summary computation and output files
pub mod summary;

/// Pipeline coordinator
pub mod pipeline;

/// Command-line interface implementation
pub mod cli;

/// Metrics recorded through the `metrics` facade
pub mod metrics;

/// Utility functions and helpers
pub mod utils;


pub use browser_pool::*;
pub use catalog::*;
pub use cli::*;
pub use config::*;
pub use downloader::*;
pub use error::*;
pub use self::metrics::*;
pub use pipeline::*;
pub use providers::*;
pub use queue::*;
pub use results::*;
pub use summary::*;
pub use utils::*;
pub use worker::*;

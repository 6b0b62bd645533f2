//! Configuration management with serde serialization/deserialization
//!
//! This module holds the scraper configuration, its validation rules and the
//! translation into Chrome launch settings for the browser session pool.

use crate::ScraperError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Identity string presented by the headless browser sessions.
pub const DEFAULT_BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/96.0.4664.110 Safari/537.36";

/// Identity string presented by the plain HTTP image downloads.
pub const DEFAULT_DOWNLOAD_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

/// Main configuration structure for the scraper
///
/// Controls the output location, pacing between page loads, the number of
/// browser-backed search workers and the HTTP download pool.
///
/// # Examples
///
/// ```rust
/// use asana_image_scraper::Config;
///
/// let config = Config {
///     workers: 4,
///     delay: 0.5,
///     ..Default::default()
/// };
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Directory receiving images, `results.json` and `summary.txt` (default: yoga_images)
    pub output_dir: PathBuf,

    /// Settle delay in seconds after each page load (default: 1.0)
    ///
    /// Slower sites double this for their first page load.
    pub delay: f64,

    /// Requested number of browser sessions and search workers (default: 12)
    ///
    /// The effective count is capped by the sessions that actually start.
    pub workers: usize,

    /// Number of HTTP download workers (default: 2)
    pub download_workers: usize,

    /// Timeout for a single page navigation (default: 30 seconds)
    pub navigation_timeout: Duration,

    /// Timeout for a single image download (default: 15 seconds)
    pub download_timeout: Duration,

    /// User-Agent presented by browser sessions
    pub user_agent: String,

    /// User-Agent presented by image downloads
    pub download_user_agent: String,

    /// Path to Chrome/Chromium executable (default: auto-detect)
    pub chrome_path: Option<String>,

    /// Run Chrome without a window (default: true)
    pub headless: bool,

    /// Catalog file; the embedded catalog is used when absent
    pub input: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("yoga_images"),
            delay: 1.0,
            workers: 12,
            download_workers: 2,
            navigation_timeout: Duration::from_secs(30),
            download_timeout: Duration::from_secs(15),
            user_agent: DEFAULT_BROWSER_USER_AGENT.to_string(),
            download_user_agent: DEFAULT_DOWNLOAD_USER_AGENT.to_string(),
            chrome_path: None,
            headless: true,
            input: None,
        }
    }
}

impl Config {
    pub fn settle_delay(&self) -> Duration {
        Duration::from_secs_f64(self.delay.max(0.0))
    }

    pub fn validate(&self) -> Result<(), ScraperError> {
        if self.workers == 0 {
            return Err(ScraperError::Configuration(
                "worker count must be greater than 0".to_string(),
            ));
        }

        if self.download_workers == 0 {
            return Err(ScraperError::Configuration(
                "download worker count must be greater than 0".to_string(),
            ));
        }

        if !self.delay.is_finite() || self.delay < 0.0 {
            return Err(ScraperError::Configuration(format!(
                "delay must be a non-negative number of seconds, got {}",
                self.delay
            )));
        }

        if self.navigation_timeout.is_zero() || self.download_timeout.is_zero() {
            return Err(ScraperError::Configuration(
                "timeouts must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

/// Generate Chrome command-line arguments for one pooled session
///
/// Each session gets its own user data directory and debugging port so that
/// concurrently launched instances do not collide on the process singleton.
///
/// # Examples
///
/// ```rust
/// use asana_image_scraper::{Config, get_chrome_args};
///
/// let args = get_chrome_args(&Config::default(), 3);
/// assert!(args.contains(&"--remote-debugging-port=9225".to_string()));
/// ```
pub fn get_chrome_args(config: &Config, session_id: usize) -> Vec<String> {
    let unique_id = format!("{}-{}", std::process::id(), session_id);

    let mut args = vec![
        "--disable-gpu".to_string(),
        "--no-sandbox".to_string(),
        "--disable-dev-shm-usage".to_string(),
        "--disable-extensions".to_string(),
        "--disable-notifications".to_string(),
        "--disable-infobars".to_string(),
        "--disable-default-apps".to_string(),
        "--disable-sync".to_string(),
        "--no-first-run".to_string(),
        "--disable-features=ProcessSingleton".to_string(),
        format!("--user-agent={}", config.user_agent),
        format!("--user-data-dir=/tmp/asana-scraper-{unique_id}"),
        format!("--remote-debugging-port={}", 9222 + session_id),
    ];

    if config.headless {
        args.insert(0, "--headless".to_string());
    }

    args
}

pub fn create_browser_config(
    config: &Config,
    session_id: usize,
) -> Result<chromiumoxide::browser::BrowserConfig, ScraperError> {
    use chromiumoxide::browser::BrowserConfig;

    let mut builder = BrowserConfig::builder()
        .request_timeout(config.navigation_timeout)
        .args(get_chrome_args(config, session_id));

    if !config.headless {
        builder = builder.with_head();
    }

    if let Some(chrome_path) = &config.chrome_path {
        builder = builder.chrome_executable(chrome_path);
    }

    builder.build().map_err(ScraperError::SessionLaunch)
}

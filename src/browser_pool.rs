//! Browser session pool for the search workers
//!
//! Every search worker owns exactly one browser session for its whole
//! lifetime. The pool launches the sessions up front, tolerates individual
//! launch failures, and disposes everything on shutdown.

use crate::{create_browser_config, Config, ScraperError};
use async_trait::async_trait;
use chromiumoxide::browser::Browser;
use chromiumoxide::cdp::browser_protocol::network::ClearBrowserCookiesParams;
use chromiumoxide::page::Page;
use futures::StreamExt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, warn};

/// Minimal browser surface the search pipeline depends on.
#[async_trait]
pub trait BrowserSession: Send + Sync {
    fn id(&self) -> usize;

    /// Navigate to `url` and return the rendered page source.
    async fn navigate(&self, url: &str) -> Result<String, ScraperError>;

    /// Rendered source of the current page.
    async fn content(&self) -> Result<String, ScraperError>;

    async fn execute_script(&self, script: &str) -> Result<(), ScraperError>;

    async fn clear_cookies(&self) -> Result<(), ScraperError>;

    async fn close(&self) -> Result<(), ScraperError>;
}

/// Launches browser sessions for the pool.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SessionFactory: Send + Sync {
    async fn create(&self, id: usize) -> Result<Arc<dyn BrowserSession>, ScraperError>;
}

/// A headless Chrome instance with a single tab.
pub struct ChromeSession {
    id: usize,
    browser: Mutex<Option<Browser>>,
    page: Page,
    handler: tokio::task::JoinHandle<()>,
    navigation_timeout: Duration,
}

impl ChromeSession {
    pub async fn launch(config: &Config, id: usize) -> Result<Self, ScraperError> {
        let browser_config = create_browser_config(config, id)?;

        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .map_err(|e| ScraperError::SessionLaunch(e.to_string()))?;

        // The CDP handler is a stream that has to be polled for the browser to make progress
        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("Session {} handler error: {}", id, e);
                }
            }
            debug!("Session {} handler stream ended", id);
        });

        let page = match browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(e) => {
                handler.abort();
                return Err(ScraperError::SessionLaunch(e.to_string()));
            }
        };

        Ok(Self {
            id,
            browser: Mutex::new(Some(browser)),
            page,
            handler,
            navigation_timeout: config.navigation_timeout,
        })
    }
}

#[async_trait]
impl BrowserSession for ChromeSession {
    fn id(&self) -> usize {
        self.id
    }

    async fn navigate(&self, url: &str) -> Result<String, ScraperError> {
        let load = async {
            self.page.goto(url).await?;
            self.page.content().await
        };

        match timeout(self.navigation_timeout, load).await {
            Ok(result) => result.map_err(|e| ScraperError::Navigation(format!("{url}: {e}"))),
            Err(_) => Err(ScraperError::Timeout(self.navigation_timeout)),
        }
    }

    async fn content(&self) -> Result<String, ScraperError> {
        self.page.content().await.map_err(ScraperError::from)
    }

    async fn execute_script(&self, script: &str) -> Result<(), ScraperError> {
        self.page
            .evaluate(script)
            .await
            .map(|_| ())
            .map_err(|e| ScraperError::Script(e.to_string()))
    }

    async fn clear_cookies(&self) -> Result<(), ScraperError> {
        self.page
            .execute(ClearBrowserCookiesParams::default())
            .await
            .map(|_| ())
            .map_err(ScraperError::from)
    }

    async fn close(&self) -> Result<(), ScraperError> {
        let browser = self.browser.lock().await.take();
        let result = match browser {
            Some(mut browser) => browser.close().await.map(|_| ()).map_err(ScraperError::from),
            None => Ok(()),
        };
        self.handler.abort();
        result
    }
}

/// Launches `ChromeSession`s from the scraper configuration.
pub struct ChromeSessionFactory {
    config: Config,
}

impl ChromeSessionFactory {
    pub fn new(config: Config) -> Self {
        Self { config }
    }
}

#[async_trait]
impl SessionFactory for ChromeSessionFactory {
    async fn create(&self, id: usize) -> Result<Arc<dyn BrowserSession>, ScraperError> {
        let session = ChromeSession::launch(&self.config, id).await?;
        Ok(Arc::new(session))
    }
}

/// Fixed-size set of independent browser sessions.
pub struct SessionPool {
    sessions: Mutex<Vec<Arc<dyn BrowserSession>>>,
    is_shut_down: AtomicBool,
}

impl SessionPool {
    /// Launch up to `count` sessions. Failed launches are logged and skipped.
    pub async fn initialize(factory: &dyn SessionFactory, count: usize) -> Self {
        let mut sessions = Vec::with_capacity(count);

        for i in 0..count {
            // Stagger launches so concurrent Chrome startups don't race on profile setup
            if i > 0 {
                sleep(Duration::from_millis(100)).await;
            }

            match factory.create(i).await {
                Ok(session) => {
                    info!("Initialized browser session {}", i + 1);
                    sessions.push(session);
                }
                Err(e) => {
                    error!("Error initializing browser session {}: {}", i + 1, e);
                }
            }
        }

        if sessions.len() < count {
            warn!(
                "Only {} of {} browser sessions started",
                sessions.len(),
                count
            );
        }

        Self {
            sessions: Mutex::new(sessions),
            is_shut_down: AtomicBool::new(false),
        }
    }

    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Hand out up to `limit` sessions, one per worker.
    pub async fn sessions(&self, limit: usize) -> Vec<Arc<dyn BrowserSession>> {
        self.sessions
            .lock()
            .await
            .iter()
            .take(limit)
            .cloned()
            .collect()
    }

    /// Close every session. Safe to call more than once.
    pub async fn shutdown(&self) {
        if self.is_shut_down.swap(true, Ordering::SeqCst) {
            return;
        }

        info!("Shutting down browser sessions...");
        let sessions: Vec<_> = self.sessions.lock().await.drain(..).collect();
        for session in sessions {
            if let Err(e) = session.close().await {
                warn!("Error closing browser session {}: {}", session.id(), e);
            }
        }
        info!("All browser sessions closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct StubSession {
        id: usize,
        closes: Arc<AtomicUsize>,
        fail_close: bool,
    }

    #[async_trait]
    impl BrowserSession for StubSession {
        fn id(&self) -> usize {
            self.id
        }

        async fn navigate(&self, _url: &str) -> Result<String, ScraperError> {
            Ok(String::new())
        }

        async fn content(&self) -> Result<String, ScraperError> {
            Ok(String::new())
        }

        async fn execute_script(&self, _script: &str) -> Result<(), ScraperError> {
            Ok(())
        }

        async fn clear_cookies(&self) -> Result<(), ScraperError> {
            Ok(())
        }

        async fn close(&self) -> Result<(), ScraperError> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            if self.fail_close {
                Err(ScraperError::Navigation("already gone".to_string()))
            } else {
                Ok(())
            }
        }
    }

    #[tokio::test]
    async fn test_partial_initialization_is_tolerated() {
        let closes = Arc::new(AtomicUsize::new(0));
        let mut factory = MockSessionFactory::new();
        let counter = closes.clone();
        factory.expect_create().times(4).returning(move |id| {
            if id % 2 == 1 {
                Err(ScraperError::SessionLaunch(format!("session {id} crashed")))
            } else {
                Ok(Arc::new(StubSession {
                    id,
                    closes: counter.clone(),
                    fail_close: false,
                }) as Arc<dyn BrowserSession>)
            }
        });

        let pool = SessionPool::initialize(&factory, 4).await;
        assert_eq!(pool.len().await, 2);

        let ids: Vec<usize> = pool.sessions(10).await.iter().map(|s| s.id()).collect();
        assert_eq!(ids, vec![0, 2]);
        assert_eq!(pool.sessions(1).await.len(), 1);
    }

    #[tokio::test]
    async fn test_shutdown_is_idempotent_and_swallows_close_errors() {
        let closes = Arc::new(AtomicUsize::new(0));
        let mut factory = MockSessionFactory::new();
        let counter = closes.clone();
        factory.expect_create().returning(move |id| {
            Ok(Arc::new(StubSession {
                id,
                closes: counter.clone(),
                fail_close: id == 0,
            }) as Arc<dyn BrowserSession>)
        });

        let pool = SessionPool::initialize(&factory, 3).await;
        pool.shutdown().await;
        pool.shutdown().await;

        assert_eq!(closes.load(Ordering::SeqCst), 3);
        assert!(pool.is_empty().await);
    }
}

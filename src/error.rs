use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum ScraperError {
    #[error("Navigation failed: {0}")]
    Navigation(String),

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error("Script execution failed: {0}")]
    Script(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Provider {provider} failed: {message}")]
    Provider { provider: String, message: String },

    #[error("Browser session launch failed: {0}")]
    SessionLaunch(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Unexpected HTTP status {0}")]
    HttpStatus(u16),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Catalog error: {0}")]
    Catalog(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Queue error: {0}")]
    Queue(String),
}

/// Failure class an error belongs to, used to decide who recovers from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Recovered by trying the next provider
    Provider,
    /// Recovered by shrinking the worker count
    Session,
    /// Recovered by recording the item as missing
    Download,
    /// Aborts the run before any worker starts
    Catalog,
    Internal,
}

impl ScraperError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ScraperError::Navigation(_)
            | ScraperError::Timeout(_)
            | ScraperError::Script(_)
            | ScraperError::Parse(_)
            | ScraperError::Provider { .. } => ErrorKind::Provider,
            ScraperError::SessionLaunch(_) => ErrorKind::Session,
            ScraperError::Http(_) | ScraperError::HttpStatus(_) | ScraperError::Io(_) => {
                ErrorKind::Download
            }
            ScraperError::Catalog(_) => ErrorKind::Catalog,
            ScraperError::Configuration(_)
            | ScraperError::Serialization(_)
            | ScraperError::Queue(_) => ErrorKind::Internal,
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ScraperError::Catalog(_) | ScraperError::Configuration(_)
        )
    }

    pub fn provider(provider: &str, message: impl Into<String>) -> Self {
        ScraperError::Provider {
            provider: provider.to_string(),
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for ScraperError {
    fn from(err: std::io::Error) -> Self {
        ScraperError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for ScraperError {
    fn from(err: serde_json::Error) -> Self {
        ScraperError::Serialization(err.to_string())
    }
}

impl From<reqwest::Error> for ScraperError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => ScraperError::HttpStatus(status.as_u16()),
            None => ScraperError::Http(err.to_string()),
        }
    }
}

impl From<chromiumoxide::error::CdpError> for ScraperError {
    fn from(err: chromiumoxide::error::CdpError) -> Self {
        ScraperError::Navigation(err.to_string())
    }
}

//! Plain HTTP image downloads
//!
//! Downloads never touch a browser session. The HTTP client sits behind the
//! [`ImageFetcher`] capability so the pipeline can be exercised without a network.

use crate::{format_bytes, sanitize_filename, ImageCandidate, ScraperError};
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, REFERER, USER_AGENT};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use url::Url;

const ACCEPT_IMAGES: &str = "image/avif,image/webp,image/apng,image/*,*/*;q=0.8";
const ACCEPT_LANGUAGE_VALUE: &str = "en-US,en;q=0.9";
const DEFAULT_EXTENSION: &str = "jpg";

/// Content-type fragments and the extension each maps to, checked in order.
const CONTENT_TYPE_EXTENSIONS: [(&str, &str); 6] = [
    ("jpeg", "jpg"),
    ("jpg", "jpg"),
    ("png", "png"),
    ("gif", "gif"),
    ("webp", "webp"),
    ("svg", "svg"),
];

/// A successful search handed to the download pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadTask {
    pub item_name: String,
    pub candidate: ImageCandidate,
}

pub type ByteStream = BoxStream<'static, Result<Vec<u8>, ScraperError>>;

pub struct HttpResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: ByteStream,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[async_trait]
pub trait ImageFetcher: Send + Sync {
    async fn get(
        &self,
        url: &str,
        headers: HeaderMap,
        timeout: Duration,
    ) -> Result<HttpResponse, ScraperError>;
}

/// [`ImageFetcher`] backed by a shared `reqwest` client.
#[derive(Clone, Default)]
pub struct ReqwestFetcher {
    client: reqwest::Client,
}

impl ReqwestFetcher {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ImageFetcher for ReqwestFetcher {
    async fn get(
        &self,
        url: &str,
        headers: HeaderMap,
        timeout: Duration,
    ) -> Result<HttpResponse, ScraperError> {
        // The request timeout covers reading the body as well
        let response = self
            .client
            .get(url)
            .headers(headers)
            .timeout(timeout)
            .send()
            .await?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);

        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map(|bytes| bytes.to_vec()).map_err(ScraperError::from))
            .boxed();

        Ok(HttpResponse {
            status,
            content_type,
            body,
        })
    }
}

/// Browser-like request headers, with the page the image was found on as referer.
pub fn download_headers(user_agent: &str, referer: &str) -> Result<HeaderMap, ScraperError> {
    let value = |raw: &str| {
        HeaderValue::from_str(raw)
            .map_err(|e| ScraperError::Http(format!("invalid header value {raw:?}: {e}")))
    };

    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, value(user_agent)?);
    headers.insert(ACCEPT, HeaderValue::from_static(ACCEPT_IMAGES));
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static(ACCEPT_LANGUAGE_VALUE));
    headers.insert(REFERER, value(referer)?);
    Ok(headers)
}

/// Pick a file extension from the response content type, then the URL path,
/// falling back to `jpg`.
pub fn infer_extension(content_type: Option<&str>, url: &str) -> String {
    if let Some(content_type) = content_type {
        let content_type = content_type.to_lowercase();
        if let Some((_, ext)) = CONTENT_TYPE_EXTENSIONS
            .iter()
            .find(|(fragment, _)| content_type.contains(fragment))
        {
            return ext.to_string();
        }
    }

    url_extension(url).unwrap_or_else(|| DEFAULT_EXTENSION.to_string())
}

fn url_extension(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let file_name = parsed.path_segments()?.last()?;
    let (stem, ext) = file_name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() || ext.len() > 4 {
        return None;
    }
    Some(ext.to_string())
}

/// Fetches candidates into the output directory.
pub struct ImageDownloader {
    fetcher: Arc<dyn ImageFetcher>,
    output_dir: PathBuf,
    user_agent: String,
    timeout: Duration,
}

impl ImageDownloader {
    pub fn new(
        fetcher: Arc<dyn ImageFetcher>,
        output_dir: impl Into<PathBuf>,
        user_agent: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            fetcher,
            output_dir: output_dir.into(),
            user_agent: user_agent.into(),
            timeout,
        }
    }

    /// Download one image and return the path it was written to.
    ///
    /// A non-2xx status is a failure. A file left half-written by a broken
    /// stream is removed before the error is returned.
    pub async fn download(&self, task: &DownloadTask) -> Result<PathBuf, ScraperError> {
        let candidate = &task.candidate;
        let headers = download_headers(&self.user_agent, &candidate.source_page)?;

        debug!("Fetching {} for {}", candidate.url, task.item_name);
        let response = self
            .fetcher
            .get(&candidate.url, headers, self.timeout)
            .await?;

        if !response.is_success() {
            return Err(ScraperError::HttpStatus(response.status));
        }

        let ext = infer_extension(response.content_type.as_deref(), &candidate.url);
        let path = self
            .output_dir
            .join(format!("{}.{}", sanitize_filename(&task.item_name), ext));

        match write_stream(&path, response.body).await {
            Ok(written) => {
                info!(
                    "Downloaded image for {} to {} ({})",
                    task.item_name,
                    path.display(),
                    format_bytes(written)
                );
                Ok(path)
            }
            Err(e) => {
                if let Err(remove_err) = tokio::fs::remove_file(&path).await {
                    warn!(
                        "Could not remove partial file {}: {}",
                        path.display(),
                        remove_err
                    );
                }
                Err(e)
            }
        }
    }
}

async fn write_stream(path: &Path, mut body: ByteStream) -> Result<u64, ScraperError> {
    let mut file = tokio::fs::File::create(path).await?;
    let mut written = 0u64;

    while let Some(chunk) = body.next().await {
        let chunk = chunk?;
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }

    file.flush().await?;
    Ok(written)
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory fetcher for download and pipeline tests.

    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Clone)]
    pub enum FakeResponse {
        Ok {
            content_type: Option<&'static str>,
            chunks: Vec<&'static [u8]>,
        },
        Status(u16),
        BrokenStream,
        Panic,
    }

    #[derive(Default)]
    pub struct FakeFetcher {
        responses: HashMap<String, FakeResponse>,
        pub requests: Mutex<Vec<(String, HeaderMap)>>,
    }

    impl FakeFetcher {
        pub fn with(mut self, url: &str, response: FakeResponse) -> Self {
            self.responses.insert(url.to_string(), response);
            self
        }

        pub fn image(self, url: &str, content_type: &'static str) -> Self {
            self.with(
                url,
                FakeResponse::Ok {
                    content_type: Some(content_type),
                    chunks: vec![&b"\x89PNG"[..], &b"-image-bytes"[..]],
                },
            )
        }
    }

    #[async_trait]
    impl ImageFetcher for FakeFetcher {
        async fn get(
            &self,
            url: &str,
            headers: HeaderMap,
            _timeout: Duration,
        ) -> Result<HttpResponse, ScraperError> {
            self.requests
                .lock()
                .unwrap()
                .push((url.to_string(), headers));

            match self.responses.get(url).cloned() {
                Some(FakeResponse::Ok {
                    content_type,
                    chunks,
                }) => Ok(HttpResponse {
                    status: 200,
                    content_type: content_type.map(str::to_string),
                    body: futures::stream::iter(chunks.into_iter().map(|c| Ok(c.to_vec())))
                        .boxed(),
                }),
                Some(FakeResponse::Status(status)) => Ok(HttpResponse {
                    status,
                    content_type: None,
                    body: futures::stream::empty().boxed(),
                }),
                Some(FakeResponse::BrokenStream) => Ok(HttpResponse {
                    status: 200,
                    content_type: Some("image/jpeg".to_string()),
                    body: futures::stream::iter(vec![
                        Ok(b"partial".to_vec()),
                        Err(ScraperError::Http("connection reset".to_string())),
                    ])
                    .boxed(),
                }),
                Some(FakeResponse::Panic) => panic!("fetcher crashed on {url}"),
                None => Err(ScraperError::Http(format!("no route to {url}"))),
            }
        }
    }
}

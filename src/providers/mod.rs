//! Image sources tried by the search workers, in a fixed priority order.
//!
//! A provider turns an item name into at most one [`ImageCandidate`] by driving
//! a browser session to a site, parsing the rendered HTML with a cascade of
//! CSS selectors and filtering out irrelevant or decorative images.

mod artofliving;
mod google;
mod healthline;
mod pexels;
mod wikimedia;
mod yogajournal;

pub use artofliving::ArtOfLiving;
pub use google::GoogleImages;
pub use healthline::Healthline;
pub use pexels::Pexels;
pub use wikimedia::WikimediaCommons;
pub use yogajournal::YogaJournal;

use crate::{BrowserSession, Config, ScraperError};
use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

/// Substrings that mark decorative images rather than content.
const REJECTED_URL_MARKERS: [&str; 4] = ["icon", "logo", "favicon", "avatar"];

/// An image reference found by a provider, not yet downloaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageCandidate {
    pub url: String,
    pub source_page: String,
    pub provider_id: String,
}

#[async_trait]
pub trait SourceProvider: Send + Sync {
    /// Site identifier recorded with every candidate, e.g. `pexels.com`.
    fn id(&self) -> &'static str;

    async fn search(
        &self,
        item_name: &str,
        session: &dyn BrowserSession,
    ) -> Result<Option<ImageCandidate>, ScraperError>;

    /// Like [`SourceProvider::search`], but failures are logged and reported as
    /// "no candidate" so the caller can move on to the next provider.
    async fn find_image(
        &self,
        item_name: &str,
        session: &dyn BrowserSession,
    ) -> Option<ImageCandidate> {
        match self.search(item_name, session).await {
            Ok(Some(candidate)) if is_usable_image_url(&candidate.url) => Some(candidate),
            Ok(Some(candidate)) => {
                debug!(
                    "Discarding unusable candidate {} from {}",
                    candidate.url,
                    self.id()
                );
                None
            }
            Ok(None) => None,
            Err(e) => {
                warn!("Error searching {} for {}: {}", self.id(), item_name, e);
                None
            }
        }
    }
}

/// The production providers, most specific first. Google image search is the
/// last resort.
pub fn standard_providers(config: &Config) -> Vec<Arc<dyn SourceProvider>> {
    let delay = config.settle_delay();
    vec![
        Arc::new(ArtOfLiving::new(delay)),
        Arc::new(YogaJournal::new(delay)),
        Arc::new(Healthline::new(delay)),
        Arc::new(WikimediaCommons::new(delay)),
        Arc::new(Pexels::new(delay)),
        Arc::new(GoogleImages::new(delay)),
    ]
}

/// How strictly a candidate must relate to the item it is found for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelevancePolicy {
    /// Alt text or URL must mention one of the item's terms
    Strict,
    /// Only decorative images are excluded
    Relaxed,
}

/// Attributes of an `<img>` element relevant to candidate selection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageElement {
    pub src: Option<String>,
    pub alt: String,
    pub data_src: Option<String>,
    pub data_iurl: Option<String>,
    pub data_large_src: Option<String>,
}

impl ImageElement {
    fn from_element(element: ElementRef<'_>) -> Self {
        let attr = |name: &str| {
            element
                .value()
                .attr(name)
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };

        Self {
            src: attr("src"),
            alt: attr("alt").unwrap_or_default(),
            data_src: attr("data-src"),
            data_iurl: attr("data-iurl"),
            data_large_src: attr("data-large-src"),
        }
    }

    pub fn src_attr(&self) -> Option<String> {
        self.src.clone()
    }
}

/// How to pull an image out of one rendered page.
pub(crate) struct ImageRule {
    /// Tried in order; every selector is exhausted before the next one
    pub selectors: Vec<String>,
    /// Maximum elements examined per selector
    pub limit: usize,
    pub policy: RelevancePolicy,
    pub extract: fn(&ImageElement) -> Option<String>,
}

impl ImageRule {
    /// First image on the page that passes every filter, resolved against `page_url`.
    pub fn pick(&self, html: &str, page_url: &str, terms: &[String]) -> Option<String> {
        let document = Html::parse_document(html);

        for raw in &self.selectors {
            let selector = match parse_selector(raw) {
                Ok(selector) => selector,
                Err(e) => {
                    debug!("Skipping selector: {}", e);
                    continue;
                }
            };

            for element in document.select(&selector).take(self.limit) {
                let image = ImageElement::from_element(element);
                let Some(raw_url) = (self.extract)(&image) else {
                    continue;
                };

                if self.policy == RelevancePolicy::Strict
                    && !is_relevant(terms, &image.alt, &raw_url)
                {
                    continue;
                }

                if let Some(url) = resolve_url(page_url, &raw_url) {
                    if is_usable_image_url(&url) {
                        return Some(url);
                    }
                }
            }
        }

        None
    }
}

fn parse_selector(raw: &str) -> Result<Selector, ScraperError> {
    Selector::parse(raw).map_err(|e| ScraperError::Parse(format!("invalid selector {raw:?}: {e}")))
}

/// Links out of a search result page. The first selector with any match wins.
pub(crate) fn result_links(
    html: &str,
    base: &str,
    selectors: &[&str],
    link_of: fn(ElementRef<'_>) -> Option<String>,
    limit: usize,
) -> Vec<String> {
    let document = Html::parse_document(html);

    for raw in selectors {
        let selector = match parse_selector(raw) {
            Ok(selector) => selector,
            Err(e) => {
                debug!("Skipping selector: {}", e);
                continue;
            }
        };

        let results: Vec<ElementRef<'_>> = document.select(&selector).collect();
        if results.is_empty() {
            continue;
        }

        return results
            .into_iter()
            .take(limit)
            .filter_map(link_of)
            .map(|href| absolutize_link(base, &href))
            .collect();
    }

    Vec::new()
}

/// `href` of the element itself when it is a link, else of its first descendant link.
pub(crate) fn own_or_nested_href(element: ElementRef<'_>) -> Option<String> {
    if element.value().name() == "a" {
        return element.value().attr("href").map(str::to_string);
    }

    let anchor = Selector::parse("a").ok()?;
    element
        .select(&anchor)
        .next()
        .and_then(|a| a.value().attr("href"))
        .map(str::to_string)
}

/// Site-relative result links are prefixed with the site origin.
pub(crate) fn absolutize_link(base: &str, href: &str) -> String {
    if href.starts_with("http") {
        href.to_string()
    } else {
        format!("{}{}", base.trim_end_matches('/'), href)
    }
}

/// Form-encode an item name for a query string. Spaces become `+`.
pub fn encode_query(item_name: &str) -> String {
    url::form_urlencoded::byte_serialize(item_name.as_bytes()).collect()
}

/// Lowercased whitespace-separated terms of an item name. Punctuation is kept,
/// so `(Plow` stays `(plow` and a bare `pose` never appears for `... Pose)`.
pub fn search_terms(item_name: &str) -> Vec<String> {
    item_name.split_whitespace().map(str::to_lowercase).collect()
}

/// Value for the trailing `img[alt*=...]` selector: the first term of the name.
pub(crate) fn alt_selector(item_name: &str) -> Option<String> {
    let first = item_name.split_whitespace().next()?.to_lowercase();
    let first: String = first
        .chars()
        .filter(|c| *c != '"' && *c != '\\')
        .collect();
    if first.is_empty() {
        None
    } else {
        Some(format!("img[alt*=\"{first}\"]"))
    }
}

pub fn is_relevant(terms: &[String], alt: &str, url: &str) -> bool {
    let alt = alt.to_lowercase();
    let url = url.to_lowercase();
    terms
        .iter()
        .any(|term| alt.contains(term.as_str()) || url.contains(term.as_str()))
}

/// Absolute http(s) URL that is neither inline data nor a decorative image.
pub fn is_usable_image_url(url: &str) -> bool {
    let lower = url.to_lowercase();
    if lower.starts_with("data:") || lower.contains("data:image") {
        return false;
    }
    if REJECTED_URL_MARKERS
        .iter()
        .any(|marker| lower.contains(marker))
    {
        return false;
    }
    matches!(Url::parse(url), Ok(parsed) if matches!(parsed.scheme(), "http" | "https"))
}

/// Resolve a possibly relative image reference against the page it was found on.
pub fn resolve_url(page_url: &str, raw: &str) -> Option<String> {
    if raw.trim_start().to_lowercase().starts_with("data:") {
        return None;
    }
    let base = Url::parse(page_url).ok()?;
    base.join(raw.trim()).ok().map(String::from)
}

/// Navigate, wait for the page to settle, and return the rendered source.
pub(crate) async fn load(
    session: &dyn BrowserSession,
    url: &str,
    settle: Duration,
) -> Result<String, ScraperError> {
    let html = session.navigate(url).await?;
    if settle.is_zero() {
        return Ok(html);
    }
    tokio::time::sleep(settle).await;
    session.content().await
}

/// Visit result pages one by one until an article yields an image.
pub(crate) async fn first_image_from_articles(
    session: &dyn BrowserSession,
    provider_id: &'static str,
    item_name: &str,
    links: Vec<String>,
    settle: Duration,
    rule: &ImageRule,
) -> Result<Option<ImageCandidate>, ScraperError> {
    let terms = search_terms(item_name);

    for link in links {
        let html = match load(session, &link, settle).await {
            Ok(html) => html,
            Err(e) => {
                warn!(
                    "Error processing {} result for {}: {}",
                    provider_id, item_name, e
                );
                continue;
            }
        };

        if let Some(url) = rule.pick(&html, &link, &terms) {
            return Ok(Some(ImageCandidate {
                url,
                source_page: link,
                provider_id: provider_id.to_string(),
            }));
        }
    }

    Ok(None)
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted browser session for provider tests.

    use super::*;
    use std::collections::{HashMap, HashSet};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct ScriptedSession {
        pages: HashMap<String, String>,
        current: Mutex<String>,
        pub visited: Mutex<Vec<String>>,
        pub scripts: Mutex<Vec<String>>,
        pub cookie_clears: AtomicUsize,
        pub closes: AtomicUsize,
        panic_on_cookie_clear: bool,
    }

    impl ScriptedSession {
        pub fn with_page(mut self, url: &str, html: &str) -> Self {
            self.pages.insert(url.to_string(), html.to_string());
            self
        }

        pub fn panicking_on_cookie_clear(mut self) -> Self {
            self.panic_on_cookie_clear = true;
            self
        }
    }

    #[async_trait]
    impl BrowserSession for ScriptedSession {
        fn id(&self) -> usize {
            0
        }

        async fn navigate(&self, url: &str) -> Result<String, ScraperError> {
            self.visited.lock().unwrap().push(url.to_string());
            let html = self
                .pages
                .get(url)
                .cloned()
                .ok_or_else(|| ScraperError::Navigation(format!("no page at {url}")))?;
            *self.current.lock().unwrap() = html.clone();
            Ok(html)
        }

        async fn content(&self) -> Result<String, ScraperError> {
            Ok(self.current.lock().unwrap().clone())
        }

        async fn execute_script(&self, script: &str) -> Result<(), ScraperError> {
            self.scripts.lock().unwrap().push(script.to_string());
            Ok(())
        }

        async fn clear_cookies(&self) -> Result<(), ScraperError> {
            self.cookie_clears.fetch_add(1, Ordering::SeqCst);
            if self.panic_on_cookie_clear {
                panic!("session crashed while clearing cookies");
            }
            Ok(())
        }

        async fn close(&self) -> Result<(), ScraperError> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum Failure {
        Error,
        Panic,
    }

    /// Provider that answers from a fixed set of item names without a browser.
    pub struct StaticProvider {
        id: &'static str,
        finds: HashSet<String>,
        failure: Option<Failure>,
        latency: Duration,
        pub calls: Mutex<Vec<String>>,
    }

    impl StaticProvider {
        pub fn new(id: &'static str) -> Self {
            Self {
                id,
                finds: HashSet::new(),
                failure: None,
                latency: Duration::ZERO,
                calls: Mutex::new(Vec::new()),
            }
        }

        /// Every search takes `latency` before answering.
        pub fn slow(mut self, latency: Duration) -> Self {
            self.latency = latency;
            self
        }

        pub fn finds(mut self, item_name: &str) -> Self {
            self.finds.insert(item_name.to_string());
            self
        }

        pub fn failing(mut self, failure: Failure) -> Self {
            self.failure = Some(failure);
            self
        }

        pub fn image_url(&self, item_name: &str) -> String {
            format!("https://{}/images/{}.jpg", self.id, encode_query(item_name))
        }

        pub fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl SourceProvider for StaticProvider {
        fn id(&self) -> &'static str {
            self.id
        }

        async fn search(
            &self,
            item_name: &str,
            _session: &dyn BrowserSession,
        ) -> Result<Option<ImageCandidate>, ScraperError> {
            self.calls.lock().unwrap().push(item_name.to_string());
            if !self.latency.is_zero() {
                tokio::time::sleep(self.latency).await;
            }

            match self.failure {
                Some(Failure::Error) => {
                    return Err(ScraperError::Navigation(format!("{} unreachable", self.id)))
                }
                Some(Failure::Panic) => panic!("{} parser blew up", self.id),
                None => {}
            }

            Ok(self.finds.contains(item_name).then(|| ImageCandidate {
                url: self.image_url(item_name),
                source_page: format!("https://{}/search", self.id),
                provider_id: self.id.to_string(),
            }))
        }
    }
}

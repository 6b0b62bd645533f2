use super::{
    alt_selector, encode_query, first_image_from_articles, load, own_or_nested_href,
    result_links, ImageCandidate, ImageElement, ImageRule, RelevancePolicy, SourceProvider,
};
use crate::{BrowserSession, ScraperError};
use async_trait::async_trait;
use std::time::Duration;
use tracing::info;

const BASE_URL: &str = "https://www.healthline.com";

const RESULT_SELECTORS: [&str; 5] = [
    "a.css-2iwa69",
    ".results-page a",
    ".css-al7via a",
    ".search-results a",
    ".search-result-item a",
];

const IMAGE_SELECTORS: [&str; 6] = [
    "article img",
    ".article-body img",
    ".css-8atqhb img",
    ".content img",
    "figure img",
    ".yoga-pose img",
];

pub struct Healthline {
    delay: Duration,
}

impl Healthline {
    pub const ID: &'static str = "healthline.com";

    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }

    pub fn search_url(item_name: &str) -> String {
        format!("{BASE_URL}/search?q1={}%20yoga%20pose", encode_query(item_name))
    }

    fn image_rule(item_name: &str) -> ImageRule {
        let mut selectors: Vec<String> = IMAGE_SELECTORS.iter().map(|s| s.to_string()).collect();
        selectors.extend(alt_selector(item_name));

        ImageRule {
            selectors,
            limit: usize::MAX,
            policy: RelevancePolicy::Strict,
            extract: ImageElement::src_attr,
        }
    }
}

#[async_trait]
impl SourceProvider for Healthline {
    fn id(&self) -> &'static str {
        Self::ID
    }

    async fn search(
        &self,
        item_name: &str,
        session: &dyn BrowserSession,
    ) -> Result<Option<ImageCandidate>, ScraperError> {
        info!("Searching Healthline for: {}", item_name);

        let html = load(session, &Self::search_url(item_name), self.delay * 2).await?;
        let links = result_links(&html, BASE_URL, &RESULT_SELECTORS, own_or_nested_href, 3);
        if links.is_empty() {
            return Ok(None);
        }

        first_image_from_articles(
            session,
            Self::ID,
            item_name,
            links,
            self.delay,
            &Self::image_rule(item_name),
        )
        .await
    }
}

use super::{
    alt_selector, encode_query, first_image_from_articles, load, ImageCandidate, ImageElement,
    ImageRule, RelevancePolicy, SourceProvider,
};
use crate::{BrowserSession, ScraperError};
use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};
use std::time::Duration;
use tracing::info;

const BASE_URL: &str = "https://www.artofliving.org";
const MAX_RESULTS: usize = 3;

/// Art of Living site search, followed into the matching articles.
pub struct ArtOfLiving {
    delay: Duration,
}

impl ArtOfLiving {
    pub const ID: &'static str = "artofliving.org";

    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }

    pub fn search_url(item_name: &str) -> String {
        format!(
            "{BASE_URL}/in-en/search/site/{}%20yoga%20pose",
            encode_query(item_name)
        )
    }

    fn result_links(html: &str) -> Vec<String> {
        let document = Html::parse_document(html);
        let (Ok(items), Ok(title_link)) = (
            Selector::parse("ol.search-results li"),
            Selector::parse("h3.title a"),
        ) else {
            return Vec::new();
        };

        document
            .select(&items)
            .take(MAX_RESULTS)
            .filter_map(|item: ElementRef<'_>| {
                item.select(&title_link)
                    .next()
                    .and_then(|a| a.value().attr("href"))
                    .map(|href| super::absolutize_link(BASE_URL, href))
            })
            .collect()
    }

    fn image_rule(item_name: &str) -> ImageRule {
        let mut selectors: Vec<String> = [
            "div.content img",
            "div.field-body img",
            "article img",
            "div.main-content img",
            "figure img",
            ".yoga-pose-image img",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
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
impl SourceProvider for ArtOfLiving {
    fn id(&self) -> &'static str {
        Self::ID
    }

    async fn search(
        &self,
        item_name: &str,
        session: &dyn BrowserSession,
    ) -> Result<Option<ImageCandidate>, ScraperError> {
        info!("Searching Art of Living for: {}", item_name);

        let html = load(session, &Self::search_url(item_name), self.delay).await?;
        let links = Self::result_links(&html);
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::testing::ScriptedSession;

    const SEARCH_PAGE: &str = r#"
        <ol class="search-results">
          <li><h3 class="title"><a href="/in-en/yoga/poses/missing">Missing</a></h3></li>
          <li><h3 class="title"><a href="/in-en/yoga/poses/plow-pose">Plow Pose</a></h3></li>
          <li><h3 class="title"><a href="https://www.artofliving.org/third">Third</a></h3></li>
          <li><h3 class="title"><a href="/fourth">Fourth</a></h3></li>
        </ol>"#;

    const ARTICLE: &str = r#"
        <div class="content">
          <img src="/sites/logo-halasana.png" alt="Halasana">
          <img src="/sites/default/files/halasana-plow.jpg" alt="Plow pose">
        </div>"#;

    #[test]
    fn test_search_url() {
        assert_eq!(
            ArtOfLiving::search_url("Halasana (Plow Pose)"),
            "https://www.artofliving.org/in-en/search/site/Halasana+%28Plow+Pose%29%20yoga%20pose"
        );
    }

    #[test]
    fn test_result_links_limited_and_absolute() {
        let links = ArtOfLiving::result_links(SEARCH_PAGE);
        assert_eq!(
            links,
            vec![
                "https://www.artofliving.org/in-en/yoga/poses/missing",
                "https://www.artofliving.org/in-en/yoga/poses/plow-pose",
                "https://www.artofliving.org/third",
            ]
        );
    }

    #[tokio::test]
    async fn test_search_skips_broken_results() {
        let name = "Halasana (Plow Pose)";
        let session = ScriptedSession::default()
            .with_page(&ArtOfLiving::search_url(name), SEARCH_PAGE)
            .with_page(
                "https://www.artofliving.org/in-en/yoga/poses/plow-pose",
                ARTICLE,
            );

        let provider = ArtOfLiving::new(Duration::ZERO);
        let candidate = provider.search(name, &session).await.unwrap().unwrap();

        assert_eq!(
            candidate.url,
            "https://www.artofliving.org/sites/default/files/halasana-plow.jpg"
        );
        assert_eq!(
            candidate.source_page,
            "https://www.artofliving.org/in-en/yoga/poses/plow-pose"
        );
        assert_eq!(candidate.provider_id, "artofliving.org");
    }

    #[tokio::test]
    async fn test_find_image_swallows_navigation_failure() {
        let provider = ArtOfLiving::new(Duration::ZERO);
        let session = ScriptedSession::default();
        assert!(provider.find_image("Halasana", &session).await.is_none());
    }
}

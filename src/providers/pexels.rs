use super::{
    encode_query, load, search_terms, ImageCandidate, ImageElement, ImageRule, RelevancePolicy,
    SourceProvider,
};
use crate::{BrowserSession, ScraperError};
use async_trait::async_trait;
use std::time::Duration;
use tracing::info;

const SCROLL_SCRIPT: &str = "window.scrollBy(0, 500);";

/// Pexels stock photo search. Lazy-loaded grid, so the page is scrolled once.
pub struct Pexels {
    delay: Duration,
}

impl Pexels {
    pub const ID: &'static str = "pexels.com";

    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }

    pub fn search_url(item_name: &str) -> String {
        format!(
            "https://www.pexels.com/search/{}%20yoga/",
            encode_query(item_name)
        )
    }

    /// Placeholder `blank.gif` sources are replaced by the lazy-load attribute.
    fn lazy_src(image: &ImageElement) -> Option<String> {
        match &image.src {
            Some(src) if !src.ends_with("blank.gif") => Some(src.clone()),
            _ => image.data_large_src.clone(),
        }
    }

    fn image_rule() -> ImageRule {
        ImageRule {
            selectors: vec!["article img".to_string()],
            limit: 5,
            policy: RelevancePolicy::Strict,
            extract: Self::lazy_src,
        }
    }
}

#[async_trait]
impl SourceProvider for Pexels {
    fn id(&self) -> &'static str {
        Self::ID
    }

    async fn search(
        &self,
        item_name: &str,
        session: &dyn BrowserSession,
    ) -> Result<Option<ImageCandidate>, ScraperError> {
        info!("Searching Pexels for: {}", item_name);

        let search_url = Self::search_url(item_name);
        load(session, &search_url, self.delay * 2).await?;

        session.execute_script(SCROLL_SCRIPT).await?;
        tokio::time::sleep(self.delay).await;
        let html = session.content().await?;

        Ok(Self::image_rule()
            .pick(&html, &search_url, &search_terms(item_name))
            .map(|url| ImageCandidate {
                url,
                source_page: search_url,
                provider_id: Self::ID.to_string(),
            }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::testing::ScriptedSession;

    #[test]
    fn test_lazy_src_prefers_real_src() {
        let image = ImageElement {
            src: Some("https://images.pexels.com/photos/1/pose.jpeg".to_string()),
            data_large_src: Some("https://images.pexels.com/photos/1/large.jpeg".to_string()),
            ..Default::default()
        };
        assert_eq!(
            Pexels::lazy_src(&image).as_deref(),
            Some("https://images.pexels.com/photos/1/pose.jpeg")
        );

        let placeholder = ImageElement {
            src: Some("/assets/blank.gif".to_string()),
            ..image
        };
        assert_eq!(
            Pexels::lazy_src(&placeholder).as_deref(),
            Some("https://images.pexels.com/photos/1/large.jpeg")
        );
    }

    #[tokio::test]
    async fn test_search_scrolls_before_reading_grid() {
        let name = "Tadasana (Mountain Pose)";
        let page = r#"
            <article><img src="/assets/blank.gif"
                data-large-src="https://images.pexels.com/photos/42/woman-mountain-pose.jpeg"
                alt="Woman standing in mountain pose"></article>
            <article><img src="https://images.pexels.com/photos/43/tadasana-stretch.jpeg"
                alt="Tadasana stretch"></article>"#;
        let session = ScriptedSession::default().with_page(&Pexels::search_url(name), page);

        let candidate = Pexels::new(Duration::ZERO)
            .search(name, &session)
            .await
            .unwrap()
            .unwrap();

        // "mountain pose" alone does not match the terms "(mountain" and "pose)"
        assert_eq!(
            candidate.url,
            "https://images.pexels.com/photos/43/tadasana-stretch.jpeg"
        );
        assert_eq!(candidate.source_page, Pexels::search_url(name));
        assert_eq!(
            *session.scripts.lock().unwrap(),
            vec![SCROLL_SCRIPT.to_string()]
        );
    }
}

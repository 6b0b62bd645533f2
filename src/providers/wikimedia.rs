use super::{
    encode_query, load, search_terms, ImageCandidate, ImageElement, ImageRule, RelevancePolicy,
    SourceProvider,
};
use crate::{BrowserSession, ScraperError};
use async_trait::async_trait;
use std::time::Duration;
use tracing::info;

/// Wikimedia Commons media search. Images are taken straight from the result grid.
pub struct WikimediaCommons {
    delay: Duration,
}

impl WikimediaCommons {
    pub const ID: &'static str = "wikimedia.org";

    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }

    pub fn search_url(item_name: &str) -> String {
        format!(
            "https://commons.wikimedia.org/w/index.php?search={}+yoga&title=Special:MediaSearch&type=image",
            encode_query(item_name)
        )
    }

    fn image_rule() -> ImageRule {
        ImageRule {
            selectors: vec![".sdms-search-results img, .sdms-grid-view-item img".to_string()],
            limit: 5,
            policy: RelevancePolicy::Strict,
            extract: ImageElement::src_attr,
        }
    }
}

#[async_trait]
impl SourceProvider for WikimediaCommons {
    fn id(&self) -> &'static str {
        Self::ID
    }

    async fn search(
        &self,
        item_name: &str,
        session: &dyn BrowserSession,
    ) -> Result<Option<ImageCandidate>, ScraperError> {
        info!("Searching Wikimedia Commons for: {}", item_name);

        let search_url = Self::search_url(item_name);
        let html = load(session, &search_url, self.delay).await?;

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

    fn grid(images: &[(&str, &str)]) -> String {
        let items: String = images
            .iter()
            .map(|(src, alt)| {
                format!(r#"<div class="sdms-grid-view-item"><img src="{src}" alt="{alt}"></div>"#)
            })
            .collect();
        format!(r#"<div class="sdms-search-results">{items}</div>"#)
    }

    #[tokio::test]
    async fn test_protocol_relative_thumbnail_is_resolved() {
        let name = "Vajrasana";
        let page = grid(&[(
            "//upload.wikimedia.org/wikipedia/commons/thumb/Vajrasana.jpg",
            "Vajrasana pose",
        )]);
        let session =
            ScriptedSession::default().with_page(&WikimediaCommons::search_url(name), &page);

        let candidate = WikimediaCommons::new(Duration::ZERO)
            .search(name, &session)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(
            candidate.url,
            "https://upload.wikimedia.org/wikipedia/commons/thumb/Vajrasana.jpg"
        );
        assert_eq!(candidate.source_page, WikimediaCommons::search_url(name));
    }

    #[tokio::test]
    async fn test_only_first_five_results_are_considered() {
        let name = "Vajrasana";
        let mut images = vec![("//upload.wikimedia.org/mountain.jpg", "Mountain"); 5];
        images.push(("//upload.wikimedia.org/vajrasana.jpg", "Vajrasana"));
        let session = ScriptedSession::default()
            .with_page(&WikimediaCommons::search_url(name), &grid(&images));

        let result = WikimediaCommons::new(Duration::ZERO)
            .search(name, &session)
            .await
            .unwrap();
        assert_eq!(result, None);
    }
}

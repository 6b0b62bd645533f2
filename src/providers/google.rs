use super::{
    encode_query, load, search_terms, ImageCandidate, ImageElement, ImageRule, RelevancePolicy,
    SourceProvider,
};
use crate::{BrowserSession, ScraperError};
use async_trait::async_trait;
use std::time::Duration;
use tracing::info;

const SCROLL_SCRIPT: &str = "window.scrollTo(0, document.body.scrollHeight);";

const IMAGE_SELECTORS: [&str; 4] = ["img.rg_i", "img.Q4LuWd", "img.n3VNCb", ".islir img"];

/// Google image search, the last resort. Thumbnails carry no useful alt text,
/// so only decorative images are filtered out.
pub struct GoogleImages {
    delay: Duration,
}

impl GoogleImages {
    pub const ID: &'static str = "google.com";

    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }

    pub fn search_url(item_name: &str) -> String {
        format!(
            "https://www.google.com/search?q={}+yoga+pose&tbm=isch",
            encode_query(item_name)
        )
    }

    /// Inline base64 thumbnails are skipped in favour of the deferred source attributes.
    fn thumbnail_src(image: &ImageElement) -> Option<String> {
        match &image.src {
            Some(src) if !src.starts_with("data:image") => Some(src.clone()),
            _ => image.data_src.clone().or_else(|| image.data_iurl.clone()),
        }
    }

    fn image_rule() -> ImageRule {
        ImageRule {
            selectors: IMAGE_SELECTORS.iter().map(|s| s.to_string()).collect(),
            limit: 10,
            policy: RelevancePolicy::Relaxed,
            extract: Self::thumbnail_src,
        }
    }
}

#[async_trait]
impl SourceProvider for GoogleImages {
    fn id(&self) -> &'static str {
        Self::ID
    }

    async fn search(
        &self,
        item_name: &str,
        session: &dyn BrowserSession,
    ) -> Result<Option<ImageCandidate>, ScraperError> {
        info!("Searching Google Images for: {}", item_name);

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

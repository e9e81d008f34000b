use std::time::Duration;
use url::Url;

/// A fully loaded page as returned by a renderer.
#[derive(Debug, Clone)]
pub struct RenderedPage {
    /// URL the content was served from after redirects.
    pub url: Url,
    pub status_code: u16,
    pub response_time: Duration,
    /// Serialized document.
    pub content: String,
    /// Absolute URLs referenced by link/script/img/source elements, with
    /// srcset lists already split into individual URLs.
    pub resource_urls: Vec<Url>,
}

impl RenderedPage {
    pub fn new(url: Url, content: String) -> Self {
        Self {
            url,
            status_code: 200,
            response_time: Duration::from_secs(0),
            content,
            resource_urls: Vec::new(),
        }
    }

    pub fn with_resources(mut self, resource_urls: Vec<Url>) -> Self {
        self.resource_urls = resource_urls;
        self
    }
}

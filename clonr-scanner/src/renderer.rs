use async_trait::async_trait;
use reqwest::Client;
use scraper::{Html, Selector};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;
use url::Url;

use crate::error::{Result, ScanError};
use crate::proxy::{ProxyEndpoint, ProxySource};
use crate::result::RenderedPage;

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/114.0.0.0 Safari/537.36";

/// A page-loading session.
///
/// Implementations are free to be as heavy as a real browser; callers only
/// rely on the two operations below and treat every error as a failed load.
#[async_trait]
pub trait Renderer: Send + Sync {
    /// Load `url` and return the absolute URLs of its outbound anchors.
    async fn load_and_extract_links(&self, url: &Url, timeout: Duration) -> Result<Vec<Url>>;

    /// Load `url` completely and return its content plus referenced resources.
    async fn load_full_page(&self, url: &Url, timeout: Duration) -> Result<RenderedPage>;
}

/// Opens renderer sessions. A session may hold a proxy and cookies, so the
/// orchestrator decides whether one session lives for a whole run or a page.
#[async_trait]
pub trait RendererFactory: Send + Sync {
    async fn open_session(&self) -> Result<Box<dyn Renderer>>;
}

/// Static-HTML renderer over reqwest + scraper. It does not execute scripts;
/// the content it returns is the document as served.
pub struct HttpRenderer {
    client: Client,
}

impl HttpRenderer {
    pub fn new(user_agent: &str, proxy: Option<&ProxyEndpoint>) -> Result<Self> {
        let mut builder = Client::builder()
            .user_agent(user_agent)
            .cookie_store(true)
            .gzip(true)
            .connect_timeout(Duration::from_secs(10))
            .pool_idle_timeout(Duration::from_secs(90))
            .redirect(reqwest::redirect::Policy::limited(5));

        if let Some(proxy) = proxy {
            builder = builder.proxy(proxy.to_reqwest()?);
        }

        let client = builder
            .build()
            .map_err(|e| ScanError::RenderError(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self { client })
    }

    async fn get_document(&self, url: &Url, timeout: Duration) -> Result<RenderedPage> {
        debug!("Loading {}", url);

        let start = Instant::now();
        let response = self
            .client
            .get(url.clone())
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| request_error(url, timeout, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ScanError::RenderError(format!(
                "{} returned HTTP {}",
                url,
                status.as_u16()
            )));
        }

        if let Some(content_type) = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            && !is_document_type(content_type)
        {
            return Err(ScanError::RenderError(format!(
                "{} is not a document ({})",
                url, content_type
            )));
        }

        let final_url = response.url().clone();
        let body = response
            .text()
            .await
            .map_err(|e| request_error(url, timeout, e))?;

        let mut page = RenderedPage::new(final_url, body);
        page.status_code = status.as_u16();
        page.response_time = start.elapsed();
        Ok(page)
    }
}

#[async_trait]
impl Renderer for HttpRenderer {
    async fn load_and_extract_links(&self, url: &Url, timeout: Duration) -> Result<Vec<Url>> {
        let page = self.get_document(url, timeout).await?;
        extract_links(&page.content, &page.url)
    }

    async fn load_full_page(&self, url: &Url, timeout: Duration) -> Result<RenderedPage> {
        let page = self.get_document(url, timeout).await?;
        let resources = extract_resources(&page.content, &page.url)?;
        Ok(page.with_resources(resources))
    }
}

/// HTML, XML and plain text can be saved as text; anything else would be
/// mangled by text decoding. A missing content type is given the benefit of
/// the doubt.
fn is_document_type(content_type: &str) -> bool {
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    mime.is_empty() || mime.starts_with("text/") || mime.contains("html") || mime.ends_with("xml")
}

fn request_error(url: &Url, timeout: Duration, error: reqwest::Error) -> ScanError {
    if error.is_timeout() {
        ScanError::RenderTimeout {
            url: url.to_string(),
            timeout,
        }
    } else {
        ScanError::RenderError(format!("{}: {}", url, error))
    }
}

/// Opens one [`HttpRenderer`] per session, each on the next proxy in the
/// rotation.
pub struct HttpSessionFactory {
    user_agent: String,
    proxies: Arc<dyn ProxySource>,
}

impl HttpSessionFactory {
    pub fn new(user_agent: impl Into<String>, proxies: Arc<dyn ProxySource>) -> Self {
        Self {
            user_agent: user_agent.into(),
            proxies,
        }
    }
}

#[async_trait]
impl RendererFactory for HttpSessionFactory {
    async fn open_session(&self) -> Result<Box<dyn Renderer>> {
        let proxy = self.proxies.next();
        match &proxy {
            Some(p) => debug!("Opening renderer session via proxy {}:{}", p.host, p.port),
            None => debug!("Opening renderer session without proxy"),
        }
        Ok(Box::new(HttpRenderer::new(&self.user_agent, proxy.as_ref())?))
    }
}

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| ScanError::Other(format!("bad selector {}: {}", css, e)))
}

/// Anchor targets of `html`, resolved against `base`, fragments removed.
pub fn extract_links(html: &str, base: &Url) -> Result<Vec<Url>> {
    let document = Html::parse_document(html);
    let anchors = selector("a[href]")?;

    let mut links = Vec::new();
    for element in document.select(&anchors) {
        if let Some(href) = element.value().attr("href")
            && let Some(mut url) = resolve_reference(base, href)
        {
            url.set_fragment(None);
            links.push(url);
        }
    }
    Ok(links)
}

/// Resource URLs referenced by `link[href]`, `script[src]`, `img[src]`,
/// `img[srcset]`, `source[src]` and `source[srcset]`, deduplicated in
/// document order.
pub fn extract_resources(html: &str, base: &Url) -> Result<Vec<Url>> {
    let document = Html::parse_document(html);
    let sources = [
        ("link[href]", "href", false),
        ("script[src]", "src", false),
        ("img[src]", "src", false),
        ("img[srcset]", "srcset", true),
        ("source[src]", "src", false),
        ("source[srcset]", "srcset", true),
    ];

    let mut seen = HashSet::new();
    let mut resources = Vec::new();
    for (css, attr, multi) in sources {
        let sel = selector(css)?;
        for element in document.select(&sel) {
            let Some(value) = element.value().attr(attr) else {
                continue;
            };
            let candidates = if multi {
                split_srcset(value)
            } else {
                vec![value]
            };
            for candidate in candidates {
                if let Some(url) = resolve_reference(base, candidate)
                    && seen.insert(url.to_string())
                {
                    resources.push(url);
                }
            }
        }
    }
    Ok(resources)
}

/// URL tokens of a srcset value, descriptors dropped.
pub fn split_srcset(srcset: &str) -> Vec<&str> {
    srcset
        .split(',')
        .filter_map(|candidate| candidate.split_whitespace().next())
        .collect()
}

fn resolve_reference(base: &Url, raw: &str) -> Option<Url> {
    let raw = raw.trim();
    if raw.is_empty()
        || raw.starts_with('#')
        || raw.starts_with("javascript:")
        || raw.starts_with("mailto:")
        || raw.starts_with("tel:")
        || raw.starts_with("data:")
    {
        return None;
    }

    let resolved = base.join(raw).ok()?;
    matches!(resolved.scheme(), "http" | "https").then_some(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::ProxyRotation;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{method, path},
    };

    fn html_response(body: &str) -> ResponseTemplate {
        ResponseTemplate::new(200)
            .insert_header("content-type", "text/html")
            .set_body_bytes(body.as_bytes().to_vec())
    }

    #[test]
    fn test_extract_links_resolves_and_filters() {
        let base = Url::parse("https://example.test/docs/intro").unwrap();
        let html = r##"<html><body>
            <a href="/a">A</a>
            <a href="b#part">B</a>
            <a href="https://other.test/x">X</a>
            <a href="#top">Top</a>
            <a href="mailto:me@example.test">Mail</a>
            <a href="javascript:void(0)">JS</a>
            <a>No href</a>
        </body></html>"##;

        let links: Vec<String> = extract_links(html, &base)
            .unwrap()
            .into_iter()
            .map(|u| u.to_string())
            .collect();

        assert_eq!(
            links,
            vec![
                "https://example.test/a",
                "https://example.test/docs/b",
                "https://other.test/x",
            ]
        );
    }

    #[test]
    fn test_extract_resources_covers_all_elements() {
        let base = Url::parse("https://example.test/").unwrap();
        let html = r#"<html><head>
            <link rel="stylesheet" href="/css/site.css">
            <script src="/js/app.js"></script>
            <script>inline()</script>
        </head><body>
            <img src="/img/logo.png" srcset="/img/logo-2x.png 2x, /img/logo-3x.png 3x">
            <picture><source srcset="/img/hero.webp 1x, /img/hero@2.webp 2x"><source src="/media/clip.mp4"></picture>
            <img src="data:image/png;base64,AAAA">
            <img src="/img/logo.png">
        </body></html>"#;

        let resources: Vec<String> = extract_resources(html, &base)
            .unwrap()
            .into_iter()
            .map(|u| u.path().to_string())
            .collect();

        assert_eq!(
            resources,
            vec![
                "/css/site.css",
                "/js/app.js",
                "/img/logo.png",
                "/img/logo-2x.png",
                "/img/logo-3x.png",
                "/media/clip.mp4",
                "/img/hero.webp",
                "/img/hero@2.webp",
            ]
        );
    }

    #[test]
    fn test_split_srcset() {
        assert_eq!(
            split_srcset("a.png 1x,  b.png 2x ,c.png"),
            vec!["a.png", "b.png", "c.png"]
        );
        assert!(split_srcset("  ").is_empty());
    }

    #[tokio::test]
    async fn test_http_renderer_links() {
        let mock_server = MockServer::start().await;
        let root_html = format!(
            r#"<html><body><a href="/page1">1</a><a href="{}/page2">2</a></body></html>"#,
            mock_server.uri()
        );
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(html_response(&root_html))
            .mount(&mock_server)
            .await;

        let renderer = HttpRenderer::new(DEFAULT_USER_AGENT, None).unwrap();
        let url = Url::parse(&mock_server.uri()).unwrap();
        let links = renderer
            .load_and_extract_links(&url, Duration::from_secs(5))
            .await
            .unwrap();

        let paths: Vec<&str> = links.iter().map(|u| u.path()).collect();
        assert_eq!(paths, vec!["/page1", "/page2"]);
    }

    #[tokio::test]
    async fn test_http_renderer_full_page() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/about"))
            .respond_with(html_response(
                r#"<html><head><link href="/s.css" rel="stylesheet"></head><body>About</body></html>"#,
            ))
            .mount(&mock_server)
            .await;

        let renderer = HttpRenderer::new(DEFAULT_USER_AGENT, None).unwrap();
        let url = Url::parse(&format!("{}/about", mock_server.uri())).unwrap();
        let page = renderer
            .load_full_page(&url, Duration::from_secs(5))
            .await
            .unwrap();

        assert_eq!(page.status_code, 200);
        assert!(page.content.contains("About"));
        assert_eq!(page.resource_urls.len(), 1);
        assert_eq!(page.resource_urls[0].path(), "/s.css");
    }

    #[tokio::test]
    async fn test_http_error_status_is_render_error() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/blocked"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&mock_server)
            .await;

        let renderer = HttpRenderer::new(DEFAULT_USER_AGENT, None).unwrap();
        let url = Url::parse(&format!("{}/blocked", mock_server.uri())).unwrap();
        let err = renderer
            .load_full_page(&url, Duration::from_secs(5))
            .await
            .unwrap_err();

        assert!(matches!(err, ScanError::RenderError(ref msg) if msg.contains("403")));
    }

    #[test]
    fn test_document_types() {
        assert!(is_document_type("text/html; charset=utf-8"));
        assert!(is_document_type("application/xhtml+xml"));
        assert!(is_document_type("text/plain"));
        assert!(!is_document_type("application/pdf"));
        assert!(!is_document_type("image/png"));
    }

    #[tokio::test]
    async fn test_binary_page_is_render_error() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/doc.pdf"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw(b"%PDF-1.7\x00\xff".to_vec(), "application/pdf"),
            )
            .mount(&mock_server)
            .await;

        let renderer = HttpRenderer::new(DEFAULT_USER_AGENT, None).unwrap();
        let url = Url::parse(&format!("{}/doc.pdf", mock_server.uri())).unwrap();
        let err = renderer
            .load_full_page(&url, Duration::from_secs(5))
            .await
            .unwrap_err();

        assert!(matches!(err, ScanError::RenderError(ref msg) if msg.contains("application/pdf")));
    }

    #[tokio::test]
    async fn test_slow_page_is_render_timeout() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/slow"))
            .respond_with(html_response("<html></html>").set_delay(Duration::from_millis(800)))
            .mount(&mock_server)
            .await;

        let renderer = HttpRenderer::new(DEFAULT_USER_AGENT, None).unwrap();
        let url = Url::parse(&format!("{}/slow", mock_server.uri())).unwrap();
        let err = renderer
            .load_and_extract_links(&url, Duration::from_millis(100))
            .await
            .unwrap_err();

        assert!(matches!(err, ScanError::RenderTimeout { .. }));
    }

    #[tokio::test]
    async fn test_session_factory_without_proxy() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(html_response(r#"<a href="/x">x</a>"#))
            .mount(&mock_server)
            .await;

        let factory = HttpSessionFactory::new(DEFAULT_USER_AGENT, Arc::new(ProxyRotation::empty()));
        let session = factory.open_session().await.unwrap();
        let url = Url::parse(&mock_server.uri()).unwrap();
        let links = session
            .load_and_extract_links(&url, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(links.len(), 1);
    }
}

// Shared fakes for the renderer, session factory and asset fetcher.

#![allow(dead_code)]

use async_trait::async_trait;
use clonr_core::{DelayRange, MirrorConfig};
use clonr_scanner::error::{Result, ScanError};
use clonr_scanner::normalize::normalize;
use clonr_scanner::{Fetcher, RenderedPage, Renderer, RendererFactory};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use url::Url;

fn key(url: &Url) -> String {
    normalize(url.as_str())
        .map(|u| u.to_string())
        .unwrap_or_else(|_| url.to_string())
}

fn key_str(raw: &str) -> String {
    normalize(raw).map(|u| u.to_string()).unwrap_or_else(|_| raw.to_string())
}

#[derive(Default)]
struct Site {
    links: HashMap<String, Vec<String>>,
    content: HashMap<String, String>,
    resources: HashMap<String, Vec<String>>,
    failing: HashSet<String>,
    hang_after: Option<usize>,
    link_calls: AtomicUsize,
    page_calls: Mutex<HashMap<String, u32>>,
}

/// In-memory website. Cloning shares the same site and counters.
#[derive(Clone, Default)]
pub struct FakeRenderer {
    site: Arc<Site>,
}

pub struct FakeRendererBuilder {
    site: Site,
}

impl FakeRenderer {
    pub fn builder() -> FakeRendererBuilder {
        FakeRendererBuilder {
            site: Site::default(),
        }
    }

    pub fn link_calls(&self) -> usize {
        self.site.link_calls.load(Ordering::SeqCst)
    }

    pub fn page_calls(&self, url: &str) -> u32 {
        self.site
            .page_calls
            .lock()
            .unwrap()
            .get(&key_str(url))
            .copied()
            .unwrap_or(0)
    }

    pub fn total_page_calls(&self) -> u32 {
        self.site.page_calls.lock().unwrap().values().sum()
    }

    pub fn pages_loaded(&self) -> HashSet<String> {
        self.site.page_calls.lock().unwrap().keys().cloned().collect()
    }
}

impl FakeRendererBuilder {
    /// Links are resolved against `page`, so relative values are fine.
    pub fn page(mut self, page: &str, links: &[&str]) -> Self {
        let base = Url::parse(page).unwrap();
        let resolved = links
            .iter()
            .map(|l| base.join(l).unwrap().to_string())
            .collect();
        self.site.links.insert(key_str(page), resolved);
        self
    }

    pub fn content(mut self, page: &str, html: &str, resources: &[&str]) -> Self {
        self.site.content.insert(key_str(page), html.to_string());
        self.site.resources.insert(
            key_str(page),
            resources.iter().map(|r| r.to_string()).collect(),
        );
        self
    }

    pub fn failing(mut self, page: &str) -> Self {
        self.site.failing.insert(key_str(page));
        self
    }

    /// Link extraction never returns once `n` calls have been served.
    pub fn hang_after(mut self, n: usize) -> Self {
        self.site.hang_after = Some(n);
        self
    }

    pub fn build(self) -> FakeRenderer {
        FakeRenderer {
            site: Arc::new(self.site),
        }
    }
}

#[async_trait]
impl Renderer for FakeRenderer {
    async fn load_and_extract_links(&self, url: &Url, _timeout: Duration) -> Result<Vec<Url>> {
        let served = self.site.link_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(limit) = self.site.hang_after
            && served >= limit
        {
            std::future::pending::<()>().await;
        }

        let k = key(url);
        if self.site.failing.contains(&k) {
            return Err(ScanError::RenderError(format!("blocked: {}", url)));
        }
        Ok(self
            .site
            .links
            .get(&k)
            .map(|links| links.iter().filter_map(|l| Url::parse(l).ok()).collect())
            .unwrap_or_default())
    }

    async fn load_full_page(&self, url: &Url, _timeout: Duration) -> Result<RenderedPage> {
        let k = key(url);
        *self
            .site
            .page_calls
            .lock()
            .unwrap()
            .entry(k.clone())
            .or_default() += 1;

        if self.site.failing.contains(&k) {
            return Err(ScanError::RenderError(format!("blocked: {}", url)));
        }

        let content = self
            .site
            .content
            .get(&k)
            .cloned()
            .unwrap_or_else(|| format!("<html><body>{}</body></html>", k));
        let resources = self
            .site
            .resources
            .get(&k)
            .map(|r| r.iter().filter_map(|u| Url::parse(u).ok()).collect())
            .unwrap_or_default();

        Ok(RenderedPage::new(url.clone(), content).with_resources(resources))
    }
}

/// Hands out sessions over one shared [`FakeRenderer`].
#[derive(Clone, Default)]
pub struct FakeFactory {
    pub renderer: FakeRenderer,
    sessions: Arc<AtomicUsize>,
    refuse: bool,
}

impl FakeFactory {
    pub fn new(renderer: FakeRenderer) -> Self {
        Self {
            renderer,
            sessions: Arc::new(AtomicUsize::new(0)),
            refuse: false,
        }
    }

    pub fn refusing() -> Self {
        Self {
            refuse: true,
            ..Self::default()
        }
    }

    pub fn sessions_opened(&self) -> usize {
        self.sessions.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RendererFactory for FakeFactory {
    async fn open_session(&self) -> Result<Box<dyn Renderer>> {
        if self.refuse {
            return Err(ScanError::RenderError("proxy authentication failed".to_string()));
        }
        self.sessions.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(self.renderer.clone()))
    }
}

#[derive(Clone, Default)]
pub struct FakeFetcher {
    assets: Arc<HashMap<String, Vec<u8>>>,
    fetches: Arc<AtomicUsize>,
}

impl FakeFetcher {
    pub fn with_assets(assets: &[(&str, &[u8])]) -> Self {
        Self {
            assets: Arc::new(
                assets
                    .iter()
                    .map(|(u, b)| (u.to_string(), b.to_vec()))
                    .collect(),
            ),
            fetches: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Fetcher for FakeFetcher {
    async fn fetch_bytes(&self, url: &Url) -> Result<Vec<u8>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.assets
            .get(url.as_str())
            .cloned()
            .ok_or_else(|| ScanError::FetchError(format!("404 for {}", url)))
    }
}

/// Test config: no delay between pages, short timeouts, output in `root`.
pub fn test_config(seed: &str, root: &Path) -> MirrorConfig {
    MirrorConfig::new(seed)
        .unwrap()
        .with_output_root(root)
        .with_delay(DelayRange::none())
        .with_discovery_timeout(Duration::from_secs(5))
        .with_render_timeout(Duration::from_secs(5))
}

use clonr_scanner::renderer::DEFAULT_USER_AGENT;
use clonr_scanner::{QueryPolicy, UrlNormalizer};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

use crate::error::{CoreError, Result};
use crate::store::state_dir_for;

/// Frontier discipline during discovery.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TraversalOrder {
    /// FIFO frontier.
    #[default]
    BreadthFirst,
    /// LIFO frontier.
    DepthFirst,
}

/// Lifetime of a renderer session while mirroring.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionScope {
    /// One session (and proxy) for the whole mirroring pass.
    #[default]
    PerRun,
    /// A fresh session, on the next proxy, for every page.
    PerPage,
}

/// Inclusive range for the randomized pause between pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelayRange {
    min: Duration,
    max: Duration,
}

impl DelayRange {
    pub fn new(min: Duration, max: Duration) -> Self {
        if min <= max {
            Self { min, max }
        } else {
            Self { min: max, max: min }
        }
    }

    pub fn from_millis(min: u64, max: u64) -> Self {
        Self::new(Duration::from_millis(min), Duration::from_millis(max))
    }

    pub fn none() -> Self {
        Self::new(Duration::ZERO, Duration::ZERO)
    }

    pub fn min(&self) -> Duration {
        self.min
    }

    pub fn max(&self) -> Duration {
        self.max
    }

    pub fn sample(&self) -> Duration {
        if self.max <= self.min {
            return self.min;
        }
        let lo = self.min.as_millis() as u64;
        let hi = self.max.as_millis() as u64;
        Duration::from_millis(rand::rng().random_range(lo..=hi))
    }
}

impl Default for DelayRange {
    fn default() -> Self {
        Self::from_millis(2000, 5000)
    }
}

/// Deepest crawl a run may request. Deeper trees would nest past what the
/// state loader parses back.
pub const MAX_CRAWL_DEPTH: usize = 50;

/// Everything a run needs, built once and passed down explicitly.
#[derive(Debug, Clone)]
pub struct MirrorConfig {
    pub seed: Url,
    pub output_root: PathBuf,
    pub max_pages: usize,
    pub max_depth: usize,
    pub collect_only: bool,
    pub query_policy: QueryPolicy,
    pub traversal: TraversalOrder,
    pub discovery_timeout: Duration,
    pub render_timeout: Duration,
    pub asset_timeout: Duration,
    pub discovery_attempts: u32,
    pub max_attempts: u32,
    pub delay: DelayRange,
    pub session_scope: SessionScope,
    pub user_agent: String,
    pub proxy_file: Option<PathBuf>,
}

impl MirrorConfig {
    /// Defaults: output under `./<host>`, 50 pages, depth 3, query stripped,
    /// 15 s link extraction, 60 s full render, 3 attempts, 2-5 s between pages.
    pub fn new(seed: &str) -> Result<Self> {
        let seed = Url::parse(seed.trim())
            .map_err(|e| CoreError::Setup(format!("invalid seed URL '{}': {}", seed, e)))?;
        let host = seed
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| CoreError::Setup(format!("seed URL '{}' has no host", seed)))?
            .to_string();

        Ok(Self {
            output_root: PathBuf::from(".").join(&host),
            seed,
            max_pages: 50,
            max_depth: 3,
            collect_only: false,
            query_policy: QueryPolicy::Strip,
            traversal: TraversalOrder::BreadthFirst,
            discovery_timeout: Duration::from_secs(15),
            render_timeout: Duration::from_secs(60),
            asset_timeout: Duration::from_secs(30),
            discovery_attempts: 1,
            max_attempts: 3,
            delay: DelayRange::default(),
            session_scope: SessionScope::PerRun,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            proxy_file: None,
        })
    }

    pub fn with_output_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.output_root = root.into();
        self
    }

    pub fn with_max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = max_pages;
        self
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn with_collect_only(mut self, collect_only: bool) -> Self {
        self.collect_only = collect_only;
        self
    }

    pub fn with_query_policy(mut self, policy: QueryPolicy) -> Self {
        self.query_policy = policy;
        self
    }

    pub fn with_traversal(mut self, traversal: TraversalOrder) -> Self {
        self.traversal = traversal;
        self
    }

    pub fn with_discovery_timeout(mut self, timeout: Duration) -> Self {
        self.discovery_timeout = timeout;
        self
    }

    pub fn with_render_timeout(mut self, timeout: Duration) -> Self {
        self.render_timeout = timeout;
        self
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    pub fn with_delay(mut self, delay: DelayRange) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_session_scope(mut self, scope: SessionScope) -> Self {
        self.session_scope = scope;
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn with_proxy_file(mut self, path: Option<PathBuf>) -> Self {
        self.proxy_file = path;
        self
    }

    pub fn seed_host(&self) -> &str {
        self.seed.host_str().unwrap_or_default()
    }

    pub fn normalizer(&self) -> UrlNormalizer {
        UrlNormalizer::new(self.query_policy)
    }

    pub fn state_dir(&self) -> PathBuf {
        state_dir_for(&self.output_root, self.seed_host())
    }

    pub fn validate(&self) -> Result<()> {
        if !matches!(self.seed.scheme(), "http" | "https") {
            return Err(CoreError::Setup(format!(
                "seed URL must be http or https, got '{}'",
                self.seed.scheme()
            )));
        }
        if self.seed_host().is_empty() {
            return Err(CoreError::Setup("seed URL has no host".to_string()));
        }
        if self.max_pages == 0 {
            return Err(CoreError::Setup("max pages must be at least 1".to_string()));
        }
        if self.max_depth > MAX_CRAWL_DEPTH {
            return Err(CoreError::Setup(format!(
                "max depth {} exceeds the limit of {}",
                self.max_depth, MAX_CRAWL_DEPTH
            )));
        }
        if self.max_attempts == 0 || self.discovery_attempts == 0 {
            return Err(CoreError::Setup("attempt counts must be at least 1".to_string()));
        }
        if self.discovery_timeout.is_zero() || self.render_timeout.is_zero() {
            return Err(CoreError::Setup("timeouts must be non-zero".to_string()));
        }
        Ok(())
    }
}

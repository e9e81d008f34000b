//! Round-robin proxy rotation.
//!
//! Proxy files hold one proxy per line as `host:port` or
//! `host:port:user:pass`.

use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{info, warn};

use crate::error::{Result, ScanError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyEndpoint {
    pub host: String,
    pub port: u16,
    pub user: Option<String>,
    pub pass: Option<String>,
}

impl ProxyEndpoint {
    pub fn parse_line(line: &str) -> Option<Self> {
        let parts: Vec<&str> = line.trim().split(':').collect();
        let (host, port, user, pass) = match parts.as_slice() {
            [host, port] => (*host, *port, None, None),
            [host, port, user, pass] => (*host, *port, Some(*user), Some(*pass)),
            _ => return None,
        };
        if host.is_empty() {
            return None;
        }
        let port = port.parse::<u16>().ok()?;
        Some(Self {
            host: host.to_string(),
            port,
            user: user.filter(|u| !u.is_empty()).map(str::to_string),
            pass: pass.filter(|p| !p.is_empty()).map(str::to_string),
        })
    }

    pub fn address(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    /// Build the reqwest proxy; bad settings surface as render errors so a
    /// broken proxy costs one page attempt rather than the run.
    pub fn to_reqwest(&self) -> Result<reqwest::Proxy> {
        let proxy = reqwest::Proxy::all(self.address())
            .map_err(|e| ScanError::RenderError(format!("invalid proxy {}: {}", self.address(), e)))?;
        Ok(match (&self.user, &self.pass) {
            (Some(user), Some(pass)) => proxy.basic_auth(user, pass),
            _ => proxy,
        })
    }
}

pub trait ProxySource: Send + Sync {
    /// Next proxy to use, or `None` to connect directly.
    fn next(&self) -> Option<ProxyEndpoint>;
}

#[derive(Debug, Default)]
pub struct ProxyRotation {
    proxies: Vec<ProxyEndpoint>,
    index: AtomicUsize,
}

impl ProxyRotation {
    pub fn new(proxies: Vec<ProxyEndpoint>) -> Self {
        Self {
            proxies,
            index: AtomicUsize::new(0),
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// Load proxies from a file. A missing file means no proxies.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            warn!("Proxy file not found: {}", path.display());
            return Ok(Self::empty());
        }

        let content = fs::read_to_string(path)?;
        let mut proxies = Vec::new();
        for (lineno, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match ProxyEndpoint::parse_line(line) {
                Some(proxy) => proxies.push(proxy),
                None => warn!(
                    "Skipping malformed proxy on line {} of {}",
                    lineno + 1,
                    path.display()
                ),
            }
        }

        info!("Loaded {} proxies from {}", proxies.len(), path.display());
        Ok(Self::new(proxies))
    }

    pub fn len(&self) -> usize {
        self.proxies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.proxies.is_empty()
    }
}

impl ProxySource for ProxyRotation {
    fn next(&self) -> Option<ProxyEndpoint> {
        if self.proxies.is_empty() {
            return None;
        }
        let i = self.index.fetch_add(1, Ordering::Relaxed);
        Some(self.proxies[i % self.proxies.len()].clone())
    }
}

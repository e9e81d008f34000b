//! URL identity for the crawl.
//!
//! Every comparison between URLs (visited checks, tree lookups, the done
//! set) goes through [`NormalizedUrl`]. Normalization drops the fragment,
//! strips or canonicalizes the query according to [`QueryPolicy`], and
//! collapses the root path so `https://host` and `https://host/` are the
//! same page.

use crate::error::{Result, ScanError};
use serde::{Deserialize, Serialize};
use std::fmt;
use url::{Position, Url};

/// Extensions that identify a resource rather than a page. Links ending in
/// one of these are never followed during discovery.
pub const PAGE_EXCLUDED_EXTENSIONS: &[&str] = &[
    // styles and scripts
    "css", "js", "mjs", "map",
    // images
    "png", "jpg", "jpeg", "gif", "svg", "ico", "webp", "bmp", "avif", "tif", "tiff",
    // fonts
    "woff", "woff2", "ttf", "otf", "eot",
    // media
    "mp4", "webm", "mov", "avi", "mp3", "wav", "ogg", "m4a", "flac",
];

/// Extensions of static assets downloaded and localized while mirroring.
pub const STATIC_ASSET_EXTENSIONS: &[&str] = &[
    "css", "js", "png", "jpg", "jpeg", "gif", "svg", "ico", "woff", "woff2", "ttf",
];

/// What to do with the query string when computing a URL's identity.
///
/// `Strip` (the default) treats `/list?page=2` and `/list` as one page, which
/// keeps parameterized variants from exploding the crawl at the cost of never
/// mirroring them separately. `Keep` sorts the query pairs so that only the
/// parameter order is ignored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueryPolicy {
    #[default]
    Strip,
    Keep,
}

/// Canonical string identity of a page URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NormalizedUrl(String);

impl NormalizedUrl {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn to_url(&self) -> Result<Url> {
        Url::parse(&self.0).map_err(|e| ScanError::InvalidUrl(format!("{}: {}", self.0, e)))
    }

    pub fn host(&self) -> Option<String> {
        Url::parse(&self.0)
            .ok()
            .and_then(|u| u.host_str().map(|h| h.to_string()))
    }
}

impl fmt::Display for NormalizedUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for NormalizedUrl {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct UrlNormalizer {
    policy: QueryPolicy,
}

impl UrlNormalizer {
    pub fn new(policy: QueryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> QueryPolicy {
        self.policy
    }

    /// Normalize a raw absolute URL string.
    pub fn normalize(&self, raw: &str) -> Result<NormalizedUrl> {
        let url = Url::parse(raw.trim())
            .map_err(|e| ScanError::InvalidUrl(format!("{}: {}", raw, e)))?;
        self.normalize_url(&url)
    }

    pub fn normalize_url(&self, url: &Url) -> Result<NormalizedUrl> {
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ScanError::InvalidUrl(format!(
                "{}: unsupported scheme '{}'",
                url,
                url.scheme()
            )));
        }
        if url.host_str().is_none_or(str::is_empty) {
            return Err(ScanError::InvalidUrl(format!("{}: missing host", url)));
        }

        let mut url = url.clone();
        url.set_fragment(None);
        match self.policy {
            QueryPolicy::Strip => url.set_query(None),
            QueryPolicy::Keep => canonicalize_query(&mut url),
        }

        let mut identity = String::from(&url[..Position::BeforePath]);
        let path = url.path();
        if path != "/" {
            identity.push_str(path);
        }
        if let Some(query) = url.query() {
            identity.push('?');
            identity.push_str(query);
        }

        Ok(NormalizedUrl(identity))
    }
}

/// Normalize with the default policy (query stripped).
pub fn normalize(raw: &str) -> Result<NormalizedUrl> {
    UrlNormalizer::default().normalize(raw)
}

fn canonicalize_query(url: &mut Url) {
    let mut pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
    if pairs.is_empty() {
        url.set_query(None);
        return;
    }
    pairs.sort();
    url.query_pairs_mut().clear().extend_pairs(pairs);
}

/// Lowercased extension of the last path segment, ignoring the query.
pub fn path_extension(url: &Url) -> Option<String> {
    let segment = url.path().rsplit('/').next()?;
    let (stem, ext) = segment.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

/// True when the URL looks like a page worth following during discovery.
pub fn is_page_candidate(url: &Url) -> bool {
    match path_extension(url) {
        Some(ext) => !PAGE_EXCLUDED_EXTENSIONS.contains(&ext.as_str()),
        None => true,
    }
}

/// True when the URL names a static asset that gets downloaded locally.
pub fn is_static_asset(url: &Url) -> bool {
    path_extension(url)
        .map(|ext| STATIC_ASSET_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or(false)
}

/// Same-domain filter: the link's hostname must equal the seed's.
pub fn is_same_host(url: &Url, host: &str) -> bool {
    url.host_str()
        .map(|h| h.eq_ignore_ascii_case(host))
        .unwrap_or(false)
}

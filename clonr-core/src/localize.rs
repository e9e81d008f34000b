//! Resource localization and save-path derivation.
//!
//! Rewriting is literal text substitution: every occurrence of a mapped
//! absolute URL in the page is replaced, including occurrences outside of
//! attributes. Srcset lists need no special handling because each URL token
//! is replaced on its own.

use std::path::{Component, Path, PathBuf};
use url::Url;

/// Name given to pages whose path is empty or ends in `/`.
pub const DEFAULT_DOCUMENT: &str = "index.html";

/// An absolute resource URL and the relative path that replaces it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceMapping {
    pub url: String,
    pub local_path: String,
    /// Other spellings of the same resource, e.g. a root-relative
    /// `/static/app.css`. These are only replaced inside quotes.
    pub aliases: Vec<String>,
}

impl ResourceMapping {
    pub fn new(url: impl Into<String>, local_path: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            local_path: local_path.into(),
            aliases: Vec::new(),
        }
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        let alias = alias.into();
        if !alias.is_empty() && alias != self.url && !self.aliases.contains(&alias) {
            self.aliases.push(alias);
        }
        self
    }
}

/// Rewrite `content` so every mapped URL points at its local copy.
///
/// Longer URLs go first so that a URL which is a prefix of another cannot
/// clobber it. The HTML-escaped form (`&amp;`) is rewritten as well.
pub fn localize(content: &str, mappings: &[ResourceMapping]) -> String {
    let mut ordered: Vec<&ResourceMapping> = mappings.iter().collect();
    ordered.sort_by(|a, b| b.url.len().cmp(&a.url.len()).then_with(|| a.url.cmp(&b.url)));

    let mut out = content.to_string();
    for mapping in &ordered {
        if mapping.url.is_empty() {
            continue;
        }
        out = out.replace(&mapping.url, &mapping.local_path);
        if mapping.url.contains('&') {
            out = out.replace(&mapping.url.replace('&', "&amp;"), &mapping.local_path);
        }
    }

    for mapping in &ordered {
        for alias in &mapping.aliases {
            for quote in ['"', '\''] {
                let from = format!("{quote}{alias}{quote}");
                let to = format!("{quote}{}{quote}", mapping.local_path);
                out = out.replace(&from, &to);
            }
        }
    }
    out
}

/// Where a mirrored page lives: `<root>/<host>/<path>`, with `index.html`
/// for directory-like paths and `.html` appended when there is no extension.
pub fn page_save_path(output_root: &Path, url: &Url) -> PathBuf {
    let mut path = host_dir(output_root, url);
    let segments = clean_segments(url);
    let directory_like = url.path().is_empty() || url.path().ends_with('/') || segments.is_empty();

    if directory_like {
        for segment in &segments {
            path.push(segment);
        }
        path.push(DEFAULT_DOCUMENT);
        return path;
    }

    let (last, parents) = segments.split_last().map(|(l, p)| (l.clone(), p)).unwrap_or_default();
    for segment in parents {
        path.push(segment);
    }
    if has_extension(&last) {
        path.push(last);
    } else {
        path.push(format!("{}.html", last));
    }
    path
}

/// Where a downloaded asset lives: `<root>/<asset host>/<asset path>`.
pub fn asset_save_path(output_root: &Path, url: &Url) -> PathBuf {
    let mut path = host_dir(output_root, url);
    let segments = clean_segments(url);
    if segments.is_empty() {
        path.push("index");
    }
    for segment in segments {
        path.push(segment);
    }
    path
}

/// Relative link from a page's directory to `target`, always `/`-separated.
/// File names are percent-encoded so the link resolves back to them.
pub fn relative_link(from_dir: &Path, target: &Path) -> String {
    let relative = pathdiff::diff_paths(target, from_dir).unwrap_or_else(|| target.to_path_buf());
    let parts: Vec<String> = relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(urlencoding::encode(&s.to_string_lossy()).into_owned()),
            Component::ParentDir => Some("..".to_string()),
            Component::CurDir | Component::RootDir | Component::Prefix(_) => None,
        })
        .collect();
    parts.join("/")
}

fn host_dir(output_root: &Path, url: &Url) -> PathBuf {
    output_root.join(url.host_str().unwrap_or("unknown-host"))
}

/// Decoded path segments safe to use as file names: no separators and no
/// empty, `.` or `..` parts.
fn clean_segments(url: &Url) -> Vec<String> {
    url.path()
        .split('/')
        .map(|raw| {
            urlencoding::decode(raw)
                .map(|decoded| decoded.into_owned())
                .unwrap_or_else(|_| raw.to_string())
                .replace(['/', '\\', '\0'], "_")
        })
        .filter(|s| !s.is_empty() && s.as_str() != "." && s.as_str() != "..")
        .collect()
}

fn has_extension(segment: &str) -> bool {
    segment
        .rsplit_once('.')
        .map(|(stem, ext)| !stem.is_empty() && !ext.is_empty())
        .unwrap_or(false)
}

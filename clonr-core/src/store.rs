//! Durable crawl state for one target host.
//!
//! Layout under `<output_root>/.clonr/<host>/`:
//!
//! - `tree.json`    crawl tree, recursive `{url, depth, seq, children}`
//! - `visited.json` JSON array of URLs whose discovery is complete
//! - `done.txt`     newline-delimited URLs whose mirror is on disk
//! - `urls.txt`     every discovered URL in mirror order
//!
//! Every write replaces the whole file through a temp file and a rename in
//! the same directory, so a crash leaves either the old or the new version.
//! Two processes sharing one state directory are not supported.

use clonr_scanner::{NormalizedUrl, UrlNormalizer};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::{CoreError, Result};
use crate::tree::{CrawlTree, TreeRecord};
use crate::urlset::{DoneSet, UrlSet, VisitedSet};

pub const STATE_DIR: &str = ".clonr";
pub const TREE_FILE: &str = "tree.json";
pub const VISITED_FILE: &str = "visited.json";
pub const DONE_FILE: &str = "done.txt";
pub const URL_LIST_FILE: &str = "urls.txt";

pub struct StateStore {
    dir: PathBuf,
    normalizer: UrlNormalizer,
}

/// Everything persisted for a host, loaded in one go.
#[derive(Debug, Clone, Default)]
pub struct StateSnapshot {
    pub tree: Option<CrawlTree>,
    pub visited: VisitedSet,
    pub done: DoneSet,
}

pub fn state_dir_for(output_root: &Path, host: &str) -> PathBuf {
    output_root.join(STATE_DIR).join(host)
}

impl StateStore {
    /// Open (creating if needed) the state directory.
    pub fn open(dir: impl Into<PathBuf>, normalizer: UrlNormalizer) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| {
            CoreError::Setup(format!(
                "cannot create state directory {}: {}",
                dir.display(),
                e
            ))
        })?;
        Ok(Self { dir, normalizer })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self, file: &str) -> PathBuf {
        self.dir.join(file)
    }

    pub fn load_tree(&self) -> Result<Option<CrawlTree>> {
        let path = self.path(TREE_FILE);
        let Some(content) = read_optional(&path)? else {
            return Ok(None);
        };
        let record: TreeRecord = serde_json::from_str(&content).map_err(|e| CoreError::Corrupt {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        let tree = CrawlTree::from_record(&record, &self.normalizer)
            .map_err(|reason| CoreError::Corrupt { path, reason })?;
        Ok(Some(tree))
    }

    pub fn save_tree(&self, tree: &CrawlTree) -> Result<()> {
        let path = self.path(TREE_FILE);
        let Some(record) = tree.to_record() else {
            return Ok(());
        };
        let json = serde_json::to_string_pretty(&record).map_err(|e| CoreError::Persistence {
            path: path.clone(),
            source: io::Error::other(e),
        })?;
        write_state(&path, json.as_bytes())
    }

    pub fn load_visited(&self) -> Result<VisitedSet> {
        let path = self.path(VISITED_FILE);
        let Some(content) = read_optional(&path)? else {
            return Ok(UrlSet::new());
        };
        let raw: Vec<String> = serde_json::from_str(&content).map_err(|e| CoreError::Corrupt {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        self.normalize_all(&path, raw.iter().map(String::as_str))
    }

    pub fn save_visited(&self, visited: &VisitedSet) -> Result<()> {
        let path = self.path(VISITED_FILE);
        let urls: Vec<&str> = visited.iter().map(NormalizedUrl::as_str).collect();
        let json = serde_json::to_string_pretty(&urls).map_err(|e| CoreError::Persistence {
            path: path.clone(),
            source: io::Error::other(e),
        })?;
        write_state(&path, json.as_bytes())
    }

    pub fn load_done(&self) -> Result<DoneSet> {
        let path = self.path(DONE_FILE);
        let Some(content) = read_optional(&path)? else {
            return Ok(UrlSet::new());
        };
        self.normalize_all(
            &path,
            content.lines().map(str::trim).filter(|l| !l.is_empty()),
        )
    }

    pub fn save_done(&self, done: &DoneSet) -> Result<()> {
        write_state(&self.path(DONE_FILE), join_lines(done.iter()).as_bytes())
    }

    /// Export of the discovered URLs in the order mirroring visits them.
    pub fn save_url_list(&self, tree: &CrawlTree) -> Result<()> {
        let nodes = tree.depth_first();
        let content = join_lines(nodes.iter().map(|n| &n.url));
        write_state(&self.path(URL_LIST_FILE), content.as_bytes())
    }

    /// Discovery checkpoint. The tree goes first so the visited set on disk
    /// never names a URL the tree on disk lacks.
    pub fn checkpoint_discovery(&self, tree: &CrawlTree, visited: &VisitedSet) -> Result<()> {
        self.save_tree(tree)?;
        self.save_visited(visited)?;
        debug!(
            "Checkpointed discovery: {} nodes, {} visited",
            tree.len(),
            visited.len()
        );
        Ok(())
    }

    pub fn snapshot(&self) -> Result<StateSnapshot> {
        Ok(StateSnapshot {
            tree: self.load_tree()?,
            visited: self.load_visited()?,
            done: self.load_done()?,
        })
    }

    fn normalize_all<'a>(
        &self,
        path: &Path,
        raw: impl Iterator<Item = &'a str>,
    ) -> Result<UrlSet> {
        let mut set = UrlSet::new();
        for entry in raw {
            let url = self.normalizer.normalize(entry).map_err(|e| CoreError::Corrupt {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
            set.insert(url);
        }
        Ok(set)
    }
}

fn join_lines<'a>(urls: impl Iterator<Item = &'a NormalizedUrl>) -> String {
    let mut out = String::new();
    for url in urls {
        out.push_str(url.as_str());
        out.push('\n');
    }
    out
}

fn read_optional(path: &Path) -> Result<Option<String>> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(CoreError::Corrupt {
            path: path.to_path_buf(),
            reason: e.to_string(),
        }),
    }
}

fn write_state(path: &Path, contents: &[u8]) -> Result<()> {
    atomic_write(path, contents).map_err(|source| CoreError::Persistence {
        path: path.to_path_buf(),
        source,
    })
}

/// Write `contents` to `path` via a synced temp file renamed into place.
pub fn atomic_write(path: &Path, contents: &[u8]) -> io::Result<()> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir)?;
    let mut temp = NamedTempFile::new_in(dir)?;
    temp.write_all(contents)?;
    temp.flush()?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

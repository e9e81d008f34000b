//! Discovery phase: walks same-host links from the seed, growing the crawl
//! tree and checkpointing after every visited node.

use clonr_scanner::normalize::{is_page_candidate, is_same_host};
use clonr_scanner::error::{Result as ScanResult, ScanError};
use clonr_scanner::retry::{RetryPolicy, classify_scan_error, run_with_retry};
use clonr_scanner::{NormalizedUrl, RendererFactory, UrlNormalizer};
use std::collections::VecDeque;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::{MirrorConfig, TraversalOrder};
use crate::error::{CoreError, Result};
use crate::events::{MirrorEvent, ProgressCallback, emit};
use crate::session::{Session, acquire, with_deadline};
use crate::store::{StateStore, VISITED_FILE};
use crate::tree::{CrawlTree, NodeId};
use crate::urlset::VisitedSet;

/// Pending discovery work. FIFO for breadth-first, LIFO for depth-first.
#[derive(Debug)]
pub struct Frontier {
    order: TraversalOrder,
    queue: VecDeque<NodeId>,
}

impl Frontier {
    pub fn new(order: TraversalOrder) -> Self {
        Self {
            order,
            queue: VecDeque::new(),
        }
    }

    /// Everything in the tree that has not been visited yet, in append order.
    pub fn rebuild(tree: &CrawlTree, visited: &VisitedSet, order: TraversalOrder) -> Self {
        let mut frontier = Self::new(order);
        for node in tree.insertion_order() {
            if !visited.contains(&node.url) {
                frontier.push(node.id);
            }
        }
        frontier
    }

    pub fn push(&mut self, id: NodeId) {
        self.queue.push_back(id);
    }

    pub fn pop(&mut self) -> Option<NodeId> {
        match self.order {
            TraversalOrder::BreadthFirst => self.queue.pop_front(),
            TraversalOrder::DepthFirst => self.queue.pop_back(),
        }
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

#[derive(Debug)]
pub struct DiscoveryOutcome {
    pub tree: CrawlTree,
    pub visited: VisitedSet,
    /// Nodes visited by this run, excluding those restored from disk.
    pub newly_visited: usize,
}

pub struct Discovery<'a> {
    config: &'a MirrorConfig,
    store: &'a StateStore,
    normalizer: UrlNormalizer,
    progress: Option<ProgressCallback>,
}

impl<'a> Discovery<'a> {
    pub fn new(config: &'a MirrorConfig, store: &'a StateStore) -> Self {
        Self {
            config,
            store,
            normalizer: config.normalizer(),
            progress: None,
        }
    }

    pub fn with_progress(mut self, progress: Option<ProgressCallback>) -> Self {
        self.progress = progress;
        self
    }

    /// Walk the frontier until it is empty or the page budget is spent.
    ///
    /// The renderer session is opened on the first visit and reused. If it
    /// cannot be opened, that visit fails like any other render error and the
    /// next visit tries again.
    pub async fn run(&self, factory: &dyn RendererFactory) -> Result<DiscoveryOutcome> {
        let (mut tree, mut visited) = self.restore()?;
        let mut frontier = Frontier::rebuild(&tree, &visited, self.config.traversal);
        let already_visited = visited.len();

        info!(
            "Discovery from {} ({} known, {} visited, {} pending)",
            self.config.seed,
            tree.len(),
            already_visited,
            frontier.len()
        );

        let host = self.config.seed_host().to_string();
        let policy = RetryPolicy::new(self.config.discovery_attempts);
        let session: Session = Mutex::new(None);

        while let Some(id) = frontier.pop() {
            if visited.len() >= self.config.max_pages {
                info!("Page budget of {} reached", self.config.max_pages);
                break;
            }

            let Some(node) = tree.node(id) else {
                continue;
            };
            let (url, depth) = (node.url.clone(), node.depth);

            if depth > self.config.max_depth {
                debug!("Skipping {} at depth {}", url, depth);
                emit(
                    &self.progress,
                    MirrorEvent::DiscoverySkipped { url, depth },
                );
                continue;
            }

            let links = match url.to_url() {
                Ok(target) => self.extract_links(factory, &session, &policy, &target).await,
                Err(e) => {
                    warn!("Cannot visit {}: {}", url, e);
                    Vec::new()
                }
            };

            let mut new_children = 0;
            for link in links {
                if tree.len() >= self.config.max_pages {
                    break;
                }
                let Some(child) = self.accept_link(&link, &host) else {
                    continue;
                };
                if depth + 1 > self.config.max_depth || tree.contains(&child) {
                    continue;
                }
                if let Some(child_id) = tree.add_child(id, child) {
                    frontier.push(child_id);
                    new_children += 1;
                }
            }

            visited.insert(url.clone());
            self.store.checkpoint_discovery(&tree, &visited)?;

            debug!("Visited {} (+{} children)", url, new_children);
            emit(
                &self.progress,
                MirrorEvent::Discovered {
                    url,
                    depth,
                    new_children,
                },
            );
        }

        info!(
            "Discovery finished: {} pages in tree, {} visited",
            tree.len(),
            visited.len()
        );

        Ok(DiscoveryOutcome {
            newly_visited: visited.len() - already_visited,
            tree,
            visited,
        })
    }

    /// Load persisted state or start a fresh tree rooted at the seed.
    fn restore(&self) -> Result<(CrawlTree, VisitedSet)> {
        let seed = self.normalizer.normalize_url(&self.config.seed)?;

        let tree = match self.store.load_tree()? {
            Some(tree) => {
                let root = tree.root().map(|n| &n.url);
                if root != Some(&seed) {
                    return Err(CoreError::Setup(format!(
                        "state in {} belongs to {}, not {}",
                        self.store.dir().display(),
                        root.map(NormalizedUrl::as_str).unwrap_or("<empty>"),
                        seed
                    )));
                }
                tree
            }
            None => CrawlTree::with_root(seed),
        };

        let visited = self.store.load_visited()?;
        if let Some(orphan) = visited.iter().find(|u| !tree.contains(u)) {
            return Err(CoreError::Corrupt {
                path: self.store.path(VISITED_FILE),
                reason: format!("{} is visited but missing from the crawl tree", orphan),
            });
        }

        Ok((tree, visited))
    }

    /// A failed extraction yields no links; the node still counts as visited.
    async fn extract_links(
        &self,
        factory: &dyn RendererFactory,
        session: &Session,
        policy: &RetryPolicy,
        target: &Url,
    ) -> Vec<Url> {
        let result = run_with_retry(
            policy,
            move |_| self.links_once(factory, session, target),
            classify_scan_error,
            |attempt, e| debug!("Link extraction attempt {} for {} failed: {}", attempt, target, e),
        )
        .await;

        match result {
            Ok(links) => links,
            Err(e) => {
                warn!("No links from {}: {}", target, e);
                Vec::new()
            }
        }
    }

    async fn links_once(
        &self,
        factory: &dyn RendererFactory,
        session: &Session,
        target: &Url,
    ) -> ScanResult<Vec<Url>> {
        let guard = acquire(session, factory).await?;
        let renderer = guard
            .as_deref()
            .ok_or_else(|| ScanError::Other("renderer session unavailable".to_string()))?;
        let timeout = self.config.discovery_timeout;
        with_deadline(
            target,
            timeout,
            renderer.load_and_extract_links(target, timeout),
        )
        .await
    }

    fn accept_link(&self, link: &Url, host: &str) -> Option<NormalizedUrl> {
        if !is_same_host(link, host) || !is_page_candidate(link) {
            return None;
        }
        match self.normalizer.normalize_url(link) {
            Ok(url) => Some(url),
            Err(e) => {
                debug!("Discarding link {}: {}", link, e);
                None
            }
        }
    }
}

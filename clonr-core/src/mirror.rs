//! Mirroring phase: clones every discovered page in depth-first tree order,
//! skipping pages already in the done set and checkpointing after each one.

use clonr_scanner::error::{Result as ScanResult, ScanError};
use clonr_scanner::normalize::is_static_asset;
use clonr_scanner::retry::{RetryPolicy, classify_scan_error, run_with_retry};
use clonr_scanner::{Fetcher, NormalizedUrl, RendererFactory};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};
use url::{Position, Url};

use crate::config::{MirrorConfig, SessionScope};
use crate::error::Result;
use crate::events::{MirrorEvent, ProgressCallback, emit};
use crate::localize::{ResourceMapping, asset_save_path, localize, page_save_path, relative_link};
use crate::session::{Session, acquire, with_deadline};
use crate::store::{StateStore, atomic_write};
use crate::tree::CrawlTree;
use crate::urlset::DoneSet;

#[derive(Debug)]
pub struct MirrorOutcome {
    /// Pages cloned by this run, in the order they finished.
    pub cloned: Vec<NormalizedUrl>,
    /// Pages that exhausted their attempts; a later run will try them again.
    pub skipped: Vec<NormalizedUrl>,
    /// Tree nodes that were already done before this run started.
    pub already_done: usize,
    pub done: DoneSet,
}

pub struct CloneOrchestrator<'a> {
    config: &'a MirrorConfig,
    store: &'a StateStore,
    factory: &'a dyn RendererFactory,
    fetcher: &'a dyn Fetcher,
    progress: Option<ProgressCallback>,
}

impl<'a> CloneOrchestrator<'a> {
    pub fn new(
        config: &'a MirrorConfig,
        store: &'a StateStore,
        factory: &'a dyn RendererFactory,
        fetcher: &'a dyn Fetcher,
    ) -> Self {
        Self {
            config,
            store,
            factory,
            fetcher,
            progress: None,
        }
    }

    pub fn with_progress(mut self, progress: Option<ProgressCallback>) -> Self {
        self.progress = progress;
        self
    }

    pub async fn run(&self, tree: &CrawlTree) -> Result<MirrorOutcome> {
        let mut done = self.store.load_done()?;
        let order = tree.depth_first();
        let pending: Vec<&NormalizedUrl> = order
            .iter()
            .map(|node| &node.url)
            .filter(|url| !done.contains(url))
            .collect();
        let already_done = order.len() - pending.len();

        info!(
            "Mirroring {} page(s) into {} ({} already done)",
            pending.len(),
            self.config.output_root.display(),
            already_done
        );

        let policy = RetryPolicy::new(self.config.max_attempts);
        let session: Session = Mutex::new(None);
        let fetched: Mutex<HashSet<Url>> = Mutex::new(HashSet::new());
        let mut cloned = Vec::new();
        let mut skipped = Vec::new();

        for (index, url) in pending.iter().enumerate() {
            if index > 0 {
                self.pause().await;
            }

            emit(
                &self.progress,
                MirrorEvent::PageStarted {
                    url: (*url).clone(),
                    index,
                    total: pending.len(),
                },
            );

            if self.config.session_scope == SessionScope::PerPage {
                *session.lock().await = None;
            }

            let target = match url.to_url() {
                Ok(target) => target,
                Err(e) => {
                    error!("Cannot clone {}: {}", url, e);
                    skipped.push((*url).clone());
                    emit(
                        &self.progress,
                        MirrorEvent::PageSkipped {
                            url: (*url).clone(),
                            attempts: 0,
                        },
                    );
                    continue;
                }
            };

            let (session_ref, fetched_ref, target_ref) = (&session, &fetched, &target);
            let max_attempts = policy.max_attempts();
            let result = run_with_retry(
                &policy,
                move |_| self.clone_page(session_ref, fetched_ref, target_ref),
                classify_scan_error,
                |attempt, e| {
                    warn!(
                        "Attempt {}/{} for {} failed: {}",
                        attempt, max_attempts, url, e
                    );
                    if attempt < max_attempts {
                        emit(
                            &self.progress,
                            MirrorEvent::PageRetry {
                                url: (*url).clone(),
                                attempt,
                                max_attempts,
                                error: e.to_string(),
                            },
                        );
                    }
                },
            )
            .await;

            match result {
                Ok(path) => {
                    done.insert((*url).clone());
                    self.store.save_done(&done)?;
                    info!("Cloned {} -> {}", url, path.display());
                    cloned.push((*url).clone());
                    emit(
                        &self.progress,
                        MirrorEvent::PageCloned {
                            url: (*url).clone(),
                            path,
                        },
                    );
                }
                Err(e) => {
                    let attempts = e.attempts();
                    error!(
                        "Skipping {} after {} attempt(s): {}",
                        url,
                        attempts,
                        e.into_inner()
                    );
                    skipped.push((*url).clone());
                    emit(
                        &self.progress,
                        MirrorEvent::PageSkipped {
                            url: (*url).clone(),
                            attempts,
                        },
                    );
                }
            }
        }

        Ok(MirrorOutcome {
            cloned,
            skipped,
            already_done,
            done,
        })
    }

    async fn pause(&self) {
        let delay = self.config.delay.sample();
        if delay.is_zero() {
            return;
        }
        debug!("Waiting {:?} before next page", delay);
        emit(&self.progress, MirrorEvent::Delay(delay));
        tokio::time::sleep(delay).await;
    }

    /// One clone attempt: render, download assets, localize, write.
    async fn clone_page(
        &self,
        session: &Session,
        fetched: &Mutex<HashSet<Url>>,
        url: &Url,
    ) -> ScanResult<PathBuf> {
        let guard = acquire(session, self.factory).await?;
        let renderer = guard
            .as_deref()
            .ok_or_else(|| ScanError::Other("renderer session unavailable".to_string()))?;

        let timeout = self.config.render_timeout;
        let page = with_deadline(url, timeout, renderer.load_full_page(url, timeout)).await?;
        drop(guard);

        let page_path = page_save_path(&self.config.output_root, url);
        let page_dir = page_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.config.output_root.clone());

        let mappings = self
            .download_assets(&page_dir, url, &page.resource_urls, fetched)
            .await;
        let content = localize(&page.content, &mappings);

        write_file(page_path.clone(), content.into_bytes()).await?;
        Ok(page_path)
    }

    /// Fetch every static asset the page references. Failures are logged and
    /// leave the asset's absolute URL in place.
    async fn download_assets(
        &self,
        page_dir: &Path,
        page_url: &Url,
        resources: &[Url],
        fetched: &Mutex<HashSet<Url>>,
    ) -> Vec<ResourceMapping> {
        let mut mappings = Vec::new();

        for resource in resources.iter().filter(|r| is_static_asset(r)) {
            let asset_path = asset_save_path(&self.config.output_root, resource);

            let already_fetched = fetched.lock().await.contains(resource);
            if !already_fetched {
                if let Err(e) = self.download(resource, &asset_path).await {
                    warn!("Skipping asset {}: {}", resource, e);
                    continue;
                }
                fetched.lock().await.insert(resource.clone());
            }

            let mut mapping =
                ResourceMapping::new(resource.as_str(), relative_link(page_dir, &asset_path));
            if resource.origin() == page_url.origin() {
                mapping = mapping.with_alias(&resource[Position::BeforePath..Position::AfterQuery]);
            }
            mappings.push(mapping);
        }

        mappings
    }

    async fn download(&self, resource: &Url, path: &Path) -> ScanResult<()> {
        let bytes = tokio::time::timeout(
            self.config.asset_timeout,
            self.fetcher.fetch_bytes(resource),
        )
        .await
        .map_err(|_| {
            ScanError::FetchError(format!(
                "{} timed out after {:?}",
                resource, self.config.asset_timeout
            ))
        })??;
        debug!("Fetched {} ({} bytes)", resource, bytes.len());
        write_file(path.to_path_buf(), bytes).await
    }
}

/// Replace `path` atomically, creating parent directories as needed.
async fn write_file(path: PathBuf, contents: Vec<u8>) -> ScanResult<()> {
    tokio::task::spawn_blocking(move || atomic_write(&path, &contents))
    .await
    .map_err(|e| ScanError::Other(format!("write task failed: {}", e)))??;
    Ok(())
}

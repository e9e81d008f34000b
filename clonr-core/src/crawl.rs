use clonr_scanner::{
    Fetcher, HttpFetcher, HttpSessionFactory, NormalizedUrl, ProxyRotation, ProxySource,
    RendererFactory,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

use crate::config::MirrorConfig;
use crate::discover::Discovery;
use crate::error::{CoreError, Result};
use crate::events::ProgressCallback;
use crate::mirror::CloneOrchestrator;
use crate::store::{StateSnapshot, StateStore};

/// Final counts for one run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub pages_discovered: usize,
    pub pages_visited: usize,
    pub newly_visited: usize,
    pub newly_mirrored: usize,
    pub already_done: usize,
    pub total_done: usize,
    pub skipped: Vec<String>,
    pub collect_only: bool,
}

/// Discover, then (unless collect-only) mirror.
///
/// Only setup and persistence problems are returned as errors; page-level
/// failures are logged and counted.
pub async fn execute_clone(
    config: &MirrorConfig,
    factory: &dyn RendererFactory,
    fetcher: &dyn Fetcher,
    progress: Option<ProgressCallback>,
) -> Result<RunSummary> {
    config.validate()?;

    std::fs::create_dir_all(&config.output_root).map_err(|e| {
        CoreError::Setup(format!(
            "cannot create output directory {}: {}",
            config.output_root.display(),
            e
        ))
    })?;
    let store = StateStore::open(config.state_dir(), config.normalizer())?;

    let discovery = Discovery::new(config, &store)
        .with_progress(progress.clone())
        .run(factory)
        .await?;

    store.save_url_list(&discovery.tree)?;

    let mut summary = RunSummary {
        pages_discovered: discovery.tree.len(),
        pages_visited: discovery.visited.len(),
        newly_visited: discovery.newly_visited,
        collect_only: config.collect_only,
        ..RunSummary::default()
    };

    if config.collect_only {
        let done = store.load_done()?;
        summary.total_done = discovery
            .tree
            .insertion_order()
            .filter(|node| done.contains(&node.url))
            .count();
        summary.already_done = summary.total_done;
        info!(
            "Collect-only run: {} URL(s) written to {}",
            summary.pages_discovered,
            store.dir().display()
        );
        return Ok(summary);
    }

    let outcome = CloneOrchestrator::new(config, &store, factory, fetcher)
        .with_progress(progress)
        .run(&discovery.tree)
        .await?;

    summary.newly_mirrored = outcome.cloned.len();
    summary.already_done = outcome.already_done;
    summary.total_done = outcome.already_done + outcome.cloned.len();
    summary.skipped = outcome
        .skipped
        .iter()
        .map(NormalizedUrl::to_string)
        .collect();

    info!(
        "Run finished: {} discovered, {} mirrored this run, {} done in total, {} skipped",
        summary.pages_discovered,
        summary.newly_mirrored,
        summary.total_done,
        summary.skipped.len()
    );
    Ok(summary)
}

/// [`execute_clone`] with the HTTP renderer, fetcher and optional proxy list.
pub async fn execute_http_clone(
    config: &MirrorConfig,
    progress: Option<ProgressCallback>,
) -> Result<RunSummary> {
    let proxies: Arc<dyn ProxySource> = match &config.proxy_file {
        Some(path) => Arc::new(ProxyRotation::load(path)?),
        None => Arc::new(ProxyRotation::empty()),
    };
    let factory = HttpSessionFactory::new(config.user_agent.clone(), proxies);
    let fetcher = HttpFetcher::new(&config.user_agent, config.asset_timeout)?;

    execute_clone(config, &factory, &fetcher, progress).await
}

/// Persisted state for the configured seed, or `None` if nothing was ever
/// recorded. Never creates directories.
pub fn load_state(config: &MirrorConfig) -> Result<Option<StateSnapshot>> {
    let dir = config.state_dir();
    if !dir.is_dir() {
        return Ok(None);
    }
    let store = StateStore::open(dir, config.normalizer())?;
    Ok(Some(store.snapshot()?))
}

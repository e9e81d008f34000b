// Tests for the discovery phase

mod common;

use clonr_core::discover::Discovery;
use clonr_core::error::CoreError;
use clonr_core::store::{StateStore, VISITED_FILE};
use clonr_core::{MirrorConfig, MirrorEvent, ProgressCallback, TraversalOrder};
use clonr_scanner::normalize::normalize;
use common::{FakeFactory, FakeRenderer, test_config};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

const SEED: &str = "https://example.test/";

fn site() -> FakeRenderer {
    FakeRenderer::builder()
        .page(SEED, &["/a", "/b", "/c", "/a#frag", "https://other.test/x"])
        .page("https://example.test/a", &["/a/1", "/b", "/", "/style.css", "/logo.PNG"])
        .page("https://example.test/b", &["/b/1", "/a", "/b?page=2"])
        .page("https://example.test/a/1", &["/a/2"])
        .page("https://example.test/a/2", &["/a/3"])
        .build()
}

fn store_for(config: &MirrorConfig) -> StateStore {
    StateStore::open(config.state_dir(), config.normalizer()).unwrap()
}

fn config(root: &Path) -> MirrorConfig {
    test_config(SEED, root).with_max_depth(3)
}

fn urls(tree: &clonr_core::CrawlTree) -> Vec<String> {
    tree.insertion_order().map(|n| n.url.to_string()).collect()
}

// ============================================================================
// Tree shape
// ============================================================================

#[tokio::test]
async fn test_every_url_appears_once() {
    let dir = TempDir::new().unwrap();
    let config = config(dir.path());
    let store = store_for(&config);
    let renderer = site();

    let outcome = Discovery::new(&config, &store)
        .run(&FakeFactory::new(renderer.clone()))
        .await
        .unwrap();
    let all = urls(&outcome.tree);
    let unique: HashSet<&String> = all.iter().collect();

    assert_eq!(all.len(), unique.len());
    assert_eq!(
        all,
        vec![
            "https://example.test",
            "https://example.test/a",
            "https://example.test/b",
            "https://example.test/c",
            "https://example.test/a/1",
            "https://example.test/b/1",
            "https://example.test/a/2",
        ]
    );
    assert_eq!(outcome.visited.len(), 7);
    assert_eq!(outcome.newly_visited, 7);
}

#[tokio::test]
async fn test_cross_domain_and_assets_excluded() {
    let dir = TempDir::new().unwrap();
    let config = config(dir.path());
    let store = store_for(&config);

    let outcome = Discovery::new(&config, &store)
        .run(&FakeFactory::new(site()))
        .await
        .unwrap();
    let all = urls(&outcome.tree);

    assert!(!all.iter().any(|u| u.contains("other.test")));
    assert!(!all.iter().any(|u| u.ends_with(".css") || u.ends_with(".PNG")));
}

#[tokio::test]
async fn test_depth_limit() {
    let dir = TempDir::new().unwrap();
    let config = config(dir.path()).with_max_depth(1);
    let store = store_for(&config);

    let outcome = Discovery::new(&config, &store)
        .run(&FakeFactory::new(site()))
        .await
        .unwrap();
    assert_eq!(outcome.tree.len(), 4);
    assert!(outcome.tree.insertion_order().all(|n| n.depth <= 1));
}

#[tokio::test]
async fn test_page_budget_bounds_tree() {
    let dir = TempDir::new().unwrap();
    let config = config(dir.path()).with_max_pages(3);
    let store = store_for(&config);

    let outcome = Discovery::new(&config, &store)
        .run(&FakeFactory::new(site()))
        .await
        .unwrap();
    assert_eq!(outcome.tree.len(), 3);
    assert!(outcome.visited.len() <= 3);
}

#[tokio::test]
async fn test_depth_first_order() {
    let dir = TempDir::new().unwrap();
    let config = config(dir.path()).with_traversal(TraversalOrder::DepthFirst);
    let store = store_for(&config);
    let visits: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = visits.clone();
    let progress: ProgressCallback = Arc::new(move |event: MirrorEvent| {
        if let MirrorEvent::Discovered { url, .. } = event {
            sink.lock().unwrap().push(url.to_string());
        }
    });

    Discovery::new(&config, &store)
        .with_progress(Some(progress))
        .run(&FakeFactory::new(site()))
        .await
        .unwrap();

    let visits = visits.lock().unwrap();
    assert_eq!(visits[0], "https://example.test");
    // LIFO: the last link of the root is explored before the first.
    assert_eq!(visits[1], "https://example.test/c");
    assert_eq!(visits[2], "https://example.test/b");
    assert_eq!(visits[3], "https://example.test/b/1");
}

// ============================================================================
// Failures
// ============================================================================

#[tokio::test]
async fn test_failed_extraction_yields_no_children() {
    let dir = TempDir::new().unwrap();
    let config = config(dir.path());
    let store = store_for(&config);
    let renderer = FakeRenderer::builder()
        .page(SEED, &["/a", "/b"])
        .page("https://example.test/a", &["/a/hidden"])
        .failing("https://example.test/a")
        .build();

    let outcome = Discovery::new(&config, &store)
        .run(&FakeFactory::new(renderer.clone()))
        .await
        .unwrap();

    let a = normalize("https://example.test/a").unwrap();
    assert!(outcome.visited.contains(&a));
    let node = outcome.tree.node(outcome.tree.get(&a).unwrap()).unwrap();
    assert!(node.children.is_empty());
    assert_eq!(outcome.tree.len(), 3);
}

#[tokio::test]
async fn test_refused_session_leaves_seed_visited_without_children() {
    let dir = TempDir::new().unwrap();
    let config = config(dir.path());
    let store = store_for(&config);
    let factory = FakeFactory::refusing();

    let outcome = Discovery::new(&config, &store)
        .run(&factory)
        .await
        .unwrap();

    assert_eq!(outcome.tree.len(), 1);
    assert!(outcome.tree.root().unwrap().children.is_empty());
    assert_eq!(outcome.visited.len(), 1);
    assert_eq!(store.load_visited().unwrap().len(), 1);
    assert_eq!(factory.sessions_opened(), 0);
}

#[tokio::test]
async fn test_visited_url_missing_from_tree_is_corrupt() {
    let dir = TempDir::new().unwrap();
    let config = config(dir.path());
    let store = store_for(&config);
    fs::write(
        store.path(VISITED_FILE),
        r#"["https://example.test", "https://example.test/ghost"]"#,
    )
    .unwrap();

    let err = Discovery::new(&config, &store)
        .run(&FakeFactory::new(site()))
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Corrupt { .. }));
}

#[tokio::test]
async fn test_state_for_other_seed_is_rejected() {
    let dir = TempDir::new().unwrap();
    let config = config(dir.path());
    let store = store_for(&config);
    Discovery::new(&config, &store)
        .run(&FakeFactory::new(site()))
        .await
        .unwrap();

    let other = test_config("https://example.test/a", dir.path());
    let err = Discovery::new(&other, &store)
        .run(&FakeFactory::new(site()))
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Setup(_)));
}

// ============================================================================
// Resume
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_interrupted_discovery_resumes_to_same_tree() {
    let full_dir = TempDir::new().unwrap();
    let full_config = config(full_dir.path()).with_discovery_timeout(Duration::from_secs(3600));
    let full_store = store_for(&full_config);
    let uninterrupted = Discovery::new(&full_config, &full_store)
        .run(&FakeFactory::new(site()))
        .await
        .unwrap();

    let dir = TempDir::new().unwrap();
    let config = config(dir.path()).with_discovery_timeout(Duration::from_secs(3600));
    let store = store_for(&config);

    // Three nodes get visited, then the renderer stalls and the run is dropped.
    let stalling = FakeRenderer::builder()
        .page(SEED, &["/a", "/b", "/c", "/a#frag", "https://other.test/x"])
        .page("https://example.test/a", &["/a/1", "/b", "/", "/style.css", "/logo.PNG"])
        .page("https://example.test/b", &["/b/1", "/a", "/b?page=2"])
        .hang_after(3)
        .build();
    let interrupted = tokio::time::timeout(
        Duration::from_secs(10),
        Discovery::new(&config, &store).run(&FakeFactory::new(stalling)),
    )
    .await;
    assert!(interrupted.is_err());
    assert_eq!(store.load_visited().unwrap().len(), 3);

    let resumed_renderer = site();
    let resumed = Discovery::new(&config, &store)
        .run(&FakeFactory::new(resumed_renderer.clone()))
        .await
        .unwrap();

    assert_eq!(resumed.tree.to_record(), uninterrupted.tree.to_record());
    assert_eq!(resumed.newly_visited, 4);
    assert_eq!(resumed_renderer.link_calls(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_interrupted_depth_first_discovery_resumes_to_same_tree() {
    let full_dir = TempDir::new().unwrap();
    let full_config = config(full_dir.path())
        .with_traversal(TraversalOrder::DepthFirst)
        .with_discovery_timeout(Duration::from_secs(3600));
    let full_store = store_for(&full_config);
    let uninterrupted = Discovery::new(&full_config, &full_store)
        .run(&FakeFactory::new(site()))
        .await
        .unwrap();

    let dir = TempDir::new().unwrap();
    let config = config(dir.path())
        .with_traversal(TraversalOrder::DepthFirst)
        .with_discovery_timeout(Duration::from_secs(3600));
    let store = store_for(&config);

    // Root, /c and /b are visited; /b/1 and /a are still pending.
    let stalling = FakeRenderer::builder()
        .page(SEED, &["/a", "/b", "/c", "/a#frag", "https://other.test/x"])
        .page("https://example.test/a", &["/a/1", "/b", "/", "/style.css", "/logo.PNG"])
        .page("https://example.test/b", &["/b/1", "/a", "/b?page=2"])
        .page("https://example.test/a/1", &["/a/2"])
        .page("https://example.test/a/2", &["/a/3"])
        .hang_after(3)
        .build();
    let interrupted = tokio::time::timeout(
        Duration::from_secs(10),
        Discovery::new(&config, &store).run(&FakeFactory::new(stalling)),
    )
    .await;
    assert!(interrupted.is_err());
    let visited = store.load_visited().unwrap();
    assert_eq!(visited.len(), 3);
    assert!(visited.contains(&normalize("https://example.test/b").unwrap()));
    assert!(!visited.contains(&normalize("https://example.test/a").unwrap()));

    let visits: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = visits.clone();
    let progress: ProgressCallback = Arc::new(move |event: MirrorEvent| {
        if let MirrorEvent::Discovered { url, .. } = event {
            sink.lock().unwrap().push(url.to_string());
        }
    });
    let resumed_renderer = site();
    let resumed = Discovery::new(&config, &store)
        .with_progress(Some(progress))
        .run(&FakeFactory::new(resumed_renderer.clone()))
        .await
        .unwrap();

    assert_eq!(resumed.tree.to_record(), uninterrupted.tree.to_record());
    assert_eq!(resumed.newly_visited, 4);
    assert_eq!(resumed_renderer.link_calls(), 4);
    assert_eq!(
        *visits.lock().unwrap(),
        vec![
            "https://example.test/b/1",
            "https://example.test/a",
            "https://example.test/a/1",
            "https://example.test/a/2",
        ]
    );
}

#[tokio::test]
async fn test_completed_discovery_does_no_work_on_rerun() {
    let dir = TempDir::new().unwrap();
    let config = config(dir.path());
    let store = store_for(&config);
    Discovery::new(&config, &store)
        .run(&FakeFactory::new(site()))
        .await
        .unwrap();

    let rerun = site();
    let outcome = Discovery::new(&config, &store)
        .run(&FakeFactory::new(rerun.clone()))
        .await
        .unwrap();
    assert_eq!(outcome.newly_visited, 0);
    assert_eq!(rerun.link_calls(), 0);
}

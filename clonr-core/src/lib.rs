pub mod config;
pub mod crawl;
pub mod discover;
pub mod error;
pub mod events;
pub mod localize;
pub mod mirror;
pub mod report;
mod session;
pub mod store;
pub mod tree;
pub mod urlset;

pub use config::{DelayRange, MAX_CRAWL_DEPTH, MirrorConfig, SessionScope, TraversalOrder};
pub use crawl::{RunSummary, execute_clone, execute_http_clone, load_state};
pub use error::CoreError;
pub use events::{MirrorEvent, ProgressCallback};
pub use store::{StateSnapshot, StateStore};
pub use tree::{CrawlNode, CrawlTree};
pub use urlset::{DoneSet, UrlSet, VisitedSet};

const BANNER: &str = r#"
       __
  ____/ /___  ____  _____
 / __/ / __ \/ __ \/ ___/
/ /_/ / /_/ / / / / /
\__/_/\____/_/ /_/_/
"#;

pub fn print_banner() {
    eprintln!("{}", BANNER);
    eprintln!(
        "  clonr v{} - resumable offline website mirroring\n",
        env!("CARGO_PKG_VERSION")
    );
}

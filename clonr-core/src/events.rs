use clonr_scanner::NormalizedUrl;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Progress notifications emitted while a run advances.
#[derive(Debug, Clone)]
pub enum MirrorEvent {
    Discovered {
        url: NormalizedUrl,
        depth: usize,
        new_children: usize,
    },
    DiscoverySkipped {
        url: NormalizedUrl,
        depth: usize,
    },
    PageStarted {
        url: NormalizedUrl,
        index: usize,
        total: usize,
    },
    PageCloned {
        url: NormalizedUrl,
        path: PathBuf,
    },
    PageRetry {
        url: NormalizedUrl,
        attempt: u32,
        max_attempts: u32,
        error: String,
    },
    PageSkipped {
        url: NormalizedUrl,
        attempts: u32,
    },
    Delay(Duration),
}

pub type ProgressCallback = Arc<dyn Fn(MirrorEvent) + Send + Sync>;

pub(crate) fn emit(callback: &Option<ProgressCallback>, event: MirrorEvent) {
    if let Some(cb) = callback {
        cb(event);
    }
}

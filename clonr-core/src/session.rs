use clonr_scanner::error::{Result as ScanResult, ScanError};
use clonr_scanner::{Renderer, RendererFactory};
use std::future::Future;
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard};
use tracing::debug;
use url::Url;

/// A renderer session that is opened on first use.
pub(crate) type Session = Mutex<Option<Box<dyn Renderer>>>;

/// Lock `session`, opening it through `factory` if it is not open yet. An
/// open failure is returned to the caller as that call's error.
pub(crate) async fn acquire<'s>(
    session: &'s Session,
    factory: &dyn RendererFactory,
) -> ScanResult<MutexGuard<'s, Option<Box<dyn Renderer>>>> {
    let mut guard = session.lock().await;
    if guard.is_none() {
        debug!("Opening renderer session");
        *guard = Some(factory.open_session().await?);
    }
    Ok(guard)
}

/// Enforce `timeout` on a renderer call regardless of whether the renderer
/// honors it itself.
pub(crate) async fn with_deadline<T>(
    url: &Url,
    timeout: Duration,
    call: impl Future<Output = ScanResult<T>>,
) -> ScanResult<T> {
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => Err(ScanError::RenderTimeout {
            url: url.to_string(),
            timeout,
        }),
    }
}

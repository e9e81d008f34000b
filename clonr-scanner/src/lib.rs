pub mod error;
pub mod fetcher;
pub mod normalize;
pub mod proxy;
pub mod renderer;
pub mod result;
pub mod retry;

pub use error::ScanError;
pub use fetcher::{Fetcher, HttpFetcher};
pub use normalize::{NormalizedUrl, QueryPolicy, UrlNormalizer};
pub use proxy::{ProxyEndpoint, ProxyRotation, ProxySource};
pub use renderer::{HttpRenderer, HttpSessionFactory, Renderer, RendererFactory};
pub use result::RenderedPage;
pub use retry::{RetryError, RetryPolicy, Verdict};

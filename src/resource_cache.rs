//! The shared resource cache's interface. Caching policy and the
//! actual fetch/compile logic live with the cache implementation — out of
//! scope here.

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;

use crate::error::OpaqueError;

/// What the cache sends back for a single outstanding request. Kept as its
/// own channel in the Runner rather than folded into `InboundMessage`, since
/// the cache has no business knowing the embedder's opaque test-set-ref
/// type.
#[derive(Debug, Clone)]
pub enum ResourceEvent {
    CachedResource { path: PathBuf, bytes: Arc<[u8]> },
    ResourceGetError { path: PathBuf, error: OpaqueError },
}

/// What the Runner asks the cache for. The cache is expected to either
/// answer immediately (if already cached) or fetch/compile and reply later
/// on the shared event channel — either way, the Runner only ever observes
/// replies via `ResourceEvent`.
#[async_trait]
pub trait ResourceCache: Send + Sync {
    async fn request_schema(&self, path: PathBuf);
    async fn request_source(&self, path: PathBuf);
    async fn request_resource(&self, path: PathBuf);
    async fn request_query(&self, path: PathBuf);
}

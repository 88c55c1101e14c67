//! Resource loading for rasterization.

use crate::error::{RasterError, RasterResult};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::debug;
use url::Url;

/// Fetches the bytes of a resource referenced by a rendered element.
#[async_trait]
pub trait ResourceLoader: Send + Sync {
    async fn load(&self, url: &str) -> RasterResult<Vec<u8>>;

    /// Load multiple resources concurrently.
    async fn load_all(&self, urls: &[String]) -> Vec<RasterResult<Vec<u8>>> {
        let futures: Vec<_> = urls.iter().map(|url| self.load(url)).collect();
        futures::future::join_all(futures).await
    }
}

/// Loader serving resources registered up front.
#[derive(Debug, Default)]
pub struct MemoryLoader {
    resources: RwLock<HashMap<String, Vec<u8>>>,
    loads: AtomicUsize,
}

impl MemoryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, url: impl Into<String>, bytes: Vec<u8>) {
        self.resources.write().insert(url.into(), bytes);
    }

    /// Number of load requests served, successful or not.
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl ResourceLoader for MemoryLoader {
    async fn load(&self, url: &str) -> RasterResult<Vec<u8>> {
        self.loads.fetch_add(1, Ordering::Relaxed);
        let bytes = self.resources.read().get(url).cloned();
        match bytes {
            Some(bytes) => {
                debug!(url, len = bytes.len(), "resource loaded");
                Ok(bytes)
            }
            None => Err(RasterError::load(url, "not found")),
        }
    }
}

/// Whether `url` is served from somewhere other than `origin`.
///
/// Relative and `data:` URLs share the document's origin. Without a known
/// document origin every absolute network URL counts as foreign.
pub fn is_cross_origin(url: &str, origin: Option<&str>) -> bool {
    let Ok(parsed) = Url::parse(url) else {
        return false;
    };
    if parsed.scheme() == "data" {
        return false;
    }
    match origin.and_then(|o| Url::parse(o).ok()) {
        Some(document) => parsed.origin() != document.origin(),
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cross_origin() {
        let origin = Some("https://app.example");
        assert!(!is_cross_origin("images/a.png", origin));
        assert!(!is_cross_origin("https://app.example/a.png", origin));
        assert!(is_cross_origin("https://cdn.example/a.png", origin));
        assert!(!is_cross_origin("data:image/png;base64,AAAA", None));
        assert!(is_cross_origin("https://cdn.example/a.png", None));
    }

    #[tokio::test]
    async fn test_memory_loader() {
        let loader = MemoryLoader::new();
        loader.insert("a.png", vec![1, 2, 3]);

        let results = loader
            .load_all(&["a.png".to_string(), "missing.png".to_string()])
            .await;
        assert_eq!(results[0], Ok(vec![1, 2, 3]));
        assert!(matches!(results[1], Err(RasterError::ResourceLoad { .. })));
        assert_eq!(loader.load_count(), 2);
    }
}

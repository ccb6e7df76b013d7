//! Optimized Image Loading
//!
//! Resolves product image URIs to quality-adjusted variants. Results are
//! cached by `(uri, quality, dimensions)` and concurrent requests for the
//! same key share a single in-flight load.

use crate::domain::ports::{ImageDimensions, ImageTransformer, ImageTransformerRef};
use crate::error::{Error, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Quality used when the caller passes something outside (0, 1]
pub const DEFAULT_IMAGE_QUALITY: f32 = 0.7;

// =============================================================================
// Query Parameter Transformer
// =============================================================================

/// Transformer that asks the image CDN for a variant via query parameters
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryParamTransformer;

#[async_trait]
impl ImageTransformer for QueryParamTransformer {
    async fn transform(
        &self,
        uri: &str,
        quality: f32,
        dimensions: Option<ImageDimensions>,
    ) -> Result<String> {
        if uri.trim().is_empty() {
            return Err(Error::ImageTransform {
                uri: uri.to_string(),
                reason: "empty uri".to_string(),
            });
        }

        let separator = if uri.contains('?') { '&' } else { '?' };
        let mut out = format!("{uri}{separator}q={quality}");
        if let Some(dims) = dimensions {
            out.push_str(&format!("&w={}&h={}", dims.width, dims.height));
        }
        Ok(out)
    }
}

// =============================================================================
// Optimized Image Loader
// =============================================================================

type SharedLoad = Shared<BoxFuture<'static, Option<String>>>;

/// Caching, de-duplicating front for an [`ImageTransformer`]
pub struct OptimizedImageLoader {
    transformer: ImageTransformerRef,
    /// Completed transforms
    cache: DashMap<String, String>,
    /// Loads currently running
    in_flight: Mutex<HashMap<String, SharedLoad>>,
}

impl OptimizedImageLoader {
    pub fn new(transformer: ImageTransformerRef) -> Self {
        Self {
            transformer,
            cache: DashMap::new(),
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    fn cache_key(uri: &str, quality: f32, dimensions: Option<ImageDimensions>) -> String {
        match dimensions {
            Some(d) => format!("{uri}_{quality}_{}x{}", d.width, d.height),
            None => format!("{uri}_{quality}_auto"),
        }
    }

    /// Resolve `uri` at `quality`, optionally resized
    ///
    /// Never fails: if the transform errors the original URI is returned
    /// and nothing is cached.
    pub async fn load_image(
        &self,
        uri: &str,
        quality: f32,
        dimensions: Option<ImageDimensions>,
    ) -> String {
        let quality = if quality > 0.0 && quality <= 1.0 {
            quality
        } else {
            DEFAULT_IMAGE_QUALITY
        };
        let key = Self::cache_key(uri, quality, dimensions);

        if let Some(hit) = self.cache.get(&key) {
            return hit.value().clone();
        }

        let load = {
            let mut in_flight = self.in_flight.lock();
            in_flight
                .entry(key.clone())
                .or_insert_with(|| self.start_load(uri, quality, dimensions))
                .clone()
        };

        let result = load.await;

        if let Some(ref resolved) = result {
            self.cache.insert(key.clone(), resolved.clone());
        }
        self.in_flight.lock().remove(&key);

        result.unwrap_or_else(|| uri.to_string())
    }

    fn start_load(&self, uri: &str, quality: f32, dimensions: Option<ImageDimensions>) -> SharedLoad {
        let transformer = Arc::clone(&self.transformer);
        let uri = uri.to_string();

        async move {
            match transformer.transform(&uri, quality, dimensions).await {
                Ok(resolved) => {
                    debug!(uri = %uri, quality, "Image variant resolved");
                    Some(resolved)
                }
                Err(e) => {
                    warn!(uri = %uri, error = %e, "Failed to load image, using original");
                    None
                }
            }
        }
        .boxed()
        .shared()
    }

    /// Forget every resolved variant
    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    /// Number of resolved variants held
    pub fn cache_size(&self) -> usize {
        self.cache.len()
    }
}

impl Default for OptimizedImageLoader {
    fn default() -> Self {
        Self::new(Arc::new(QueryParamTransformer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::time::Duration;

    struct SlowTransformer {
        calls: AtomicU64,
        fail: bool,
    }

    #[async_trait]
    impl ImageTransformer for SlowTransformer {
        async fn transform(
            &self,
            uri: &str,
            quality: f32,
            _dimensions: Option<ImageDimensions>,
        ) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(100)).await;
            if self.fail {
                return Err(Error::ImageTransform {
                    uri: uri.to_string(),
                    reason: "cdn down".to_string(),
                });
            }
            Ok(format!("{uri}#{quality}"))
        }
    }

    fn slow(fail: bool) -> Arc<SlowTransformer> {
        Arc::new(SlowTransformer {
            calls: AtomicU64::new(0),
            fail,
        })
    }

    #[tokio::test]
    async fn test_query_param_transformer() {
        let t = QueryParamTransformer;
        assert_eq!(
            t.transform("https://cdn/x.jpg", 0.6, Some(ImageDimensions::thumbnail()))
                .await
                .unwrap(),
            "https://cdn/x.jpg?q=0.6&w=150&h=150"
        );
        assert_eq!(
            t.transform("https://cdn/x.jpg?v=2", 0.9, None).await.unwrap(),
            "https://cdn/x.jpg?v=2&q=0.9"
        );
        assert!(t.transform("", 0.5, None).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_loads_are_coalesced() {
        let transformer = slow(false);
        let loader = OptimizedImageLoader::new(transformer.clone());

        let loads = (0..8).map(|_| loader.load_image("https://cdn/dates.jpg", 0.5, None));
        let results = futures::future::join_all(loads).await;

        assert!(results.iter().all(|r| r == "https://cdn/dates.jpg#0.5"));
        assert_eq!(transformer.calls.load(Ordering::SeqCst), 1);
        assert_eq!(loader.cache_size(), 1);

        // Served from cache afterwards
        loader.load_image("https://cdn/dates.jpg", 0.5, None).await;
        assert_eq!(transformer.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_distinct_keys_load_separately() {
        let transformer = slow(false);
        let loader = OptimizedImageLoader::new(transformer.clone());

        loader.load_image("https://cdn/a.jpg", 0.5, None).await;
        loader.load_image("https://cdn/a.jpg", 0.9, None).await;
        loader
            .load_image("https://cdn/a.jpg", 0.5, Some(ImageDimensions::thumbnail()))
            .await;

        assert_eq!(transformer.calls.load(Ordering::SeqCst), 3);
        assert_eq!(loader.cache_size(), 3);

        loader.clear_cache();
        assert_eq!(loader.cache_size(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_transform_falls_back_uncached() {
        let transformer = slow(true);
        let loader = OptimizedImageLoader::new(transformer.clone());

        assert_eq!(loader.load_image("https://cdn/x.jpg", 0.4, None).await, "https://cdn/x.jpg");
        assert_eq!(loader.cache_size(), 0);

        loader.load_image("https://cdn/x.jpg", 0.4, None).await;
        assert_eq!(transformer.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_out_of_range_quality_uses_default() {
        let loader = OptimizedImageLoader::default();
        assert_eq!(
            loader.load_image("https://cdn/x.jpg", 0.0, None).await,
            "https://cdn/x.jpg?q=0.7"
        );
    }
}

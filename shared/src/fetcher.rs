/// Metadata lookup: cache first, yt-dlp on a miss.
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::cache::CacheStore;
use crate::config::METADATA_CACHE_TTL;
use crate::errors::{MediaError, MediaResult};
use crate::extractor::{metadata_args, Extractor};
use crate::models::{VideoMetadata, YtDlpInfo};
use crate::validation::validate_page_url;

/// Cache key for a page URL, exactly as submitted.
pub fn cache_key(page_url: &str) -> String {
    format!("video_meta:{}", page_url)
}

/// Fetches normalized metadata, reusing cached snapshots for `ttl`.
pub struct MetadataFetcher {
    extractor: Arc<dyn Extractor>,
    cache: Arc<dyn CacheStore>,
    ttl: Duration,
    timeout: Duration,
}

impl MetadataFetcher {
    pub fn new(extractor: Arc<dyn Extractor>, cache: Arc<dyn CacheStore>, timeout: Duration) -> Self {
        Self {
            extractor,
            cache,
            ttl: METADATA_CACHE_TTL,
            timeout,
        }
    }

    /// Metadata for `page_url`.
    ///
    /// The URL is validated before the cache or yt-dlp is touched. Cache
    /// failures degrade to a miss, and a failed cache write does not fail the
    /// fetch.
    pub async fn fetch(&self, page_url: &str) -> MediaResult<VideoMetadata> {
        let page_url = page_url.trim();
        validate_page_url(page_url)?;

        let key = cache_key(page_url);
        if let Some(meta) = self.lookup(&key).await {
            debug!("Metadata cache hit for {}", page_url);
            return Ok(meta);
        }

        let output = tokio::time::timeout(self.timeout, self.extractor.capture(&metadata_args(page_url)))
            .await
            .map_err(|_| MediaError::Timeout(self.timeout.as_secs()))??;

        let info = YtDlpInfo::from_json(&output)?;
        let meta = VideoMetadata::from_ytdlp(info, page_url);
        info!(
            "Fetched metadata for {}: id={} formats={}",
            page_url,
            meta.id,
            meta.formats.len()
        );

        self.store(&key, &meta).await;
        Ok(meta)
    }

    async fn lookup(&self, key: &str) -> Option<VideoMetadata> {
        match self.cache.get(key).await {
            Ok(Some(bytes)) => match serde_json::from_slice(&bytes) {
                Ok(meta) => Some(meta),
                Err(e) => {
                    warn!("Discarding corrupt cache entry {}: {}", key, e);
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!("Cache read failed for {}: {}", key, e);
                None
            }
        }
    }

    async fn store(&self, key: &str, meta: &VideoMetadata) {
        let bytes = match serde_json::to_vec(meta) {
            Ok(b) => b,
            Err(e) => {
                warn!("Failed to serialize metadata for {}: {}", key, e);
                return;
            }
        };
        if let Err(e) = self.cache.set(key, &bytes, self.ttl).await {
            warn!("Cache write failed for {}: {}", key, e);
        }
    }
}

/// Onetime API Server
///
/// Serves the single-page front-end, renders metadata fragments and streams
/// downloads straight out of yt-dlp.
mod render;
mod routes;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;
use tracing::info;

use onetime_shared::cache::{CacheStore, MemoryStore, RedisStore};
use onetime_shared::config::{CacheBackend, Config};
use onetime_shared::downloader::StreamDownloader;
use onetime_shared::extractor::{Extractor, YtDlp};
use onetime_shared::fetcher::MetadataFetcher;

/// Shared application state for all handlers.
pub struct AppState {
    pub fetcher: MetadataFetcher,
    pub downloader: StreamDownloader,
    /// Set when the cache is Redis, for health checks.
    pub redis: Option<RedisStore>,
}

/// Build the router. `config` only contributes the static/template paths.
pub fn app(state: Arc<AppState>, config: &Config) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route_service("/", ServeFile::new(config.templates_dir.join("index.html")))
        .nest_service("/static", ServeDir::new(&config.static_dir))
        .route("/submit", post(routes::submit))
        .route("/download", get(routes::download))
        .route("/api/video", post(routes::video_info))
        .route("/healthz", get(routes::healthz))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Hosted deployments inject variables directly
    if std::env::var("RAILWAY_ENVIRONMENT").is_err() {
        dotenvy::dotenv().ok();
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "onetime_api=info,onetime_shared=info,tower_http=info".into()),
        )
        .init();

    let config = Config::from_env();
    info!("yt-dlp binary: {:?}", config.ytdlp_bin);

    // Cache
    let (cache, redis): (Arc<dyn CacheStore>, Option<RedisStore>) = match config.cache_backend {
        CacheBackend::Redis => {
            let store = RedisStore::connect(&config.redis_addr, config.redis_password.as_deref())
                .await
                .map_err(|e| anyhow::anyhow!("Redis connection failed: {}", e))?;
            store
                .ping()
                .await
                .map_err(|e| anyhow::anyhow!("Redis connection failed: {}", e))?;
            (Arc::new(store.clone()) as Arc<dyn CacheStore>, Some(store))
        }
        CacheBackend::Memory => {
            info!("Using in-process metadata cache");
            (Arc::new(MemoryStore::new()) as Arc<dyn CacheStore>, None)
        }
    };

    let extractor: Arc<dyn Extractor> = Arc::new(YtDlp::new(config.ytdlp_bin.clone()));

    let state = Arc::new(AppState {
        fetcher: MetadataFetcher::new(extractor.clone(), cache, config.metadata_timeout),
        downloader: StreamDownloader::new(extractor, config.download_timeout),
        redis,
    });

    let addr = config.bind_addr();
    info!("Onetime listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app(state, &config)).await?;

    Ok(())
}

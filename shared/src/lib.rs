//! Onetime core: yt-dlp metadata lookups behind a short-lived cache, and
//! streaming downloads piped straight from yt-dlp's stdout.
pub mod cache;
pub mod config;
pub mod downloader;
pub mod errors;
pub mod extractor;
pub mod fetcher;
pub mod models;
pub mod validation;

pub use errors::{CacheError, MediaError, MediaResult};
pub use models::{FormatOption, VideoMetadata};

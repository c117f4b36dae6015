/// Runtime configuration read from the environment.
use std::path::PathBuf;
use std::time::Duration;

/// Fixed lifetime of a cached metadata entry.
pub const METADATA_CACHE_TTL: Duration = Duration::from_secs(5 * 60);

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_REDIS_ADDR: &str = "redis:6379";
pub const DEFAULT_METADATA_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_DOWNLOAD_TIMEOUT_SECS: u64 = 3600;

/// Which cache store the server should build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheBackend {
    Redis,
    Memory,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub redis_addr: String,
    pub redis_password: Option<String>,
    pub cache_backend: CacheBackend,
    pub ytdlp_bin: PathBuf,
    pub metadata_timeout: Duration,
    pub download_timeout: Duration,
    pub templates_dir: PathBuf,
    pub static_dir: PathBuf,
}

impl Config {
    /// Read from process environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary lookup. Blank values count as unset and
    /// unparseable numbers fall back to their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let secs = |key: &str, default: u64| {
            get(key)
                .and_then(|v| v.parse::<u64>().ok())
                .filter(|v| *v > 0)
                .unwrap_or(default)
        };

        let cache_backend = match get("CACHE_BACKEND").as_deref() {
            Some(v) if v.eq_ignore_ascii_case("memory") => CacheBackend::Memory,
            _ => CacheBackend::Redis,
        };

        Self {
            host: get("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: get("PORT")
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_PORT),
            redis_addr: get("REDIS_URL").unwrap_or_else(|| DEFAULT_REDIS_ADDR.to_string()),
            redis_password: get("REDIS_PASSWORD"),
            cache_backend,
            ytdlp_bin: PathBuf::from(get("YTDLP_BIN").unwrap_or_else(|| "yt-dlp".to_string())),
            metadata_timeout: Duration::from_secs(secs("METADATA_TIMEOUT_SECS", DEFAULT_METADATA_TIMEOUT_SECS)),
            download_timeout: Duration::from_secs(secs("DOWNLOAD_TIMEOUT_SECS", DEFAULT_DOWNLOAD_TIMEOUT_SECS)),
            templates_dir: PathBuf::from(get("TEMPLATES_DIR").unwrap_or_else(|| "templates".to_string())),
            static_dir: PathBuf::from(get("STATIC_DIR").unwrap_or_else(|| "static".to_string())),
        }
    }

    /// Socket address string for the listener.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let cfg = config(&[]);
        assert_eq!(cfg.bind_addr(), "0.0.0.0:8080");
        assert_eq!(cfg.redis_addr, "redis:6379");
        assert_eq!(cfg.redis_password, None);
        assert_eq!(cfg.cache_backend, CacheBackend::Redis);
        assert_eq!(cfg.ytdlp_bin, PathBuf::from("yt-dlp"));
        assert_eq!(cfg.metadata_timeout, Duration::from_secs(60));
        assert_eq!(cfg.download_timeout, Duration::from_secs(3600));
    }

    #[test]
    fn test_overrides() {
        let cfg = config(&[
            ("PORT", "9000"),
            ("REDIS_URL", "redis://cache:6380/0"),
            ("REDIS_PASSWORD", "hunter2"),
            ("CACHE_BACKEND", "Memory"),
            ("METADATA_TIMEOUT_SECS", "15"),
        ]);
        assert_eq!(cfg.port, 9000);
        assert_eq!(cfg.redis_addr, "redis://cache:6380/0");
        assert_eq!(cfg.redis_password.as_deref(), Some("hunter2"));
        assert_eq!(cfg.cache_backend, CacheBackend::Memory);
        assert_eq!(cfg.metadata_timeout, Duration::from_secs(15));
    }

    #[test]
    fn test_bad_values_fall_back() {
        let cfg = config(&[
            ("PORT", "eighty"),
            ("REDIS_PASSWORD", "  "),
            ("DOWNLOAD_TIMEOUT_SECS", "0"),
        ]);
        assert_eq!(cfg.port, DEFAULT_PORT);
        assert_eq!(cfg.redis_password, None);
        assert_eq!(cfg.download_timeout, Duration::from_secs(DEFAULT_DOWNLOAD_TIMEOUT_SECS));
    }
}

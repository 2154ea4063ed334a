use std::{env, net::SocketAddr, num::NonZeroUsize, str::FromStr, time::Duration};

use thiserror::Error;

#[cfg(test)]
use once_cell::sync::Lazy;
#[cfg(test)]
pub(crate) static ENV_MUTEX: Lazy<std::sync::Mutex<()>> = Lazy::new(|| std::sync::Mutex::new(()));

/// キャッシュ済み判定の方式。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CachePolicy {
    /// 取得済みマーカーの有無で判定する（空の月も一度だけ取得する）。
    Marker,
    /// 該当月の記事が1件でも存在するかで判定する。
    Presence,
}

impl CachePolicy {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            CachePolicy::Marker => "marker",
            CachePolicy::Presence => "presence",
        }
    }
}

impl FromStr for CachePolicy {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_lowercase().as_str() {
            "marker" => Ok(CachePolicy::Marker),
            "presence" => Ok(CachePolicy::Presence),
            other => Err(anyhow::anyhow!(
                "unknown cache policy `{other}` (expected marker or presence)"
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    http_bind: SocketAddr,
    nyt_api_key: String,
    archive_base_url: String,
    archive_connect_timeout: Duration,
    archive_read_timeout: Duration,
    archive_total_timeout: Duration,
    archive_min_request_interval: Duration,
    cache_policy: CachePolicy,
    http_max_retries: usize,
    http_backoff_base_ms: u64,
    http_backoff_cap_ms: u64,
    article_db_dsn: Option<String>,
    article_db_max_connections: u32,
    article_db_min_connections: u32,
    article_db_acquire_timeout: Duration,
    keywords_top_n: NonZeroUsize,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing environment variable: {0}")]
    Missing(&'static str),
    #[error("invalid value for {name}: {source}")]
    Invalid {
        name: &'static str,
        #[source]
        source: anyhow::Error,
    },
}

impl Config {
    /// 環境変数から設定値を読み込み、検証する。
    ///
    /// # Errors
    /// `NYT_API_KEY` が未設定、もしくは各種値のパースに失敗した場合は [`ConfigError`] を返す。
    pub fn from_env() -> Result<Self, ConfigError> {
        let nyt_api_key = env_var("NYT_API_KEY")?;
        let http_bind = parse_socket_addr("KEYWORDS_HTTP_BIND", "0.0.0.0:1050")?;
        let archive_base_url = env::var("ARCHIVE_BASE_URL")
            .unwrap_or_else(|_| "https://api.nytimes.com/".to_string());

        // A busy month is tens of megabytes; the read timeout bounds gaps between chunks,
        // the total deadline only catches a connection that never finishes.
        let archive_connect_timeout = parse_duration_ms("ARCHIVE_CONNECT_TIMEOUT_MS", 2000)?;
        let archive_read_timeout = parse_duration_ms("ARCHIVE_READ_TIMEOUT_MS", 15000)?;
        let archive_total_timeout = parse_duration_ms("ARCHIVE_TOTAL_TIMEOUT_MS", 600_000)?;
        let archive_min_request_interval =
            parse_duration_ms("ARCHIVE_MIN_REQUEST_INTERVAL_MS", 1000)?;
        let cache_policy = parse_from_str("ARCHIVE_CACHE_POLICY", "marker")?;

        // Retry settings (exponential backoff + jitter)
        let http_max_retries = parse_usize("HTTP_MAX_RETRIES", 3)?;
        let http_backoff_base_ms = parse_u64("HTTP_BACKOFF_BASE_MS", 250)?;
        let http_backoff_cap_ms = parse_u64("HTTP_BACKOFF_CAP_MS", 10000)?;

        // Database connection pool settings
        let article_db_dsn = env::var("ARTICLE_DB_DSN")
            .ok()
            .filter(|dsn| !dsn.trim().is_empty());
        let article_db_max_connections = parse_u32("ARTICLE_DB_MAX_CONNECTIONS", 10)?;
        let article_db_min_connections = parse_u32("ARTICLE_DB_MIN_CONNECTIONS", 1)?;
        let article_db_acquire_timeout =
            parse_duration_secs("ARTICLE_DB_ACQUIRE_TIMEOUT_SECS", 30)?;

        let keywords_top_n = parse_non_zero_usize("KEYWORDS_TOP_N", 10)?;

        Ok(Self {
            http_bind,
            nyt_api_key,
            archive_base_url,
            archive_connect_timeout,
            archive_read_timeout,
            archive_total_timeout,
            archive_min_request_interval,
            cache_policy,
            http_max_retries,
            http_backoff_base_ms,
            http_backoff_cap_ms,
            article_db_dsn,
            article_db_max_connections,
            article_db_min_connections,
            article_db_acquire_timeout,
            keywords_top_n,
        })
    }

    #[must_use]
    pub fn http_bind(&self) -> SocketAddr {
        self.http_bind
    }

    #[must_use]
    pub fn nyt_api_key(&self) -> &str {
        &self.nyt_api_key
    }

    #[must_use]
    pub fn archive_base_url(&self) -> &str {
        &self.archive_base_url
    }

    #[must_use]
    pub fn archive_connect_timeout(&self) -> Duration {
        self.archive_connect_timeout
    }

    #[must_use]
    pub fn archive_read_timeout(&self) -> Duration {
        self.archive_read_timeout
    }

    #[must_use]
    pub fn archive_total_timeout(&self) -> Duration {
        self.archive_total_timeout
    }

    #[must_use]
    pub fn archive_min_request_interval(&self) -> Duration {
        self.archive_min_request_interval
    }

    #[must_use]
    pub fn cache_policy(&self) -> CachePolicy {
        self.cache_policy
    }

    #[must_use]
    pub fn http_max_retries(&self) -> usize {
        self.http_max_retries
    }

    #[must_use]
    pub fn http_backoff_base_ms(&self) -> u64 {
        self.http_backoff_base_ms
    }

    #[must_use]
    pub fn http_backoff_cap_ms(&self) -> u64 {
        self.http_backoff_cap_ms
    }

    #[must_use]
    pub fn article_db_dsn(&self) -> Option<&str> {
        self.article_db_dsn.as_deref()
    }

    #[must_use]
    pub fn article_db_max_connections(&self) -> u32 {
        self.article_db_max_connections
    }

    #[must_use]
    pub fn article_db_min_connections(&self) -> u32 {
        self.article_db_min_connections
    }

    #[must_use]
    pub fn article_db_acquire_timeout(&self) -> Duration {
        self.article_db_acquire_timeout
    }

    #[must_use]
    pub fn keywords_top_n(&self) -> NonZeroUsize {
        self.keywords_top_n
    }
}

fn env_var(name: &'static str) -> Result<String, ConfigError> {
    env::var(name)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .ok_or(ConfigError::Missing(name))
}

fn parse_socket_addr(name: &'static str, default: &str) -> Result<SocketAddr, ConfigError> {
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());

    raw.parse().map_err(|error| ConfigError::Invalid {
        name,
        source: anyhow::Error::new(error),
    })
}

fn parse_from_str<T>(name: &'static str, default: &str) -> Result<T, ConfigError>
where
    T: FromStr<Err = anyhow::Error>,
{
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());
    raw.parse::<T>()
        .map_err(|source| ConfigError::Invalid { name, source })
}

fn parse_non_zero_usize(name: &'static str, default: usize) -> Result<NonZeroUsize, ConfigError> {
    let parsed = parse_usize(name, default)?;
    NonZeroUsize::new(parsed).ok_or_else(|| ConfigError::Invalid {
        name,
        source: anyhow::anyhow!("must be greater than zero"),
    })
}

fn parse_duration_secs(name: &'static str, default_secs: u64) -> Result<Duration, ConfigError> {
    let value = parse_u64(name, default_secs)?;
    Ok(Duration::from_secs(value))
}

fn parse_duration_ms(name: &'static str, default_ms: u64) -> Result<Duration, ConfigError> {
    let value = parse_u64(name, default_ms)?;
    Ok(Duration::from_millis(value))
}

fn parse_usize(name: &'static str, default: usize) -> Result<usize, ConfigError> {
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());
    raw.parse::<usize>().map_err(|error| ConfigError::Invalid {
        name,
        source: anyhow::Error::new(error),
    })
}

fn parse_u32(name: &'static str, default: u32) -> Result<u32, ConfigError> {
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());
    raw.parse::<u32>().map_err(|error| ConfigError::Invalid {
        name,
        source: anyhow::Error::new(error),
    })
}

fn parse_u64(name: &'static str, default: u64) -> Result<u64, ConfigError> {
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());
    raw.parse::<u64>().map_err(|error| ConfigError::Invalid {
        name,
        source: anyhow::Error::new(error),
    })
}

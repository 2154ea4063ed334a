/// Prometheusメトリクス定義。
use prometheus::{
    Counter, Histogram, Registry, register_counter_with_registry,
    register_histogram_with_registry,
};

/// メトリクスコレクター。
#[derive(Debug, Clone)]
pub struct Metrics {
    // カウンター
    pub cache_hits: Counter,
    pub cache_misses: Counter,
    pub remote_requests: Counter,
    pub remote_failures: Counter,
    pub retries_total: Counter,
    pub articles_persisted: Counter,

    // ヒストグラム
    pub fetch_duration: Histogram,
    pub report_duration: Histogram,
}

impl Metrics {
    /// 新しいメトリクスコレクターを作成する。
    ///
    /// # Errors
    /// 同名のメトリクスが既にレジストリに登録されている場合。
    pub fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
        Ok(Self {
            cache_hits: register_counter_with_registry!(
                "nyt_cache_hits_total",
                "Month lookups served from the article cache",
                registry
            )?,
            cache_misses: register_counter_with_registry!(
                "nyt_cache_misses_total",
                "Month lookups that required a remote fetch",
                registry
            )?,
            remote_requests: register_counter_with_registry!(
                "nyt_remote_requests_total",
                "Requests issued to the archive endpoint",
                registry
            )?,
            remote_failures: register_counter_with_registry!(
                "nyt_remote_failures_total",
                "Failed requests to the archive endpoint",
                registry
            )?,
            retries_total: register_counter_with_registry!(
                "nyt_remote_retries_total",
                "Retried archive requests",
                registry
            )?,
            articles_persisted: register_counter_with_registry!(
                "nyt_articles_persisted_total",
                "Articles written to the cache",
                registry
            )?,
            fetch_duration: register_histogram_with_registry!(
                "nyt_month_fetch_duration_seconds",
                "Time to fetch and persist one archive month",
                vec![0.5, 1.0, 2.5, 5.0, 10.0, 20.0, 40.0, 80.0],
                registry
            )?,
            report_duration: register_histogram_with_registry!(
                "nyt_keyword_report_duration_seconds",
                "Time to build one keyword report, fetch included",
                registry
            )?,
        })
    }
}

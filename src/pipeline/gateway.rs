use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, instrument, warn};

use crate::{
    clients::archive::{ArchiveDoc, ArchiveSource},
    config::{CachePolicy, Config},
    error::ArchiveError,
    observability::metrics::Metrics,
    store::{
        dao::ArticleDao,
        models::{ArticleRecord, KeywordTag, MonthKey, derive_partition},
    },
    util::{retry::RetryConfig, spacing::RequestSpacing},
};

#[derive(Debug, Clone, Copy)]
pub struct GatewaySettings {
    pub policy: CachePolicy,
    pub retry: RetryConfig,
    pub min_request_interval: Duration,
}

impl GatewaySettings {
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            policy: config.cache_policy(),
            retry: RetryConfig::from_config(config),
            min_request_interval: config.archive_min_request_interval(),
        }
    }
}

/// 月単位の記事キャッシュ。未取得の月だけリモートから取得して保存する。
///
/// リモート呼び出しは `fetch_lock` で直列化され、呼び出し間隔も制限される。
/// 参照は `cache_guard` の読み取り側、破棄は書き込み側を取るので、
/// 取得済みの月を返す途中でキャッシュが消えることはない。
pub struct ArticleCacheGateway {
    source: Arc<dyn ArchiveSource>,
    dao: Arc<dyn ArticleDao>,
    metrics: Arc<Metrics>,
    policy: CachePolicy,
    retry: RetryConfig,
    cache_guard: RwLock<()>,
    fetch_lock: Mutex<RequestSpacing>,
}

impl ArticleCacheGateway {
    pub fn new(
        source: Arc<dyn ArchiveSource>,
        dao: Arc<dyn ArticleDao>,
        metrics: Arc<Metrics>,
        settings: GatewaySettings,
    ) -> Self {
        Self {
            source,
            dao,
            metrics,
            policy: settings.policy,
            retry: settings.retry,
            cache_guard: RwLock::new(()),
            fetch_lock: Mutex::new(RequestSpacing::new(settings.min_request_interval)),
        }
    }

    #[must_use]
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// 指定月の記事をすべて返す。未キャッシュなら先に取得・保存する。
    ///
    /// # Errors
    /// 年月が範囲外なら `InvalidMonthKey`、取得・保存の失敗はそれぞれの種別で返す。
    pub async fn get_articles_for_month(
        &self,
        year: i32,
        month: u32,
    ) -> Result<Vec<ArticleRecord>, ArchiveError> {
        let key = MonthKey::new(year, month)?;
        self.articles_for(key).await
    }

    /// # Errors
    /// [`ArticleCacheGateway::get_articles_for_month`] と同じ。
    pub async fn articles_for(&self, key: MonthKey) -> Result<Vec<ArticleRecord>, ArchiveError> {
        let _read = self.cache_guard.read().await;
        self.fill_month(key).await?;
        self.dao
            .articles_for_month(key)
            .await
            .map_err(ArchiveError::StoreUnavailable)
    }

    /// 指定月がキャッシュ済みであることを保証する。今回取得した場合は `true`。
    ///
    /// # Errors
    /// リモート取得・変換・保存のいずれかに失敗した場合。
    pub async fn ensure_cached(&self, key: MonthKey) -> Result<bool, ArchiveError> {
        let _read = self.cache_guard.read().await;
        self.fill_month(key).await
    }

    /// `cache_guard` の読み取り側を保持した状態で呼ぶ。
    #[instrument(skip(self), fields(year = key.year(), month = key.month()))]
    async fn fill_month(&self, key: MonthKey) -> Result<bool, ArchiveError> {
        if self.is_cached(key).await? {
            self.metrics.cache_hits.inc();
            return Ok(false);
        }

        let mut spacing = self.fetch_lock.lock().await;

        // Another caller may have filled the month while we waited for the lock.
        if self.is_cached(key).await? {
            self.metrics.cache_hits.inc();
            return Ok(false);
        }
        self.metrics.cache_misses.inc();

        let timer = self.metrics.fetch_duration.start_timer();
        let docs = self.fetch_with_retry(key, &mut spacing).await?;
        let fetched = docs.len();
        let records = dedup_by_source(convert_docs(docs)?);

        let stray = records.iter().filter(|r| !r.belongs_to(key)).count();
        if stray > 0 {
            debug!(stray, "archive month contains articles dated in a neighbouring month");
        }

        let inserted = self
            .dao
            .insert_month(key, &records)
            .await
            .map_err(ArchiveError::StoreUnavailable)?;
        timer.observe_duration();

        #[allow(clippy::cast_precision_loss)]
        self.metrics.articles_persisted.inc_by(inserted as f64);
        info!(
            fetched,
            unique = records.len(),
            inserted,
            "cached archive month"
        );

        Ok(true)
    }

    /// キャッシュ全体を破棄する。進行中の取得と参照がすべて終わるまで待つ。
    ///
    /// # Errors
    /// ストアの操作に失敗した場合は `StoreUnavailable`。
    pub async fn drop_cache(&self) -> Result<(), ArchiveError> {
        let _write = self.cache_guard.write().await;
        self.dao
            .drop_all()
            .await
            .map_err(ArchiveError::StoreUnavailable)?;
        warn!("article cache dropped");
        Ok(())
    }

    /// # Errors
    /// ストアに到達できない場合。
    pub async fn ping_store(&self) -> Result<(), ArchiveError> {
        self.dao.ping().await.map_err(ArchiveError::StoreUnavailable)
    }

    async fn is_cached(&self, key: MonthKey) -> Result<bool, ArchiveError> {
        let cached = match self.policy {
            CachePolicy::Marker => self.dao.is_month_fetched(key).await,
            CachePolicy::Presence => self.dao.has_articles_for_month(key).await,
        };
        cached.map_err(ArchiveError::StoreUnavailable)
    }

    /// 再試行付きで月を取得する。再試行するのは一時的な `RemoteUnavailable` のみ。
    async fn fetch_with_retry(
        &self,
        key: MonthKey,
        spacing: &mut RequestSpacing,
    ) -> Result<Vec<ArchiveDoc>, ArchiveError> {
        let mut attempt = 0;

        loop {
            spacing.wait_turn().await;
            self.metrics.remote_requests.inc();

            match self.source.fetch_month(key).await {
                Ok(docs) => {
                    if attempt > 0 {
                        info!(attempt, "fetch succeeded after retry");
                    }
                    return Ok(docs);
                }
                Err(err) => {
                    self.metrics.remote_failures.inc();
                    attempt += 1;

                    if !err.is_retryable() {
                        warn!(error = %err, kind = err.kind(), "archive fetch failed, not retryable");
                        return Err(err);
                    }

                    if !self.retry.allows_another(attempt) {
                        warn!(
                            attempt,
                            max_attempts = self.retry.max_attempts,
                            error = %err,
                            "archive fetch failed after all retries"
                        );
                        return Err(err);
                    }

                    let delay = self.retry.backoff(attempt);
                    self.metrics.retries_total.inc();
                    warn!(
                        attempt,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %err,
                        "archive fetch failed, retrying after delay"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

/// ドキュメントを検証しつつ `ArticleRecord` に変換する。
fn convert_docs(docs: Vec<ArchiveDoc>) -> Result<Vec<ArticleRecord>, ArchiveError> {
    docs.into_iter()
        .map(|doc| {
            let (year, month) = derive_partition(&doc.pub_date).ok_or_else(|| {
                ArchiveError::RemoteFormat(format!(
                    "document {} has an undecodable pub_date `{}`",
                    doc.id, doc.pub_date
                ))
            })?;
            let headline = doc.headline_main().map(str::to_string);
            let web_url = doc.source_id().to_string();
            Ok(ArticleRecord {
                article_id: doc.id,
                web_url,
                pub_date: doc.pub_date,
                year,
                month,
                headline,
                section_name: doc.section_name,
                keywords: doc
                    .keywords
                    .into_iter()
                    .map(|k| KeywordTag::new(k.name, k.value))
                    .collect(),
            })
        })
        .collect()
}

/// ソース識別子で重複を除く。値は後勝ち、位置は最初の出現を保つ。
fn dedup_by_source(records: Vec<ArticleRecord>) -> Vec<ArticleRecord> {
    let mut positions: HashMap<String, usize> = HashMap::with_capacity(records.len());
    let mut unique: Vec<ArticleRecord> = Vec::with_capacity(records.len());
    for record in records {
        if let Some(&idx) = positions.get(&record.web_url) {
            unique[idx] = record;
        } else {
            positions.insert(record.web_url.clone(), unique.len());
            unique.push(record);
        }
    }
    unique
}

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use sqlx::postgres::PgPoolOptions;
use tracing::{info, warn};

use crate::{
    api,
    clients::{ArchiveClient, ArchiveClientConfig, ArchiveSource},
    config::Config,
    observability::Telemetry,
    pipeline::{ArticleCacheGateway, GatewaySettings},
    store::dao::{ArticleDao, InMemoryArticleDao, PgArticleDao},
};

#[derive(Clone)]
pub(crate) struct AppState {
    registry: Arc<ComponentRegistry>,
}

pub struct ComponentRegistry {
    config: Arc<Config>,
    telemetry: Telemetry,
    dao: Arc<dyn ArticleDao>,
    gateway: Arc<ArticleCacheGateway>,
}

impl AppState {
    pub(crate) fn new(registry: ComponentRegistry) -> Self {
        Self {
            registry: Arc::new(registry),
        }
    }

    pub(crate) fn telemetry(&self) -> &Telemetry {
        &self.registry.telemetry
    }

    pub(crate) fn config(&self) -> &Config {
        &self.registry.config
    }

    pub(crate) fn gateway(&self) -> Arc<ArticleCacheGateway> {
        Arc::clone(&self.registry.gateway)
    }
}

impl ComponentRegistry {
    /// 構成情報から依存をまとめて初期化する。
    ///
    /// `ARTICLE_DB_DSN` が未設定ならプロセス内メモリのストアを使う。
    ///
    /// # Errors
    /// Telemetry の初期化、HTTP クライアント構築、スキーマ作成のいずれかが失敗した場合。
    pub async fn build(config: Config) -> Result<Self> {
        let telemetry = Telemetry::new()?;
        let source: Arc<dyn ArchiveSource> = Arc::new(ArchiveClient::new(ArchiveClientConfig {
            base_url: config.archive_base_url().to_string(),
            api_key: config.nyt_api_key().to_string(),
            connect_timeout: config.archive_connect_timeout(),
            read_timeout: config.archive_read_timeout(),
            total_timeout: config.archive_total_timeout(),
        })?);

        let dao: Arc<dyn ArticleDao> = if let Some(dsn) = config.article_db_dsn() {
            let pool = PgPoolOptions::new()
                .max_connections(config.article_db_max_connections())
                .min_connections(config.article_db_min_connections())
                .acquire_timeout(config.article_db_acquire_timeout())
                .test_before_acquire(true)
                .connect_lazy(dsn)
                .context("failed to configure article_db connection pool")?;
            let dao = PgArticleDao::new(pool);
            dao.ensure_schema().await?;
            info!(policy = config.cache_policy().as_str(), "using postgres article store");
            Arc::new(dao)
        } else {
            warn!("ARTICLE_DB_DSN is not set; cached articles will not survive a restart");
            Arc::new(InMemoryArticleDao::new())
        };

        Ok(Self::from_parts(config, telemetry, source, dao))
    }

    /// 組み立て済みの部品からレジストリを作る。
    #[must_use]
    pub fn from_parts(
        config: Config,
        telemetry: Telemetry,
        source: Arc<dyn ArchiveSource>,
        dao: Arc<dyn ArticleDao>,
    ) -> Self {
        let gateway = Arc::new(ArticleCacheGateway::new(
            source,
            Arc::clone(&dao),
            telemetry.metrics(),
            GatewaySettings::from_config(&config),
        ));

        Self {
            config: Arc::new(config),
            telemetry,
            dao,
            gateway,
        }
    }

    #[must_use]
    pub fn config(&self) -> Arc<Config> {
        Arc::clone(&self.config)
    }

    #[must_use]
    pub fn telemetry(&self) -> &Telemetry {
        &self.telemetry
    }

    #[must_use]
    pub fn dao(&self) -> Arc<dyn ArticleDao> {
        Arc::clone(&self.dao)
    }

    #[must_use]
    pub fn gateway(&self) -> Arc<ArticleCacheGateway> {
        Arc::clone(&self.gateway)
    }
}

pub fn build_router(registry: ComponentRegistry) -> Router {
    let state = AppState::new(registry);
    api::router(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ENV_MUTEX, tests::{reset_env, set_env}};

    #[tokio::test]
    async fn component_registry_builds_with_memory_store() {
        let config = {
            let _lock = ENV_MUTEX.lock().expect("env mutex");
            reset_env();
            set_env("NYT_API_KEY", "test-key");
            set_env("ARCHIVE_BASE_URL", "http://localhost:9/");
            let config = Config::from_env().expect("config loads");
            reset_env();
            config
        };

        let registry = ComponentRegistry::build(config)
            .await
            .expect("registry builds");

        assert!(registry.dao().ping().await.is_ok());
        assert_eq!(registry.config().keywords_top_n().get(), 10);
        registry.gateway().drop_cache().await.expect("drop on empty cache");
    }
}

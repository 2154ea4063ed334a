use std::collections::HashSet;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::RwLock;

use super::ArticleDao;
use crate::store::models::{ArticleRecord, MonthKey};

#[derive(Debug, Default)]
struct MemoryState {
    articles: Vec<ArticleRecord>,
    urls: HashSet<String>,
    fetched: HashSet<MonthKey>,
}

/// プロセス内メモリに保持する記事キャッシュ。
///
/// `ARTICLE_DB_DSN` が未設定の場合とテストで使う。プロセス終了で消える。
#[derive(Debug, Default)]
pub struct InMemoryArticleDao {
    state: RwLock<MemoryState>,
}

impl InMemoryArticleDao {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.articles.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl ArticleDao for InMemoryArticleDao {
    async fn is_month_fetched(&self, key: MonthKey) -> Result<bool> {
        Ok(self.state.read().await.fetched.contains(&key))
    }

    async fn has_articles_for_month(&self, key: MonthKey) -> Result<bool> {
        Ok(self
            .state
            .read()
            .await
            .articles
            .iter()
            .any(|article| article.belongs_to(key)))
    }

    async fn insert_month(&self, key: MonthKey, articles: &[ArticleRecord]) -> Result<u64> {
        let mut state = self.state.write().await;
        let mut inserted = 0_u64;
        for article in articles {
            if state.urls.insert(article.web_url.clone()) {
                state.articles.push(article.clone());
                inserted += 1;
            }
        }
        state.fetched.insert(key);
        Ok(inserted)
    }

    async fn articles_for_month(&self, key: MonthKey) -> Result<Vec<ArticleRecord>> {
        Ok(self
            .state
            .read()
            .await
            .articles
            .iter()
            .filter(|article| article.belongs_to(key))
            .cloned()
            .collect())
    }

    async fn drop_all(&self) -> Result<()> {
        *self.state.write().await = MemoryState::default();
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

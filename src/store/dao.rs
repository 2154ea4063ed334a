//! 記事キャッシュのデータアクセス層。

mod memory;
mod postgres;

use anyhow::Result;
use async_trait::async_trait;

use super::models::{ArticleRecord, MonthKey};

pub use memory::InMemoryArticleDao;
pub use postgres::PgArticleDao;

/// ArticleDao - 月単位の記事キャッシュを管理するデータアクセス層
#[async_trait]
pub trait ArticleDao: Send + Sync {
    /// 指定月に取得済みマーカーがあるか
    async fn is_month_fetched(&self, key: MonthKey) -> Result<bool>;

    /// 指定月の記事が1件でも存在するか
    async fn has_articles_for_month(&self, key: MonthKey) -> Result<bool>;

    /// 記事を一括保存し、同じ単位で取得済みマーカーを記録する。
    ///
    /// 既に保存済みの `web_url` は上書きしない。新規に保存した件数を返す。
    async fn insert_month(&self, key: MonthKey, articles: &[ArticleRecord]) -> Result<u64>;

    /// 指定月の記事を保存順で返す
    async fn articles_for_month(&self, key: MonthKey) -> Result<Vec<ArticleRecord>>;

    /// キャッシュ全体（記事とマーカー）を破棄する
    async fn drop_all(&self) -> Result<()>;

    async fn ping(&self) -> Result<()>;
}

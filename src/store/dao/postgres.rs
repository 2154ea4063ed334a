use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::types::Json;
use sqlx::{Executor, PgPool, Row, postgres::PgRow};

use super::ArticleDao;
use crate::store::models::{ArticleRecord, KeywordTag, MonthKey};

/// PostgreSQL に記事キャッシュを保存する DAO。
#[derive(Debug, Clone)]
pub struct PgArticleDao {
    pool: PgPool,
}

impl PgArticleDao {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// 記事テーブルと取得済みマーカーのテーブルを（なければ）作成する。
    ///
    /// # Errors
    /// DDL の実行に失敗した場合はエラーを返す。
    pub async fn ensure_schema(&self) -> Result<()> {
        self.pool
            .execute(
                r"
                CREATE TABLE IF NOT EXISTS articles (
                    seq BIGSERIAL PRIMARY KEY,
                    web_url TEXT NOT NULL UNIQUE,
                    article_id TEXT NOT NULL,
                    pub_date TEXT NOT NULL,
                    year TEXT NOT NULL,
                    month TEXT NOT NULL,
                    headline TEXT,
                    section_name TEXT,
                    keywords JSONB NOT NULL DEFAULT '[]'::JSONB,
                    inserted_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
                );
                CREATE INDEX IF NOT EXISTS idx_articles_year_month
                    ON articles(year, month);

                CREATE TABLE IF NOT EXISTS fetched_months (
                    year TEXT NOT NULL,
                    month TEXT NOT NULL,
                    article_count BIGINT NOT NULL,
                    fetched_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                    PRIMARY KEY (year, month)
                );
                ",
            )
            .await
            .context("failed to create article cache schema")?;
        Ok(())
    }
}

#[async_trait]
impl ArticleDao for PgArticleDao {
    async fn is_month_fetched(&self, key: MonthKey) -> Result<bool> {
        let (year, month) = key.partition();
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM fetched_months WHERE year = $1 AND month = $2)",
        )
        .bind(year)
        .bind(month)
        .fetch_one(&self.pool)
        .await
        .context("failed to check fetched marker")
    }

    async fn has_articles_for_month(&self, key: MonthKey) -> Result<bool> {
        let (year, month) = key.partition();
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM articles WHERE year = $1 AND month = $2)",
        )
        .bind(year)
        .bind(month)
        .fetch_one(&self.pool)
        .await
        .context("failed to check cached articles")
    }

    async fn insert_month(&self, key: MonthKey, articles: &[ArticleRecord]) -> Result<u64> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("failed to begin transaction")?;

        let mut inserted = 0_u64;
        for article in articles {
            let result = sqlx::query(
                r"
                INSERT INTO articles
                    (web_url, article_id, pub_date, year, month, headline, section_name, keywords)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                ON CONFLICT (web_url) DO NOTHING
                ",
            )
            .bind(&article.web_url)
            .bind(&article.article_id)
            .bind(&article.pub_date)
            .bind(&article.year)
            .bind(&article.month)
            .bind(&article.headline)
            .bind(&article.section_name)
            .bind(Json(&article.keywords))
            .execute(&mut *tx)
            .await
            .context("failed to insert article")?;
            inserted += result.rows_affected();
        }

        let (year, month) = key.partition();
        sqlx::query(
            r"
            INSERT INTO fetched_months (year, month, article_count, fetched_at)
            VALUES ($1, $2, $3, NOW())
            ON CONFLICT (year, month)
            DO UPDATE SET article_count = EXCLUDED.article_count, fetched_at = EXCLUDED.fetched_at
            ",
        )
        .bind(year)
        .bind(month)
        .bind(i64::try_from(articles.len()).unwrap_or(i64::MAX))
        .execute(&mut *tx)
        .await
        .context("failed to record fetched marker")?;

        tx.commit().await.context("failed to commit month batch")?;

        Ok(inserted)
    }

    async fn articles_for_month(&self, key: MonthKey) -> Result<Vec<ArticleRecord>> {
        let (year, month) = key.partition();
        let rows = sqlx::query(
            r"
            SELECT article_id, web_url, pub_date, year, month, headline, section_name, keywords
            FROM articles
            WHERE year = $1 AND month = $2
            ORDER BY seq
            ",
        )
        .bind(year)
        .bind(month)
        .fetch_all(&self.pool)
        .await
        .context("failed to fetch articles for month")?;

        rows.iter().map(article_from_row).collect()
    }

    async fn drop_all(&self) -> Result<()> {
        sqlx::query("TRUNCATE articles, fetched_months RESTART IDENTITY")
            .execute(&self.pool)
            .await
            .context("failed to drop article cache")?;
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .context("article store ping failed")?;
        Ok(())
    }
}

fn article_from_row(row: &PgRow) -> Result<ArticleRecord> {
    let keywords: Json<Vec<KeywordTag>> = row.try_get("keywords")?;
    Ok(ArticleRecord {
        article_id: row.try_get("article_id")?,
        web_url: row.try_get("web_url")?,
        pub_date: row.try_get("pub_date")?,
        year: row.try_get("year")?,
        month: row.try_get("month")?,
        headline: row.try_get("headline")?,
        section_name: row.try_get("section_name")?,
        keywords: keywords.0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use sqlx::postgres::PgPoolOptions;

    /// `DATABASE_URL` が設定されている場合のみ実 DB に接続する。
    async fn setup_test_dao() -> Option<PgArticleDao> {
        let database_url = std::env::var("DATABASE_URL").ok()?;
        let pool = PgPoolOptions::new()
            .max_connections(1)
            .connect(&database_url)
            .await
            .expect("database connection");
        let dao = PgArticleDao::new(pool);
        dao.ensure_schema().await.expect("schema setup");
        dao.drop_all().await.expect("clean slate");
        Some(dao)
    }

    fn record(url: &str) -> ArticleRecord {
        ArticleRecord {
            article_id: format!("nyt://article/{url}"),
            web_url: url.to_string(),
            pub_date: "2009-03-02T05:00:00+0000".to_string(),
            year: "2009".to_string(),
            month: "3".to_string(),
            headline: Some("Headline".to_string()),
            section_name: Some("Business".to_string()),
            keywords: vec![
                KeywordTag::new("subject", "Economy"),
                KeywordTag::new("type_of_material", "News"),
            ],
        }
    }

    #[tokio::test]
    async fn month_batch_round_trips_through_postgres() {
        let Some(dao) = setup_test_dao().await else {
            return;
        };
        let key = MonthKey::new_as_of(2009, 3, Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap())
            .unwrap();

        let inserted = dao
            .insert_month(key, &[record("https://nyt.test/a"), record("https://nyt.test/b")])
            .await
            .expect("insert");
        assert_eq!(inserted, 2);
        assert!(dao.is_month_fetched(key).await.unwrap());

        let stored = dao.articles_for_month(key).await.expect("query");
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[0], record("https://nyt.test/a"));

        dao.drop_all().await.expect("drop");
        assert!(!dao.has_articles_for_month(key).await.unwrap());
    }
}

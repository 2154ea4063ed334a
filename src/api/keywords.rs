use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use crate::app::AppState;
use crate::pipeline::{Section, report::month_report};
use crate::store::models::{ArticleRecord, MonthKey};

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ReportQuery {
    top: Option<usize>,
    section: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct MonthArticlesResponse {
    year: i32,
    month: u32,
    label: String,
    articles: Vec<ArticleRecord>,
}

fn bad_query(message: String) -> Response {
    warn!(%message, "rejected keyword query");
    (
        StatusCode::BAD_REQUEST,
        Json(json!({"error": message, "kind": "invalid_query"})),
    )
        .into_response()
}

/// GET /v1/keywords/{year}/{month}
/// 指定月のキーワード頻度上位を返す。
pub(crate) async fn month_keywords(
    State(state): State<AppState>,
    Path((year, month)): Path<(i32, u32)>,
    Query(query): Query<ReportQuery>,
) -> Response {
    let top_n = match query.top {
        Some(0) => return bad_query("top must be greater than zero".to_string()),
        Some(top) => top,
        None => state.config().keywords_top_n().get(),
    };
    let section = match query.section.as_deref().map(str::parse::<Section>) {
        None => Section::All,
        Some(Ok(section)) => section,
        Some(Err(error)) => return bad_query(error.to_string()),
    };
    let key = match MonthKey::new(year, month) {
        Ok(key) => key,
        Err(error) => return error.into_response(),
    };

    let gateway = state.gateway();
    match month_report(&gateway, key, section, top_n).await {
        Ok(report) => {
            info!(
                %key,
                section = section.slug(),
                article_count = report.article_count,
                keywords = report.keywords.len(),
                "served keyword report"
            );
            (StatusCode::OK, Json(report)).into_response()
        }
        Err(error) => error.into_response(),
    }
}

/// GET /v1/articles/{year}/{month}
pub(crate) async fn month_articles(
    State(state): State<AppState>,
    Path((year, month)): Path<(i32, u32)>,
) -> Response {
    let key = match MonthKey::new(year, month) {
        Ok(key) => key,
        Err(error) => return error.into_response(),
    };

    match state.gateway().articles_for(key).await {
        Ok(articles) => (
            StatusCode::OK,
            Json(MonthArticlesResponse {
                year: key.year(),
                month: key.month(),
                label: key.label(),
                articles,
            }),
        )
            .into_response(),
        Err(error) => error.into_response(),
    }
}

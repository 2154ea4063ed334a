use axum::{extract::State, http::StatusCode, response::IntoResponse};

use crate::app::AppState;

/// DELETE /admin/cache
/// 記事キャッシュと取得済みマーカーをすべて破棄する。ログはゲートウェイが成功後に出す。
pub(crate) async fn drop_cache(State(state): State<AppState>) -> impl IntoResponse {
    match state.gateway().drop_cache().await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(error) => error.into_response(),
    }
}

//! アーカイブ取得・キャッシュ層のエラー分類。

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use reqwest::StatusCode as RemoteStatus;
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};

/// ゲートウェイ境界で捕捉され、呼び出し側に返される型付きエラー。
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("archive endpoint unavailable{}: {message}", status.map(|s| format!(" (status {s})")).unwrap_or_default())]
    RemoteUnavailable {
        status: Option<RemoteStatus>,
        message: String,
        retryable: bool,
    },

    #[error("archive response has an unexpected shape: {0}")]
    RemoteFormat(String),

    #[error("article store unavailable")]
    StoreUnavailable(#[source] anyhow::Error),

    #[error("invalid month key {year}-{month}: {reason}")]
    InvalidMonthKey {
        year: i32,
        month: u32,
        reason: &'static str,
    },
}

impl ArchiveError {
    /// reqwest のエラーを分類する。
    ///
    /// 接続失敗・タイムアウト・5xx・429 のみ再試行可能とする。
    pub(crate) fn from_transport(error: &reqwest::Error) -> Self {
        let status = error.status();
        let retryable = error.is_timeout()
            || error.is_connect()
            || error.is_request()
            || status.is_some_and(is_retryable_status);
        ArchiveError::RemoteUnavailable {
            status,
            message: error.to_string(),
            retryable,
        }
    }

    pub(crate) fn from_status(status: RemoteStatus, body: &str) -> Self {
        ArchiveError::RemoteUnavailable {
            status: Some(status),
            message: truncate_body(body),
            retryable: is_retryable_status(status),
        }
    }

    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ArchiveError::RemoteUnavailable {
                retryable: true,
                ..
            }
        )
    }

    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            ArchiveError::RemoteUnavailable { .. } => "remote_unavailable",
            ArchiveError::RemoteFormat(_) => "remote_format_error",
            ArchiveError::StoreUnavailable(_) => "store_unavailable",
            ArchiveError::InvalidMonthKey { .. } => "invalid_month_key",
        }
    }
}

fn is_retryable_status(status: RemoteStatus) -> bool {
    status.is_server_error() || status == RemoteStatus::TOO_MANY_REQUESTS
}

fn truncate_body(body: &str) -> String {
    const LIMIT: usize = 256;
    match body.char_indices().nth(LIMIT) {
        Some((idx, _)) => format!("{}…", &body[..idx]),
        None => body.to_string(),
    }
}

impl IntoResponse for ArchiveError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ArchiveError::InvalidMonthKey { .. } => (StatusCode::BAD_REQUEST, self.to_string()),
            ArchiveError::RemoteUnavailable { .. } | ArchiveError::RemoteFormat(_) => (
                StatusCode::BAD_GATEWAY,
                "data unavailable for this period".to_string(),
            ),
            ArchiveError::StoreUnavailable(_) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "data unavailable for this period".to_string(),
            ),
        };

        if status.is_server_error() {
            error!(kind = self.kind(), error = ?self, "archive request failed");
        } else {
            warn!(kind = self.kind(), error = %self, "rejected archive request");
        }

        let payload = Json(json!({"error": message, "kind": self.kind()}));
        (status, payload).into_response()
    }
}

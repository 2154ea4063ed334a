/// NYT Archive API クライアント。
///
/// 1 か月分の記事メタデータを 1 回のリクエストで取得する。
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::error::ArchiveError;
use crate::store::models::MonthKey;

/// アーカイブから取得したドキュメント。境界で検証する最小限のスキーマ。
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ArchiveDoc {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub web_url: Option<String>,
    pub pub_date: String,
    /// 古い記事では `[]` のこともあるため、形を決め打ちしない。
    #[serde(default)]
    pub headline: Value,
    #[serde(default)]
    pub section_name: Option<String>,
    #[serde(default)]
    pub keywords: Vec<ArchiveKeyword>,
}

impl ArchiveDoc {
    #[must_use]
    pub fn headline_main(&self) -> Option<&str> {
        self.headline
            .get("main")
            .and_then(Value::as_str)
            .filter(|main| !main.is_empty())
    }

    /// 重複排除に使う識別子。`web_url` がなければ `_id`。
    #[must_use]
    pub fn source_id(&self) -> &str {
        self.web_url
            .as_deref()
            .filter(|url| !url.is_empty())
            .unwrap_or(&self.id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ArchiveKeyword {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Deserialize)]
struct ArchiveEnvelope {
    response: ArchiveBody,
}

#[derive(Debug, Deserialize)]
struct ArchiveBody {
    docs: Vec<ArchiveDoc>,
}

/// 月単位で記事を取得するリモートソース。
#[async_trait]
pub trait ArchiveSource: Send + Sync {
    async fn fetch_month(&self, key: MonthKey) -> Result<Vec<ArchiveDoc>, ArchiveError>;
}

#[derive(Debug, Clone)]
pub struct ArchiveClientConfig {
    pub base_url: String,
    pub api_key: String,
    pub connect_timeout: Duration,
    /// 受信が途切れてよい最大時間。本文全体の所要時間ではない。
    pub read_timeout: Duration,
    pub total_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct ArchiveClient {
    client: Client,
    base_url: Url,
    api_key: String,
}

impl ArchiveClient {
    /// # Errors
    /// URLのパースまたはHTTPクライアントの構築に失敗した場合はエラーを返します。
    pub fn new(config: ArchiveClientConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .read_timeout(config.read_timeout)
            .timeout(config.total_timeout)
            .build()
            .context("failed to build archive HTTP client")?;

        // join() drops the last path segment unless the base ends with a slash
        let mut base = config.base_url;
        if !base.ends_with('/') {
            base.push('/');
        }
        let base_url = Url::parse(&base).context("invalid archive base URL")?;

        Ok(Self {
            client,
            base_url,
            api_key: config.api_key,
        })
    }

    fn month_url(&self, key: MonthKey) -> Result<Url, ArchiveError> {
        let mut url = self
            .base_url
            .join(&format!(
                "svc/archive/v1/{}/{}.json",
                key.year(),
                key.month()
            ))
            .map_err(|error| ArchiveError::RemoteUnavailable {
                status: None,
                message: format!("failed to build archive URL: {error}"),
                retryable: false,
            })?;
        url.query_pairs_mut().append_pair("api-key", &self.api_key);
        Ok(url)
    }
}

#[async_trait]
impl ArchiveSource for ArchiveClient {
    async fn fetch_month(&self, key: MonthKey) -> Result<Vec<ArchiveDoc>, ArchiveError> {
        let url = self.month_url(key)?;
        debug!(path = url.path(), "requesting archive month");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|error| ArchiveError::from_transport(&error.without_url()))?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(ArchiveError::from_status(status, &error_body));
        }

        let body = response
            .text()
            .await
            .map_err(|error| ArchiveError::from_transport(&error.without_url()))?;

        let envelope: ArchiveEnvelope = serde_json::from_str(&body)
            .map_err(|error| ArchiveError::RemoteFormat(error.to_string()))?;

        debug!(
            year = key.year(),
            month = key.month(),
            docs = envelope.response.docs.len(),
            "decoded archive month"
        );

        Ok(envelope.response.docs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(base_url: String) -> ArchiveClientConfig {
        ArchiveClientConfig {
            base_url,
            api_key: "secret".to_string(),
            connect_timeout: Duration::from_secs(2),
            read_timeout: Duration::from_secs(2),
            total_timeout: Duration::from_secs(5),
        }
    }

    /// 本文を `interval` ごとに 1 バイトずつ返す HTTP サーバーを立てる。
    async fn trickling_server(body: &'static str, interval: Duration) -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};
        use tokio::net::TcpListener;

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = [0_u8; 4096];
            let _ = socket.read(&mut request).await.unwrap();
            let head = format!(
                "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n",
                body.len()
            );
            socket.write_all(head.as_bytes()).await.unwrap();
            for byte in body.as_bytes() {
                tokio::time::sleep(interval).await;
                if socket.write_all(&[*byte]).await.is_err() {
                    return;
                }
            }
        });
        format!("http://{addr}/")
    }

    fn march_2009() -> MonthKey {
        MonthKey::new_as_of(2009, 3, Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap())
            .unwrap()
    }

    #[tokio::test]
    async fn fetch_month_decodes_docs() {
        let server = MockServer::start().await;
        let body = serde_json::json!({
            "status": "OK",
            "response": {
                "meta": {"hits": 1},
                "docs": [{
                    "_id": "nyt://article/1",
                    "web_url": "https://www.nytimes.com/2009/03/01/business/one.html",
                    "pub_date": "2009-03-01T05:00:00+0000",
                    "headline": {"main": "One", "kicker": null},
                    "section_name": "Business",
                    "keywords": [
                        {"name": "subject", "value": "Economy", "rank": 1, "major": "N"},
                        {"name": "type_of_material", "value": "News", "rank": 2}
                    ]
                }]
            }
        });

        Mock::given(method("GET"))
            .and(path("/svc/archive/v1/2009/3.json"))
            .and(query_param("api-key", "secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .expect(1)
            .mount(&server)
            .await;

        let client = ArchiveClient::new(test_config(server.uri())).expect("client should build");
        let docs = client.fetch_month(march_2009()).await.expect("fetch should succeed");

        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].id, "nyt://article/1");
        assert_eq!(docs[0].headline_main(), Some("One"));
        assert_eq!(docs[0].section_name.as_deref(), Some("Business"));
        assert_eq!(docs[0].keywords.len(), 2);
        assert_eq!(docs[0].keywords[0].value, "Economy");
    }

    #[tokio::test]
    async fn tolerates_list_headlines_and_missing_urls() {
        let server = MockServer::start().await;
        let body = serde_json::json!({
            "response": {"docs": [{
                "_id": "nyt://article/old",
                "pub_date": "1851-09-18T00:00:00Z",
                "headline": []
            }]}
        });
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&server)
            .await;

        let client = ArchiveClient::new(test_config(server.uri())).unwrap();
        let key = MonthKey::new_as_of(1851, 9, Utc::now()).unwrap();
        let docs = client.fetch_month(key).await.expect("fetch should succeed");

        assert_eq!(docs[0].headline_main(), None);
        assert_eq!(docs[0].source_id(), "nyt://article/old");
        assert!(docs[0].keywords.is_empty());
    }

    #[tokio::test]
    async fn non_success_status_is_remote_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429).set_body_string("rate limited"))
            .mount(&server)
            .await;

        let client = ArchiveClient::new(test_config(server.uri())).unwrap();
        let error = client.fetch_month(march_2009()).await.expect_err("should fail");

        assert!(matches!(
            error,
            ArchiveError::RemoteUnavailable {
                status: Some(reqwest::StatusCode::TOO_MANY_REQUESTS),
                retryable: true,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn unexpected_shape_is_format_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"fault": "nope"})),
            )
            .mount(&server)
            .await;

        let client = ArchiveClient::new(test_config(server.uri())).unwrap();
        let error = client.fetch_month(march_2009()).await.expect_err("should fail");

        assert!(matches!(error, ArchiveError::RemoteFormat(_)));
        assert!(!error.is_retryable());
    }

    #[tokio::test]
    async fn unreachable_host_is_retryable() {
        // Nothing listens on the discard port.
        let client = ArchiveClient::new(test_config("http://127.0.0.1:9/".to_string())).unwrap();
        let error = client.fetch_month(march_2009()).await.expect_err("should fail");

        assert!(matches!(error, ArchiveError::RemoteUnavailable { status: None, .. }));
        assert!(error.is_retryable());
    }

    #[tokio::test]
    async fn slow_but_steady_body_outlasts_the_read_timeout() {
        let body = r#"{"response":{"docs":[]}}"#;
        let base_url = trickling_server(body, Duration::from_millis(50)).await;
        let config = ArchiveClientConfig {
            read_timeout: Duration::from_millis(500),
            total_timeout: Duration::from_secs(30),
            ..test_config(base_url)
        };

        // The body takes longer than the read timeout but never pauses for that long.
        let client = ArchiveClient::new(config).unwrap();
        let docs = client.fetch_month(march_2009()).await.expect("fetch should succeed");

        assert!(docs.is_empty());
    }

    #[tokio::test]
    async fn stalled_body_hits_the_read_timeout() {
        let body = r#"{"response":{"docs":[]}}"#;
        let base_url = trickling_server(body, Duration::from_secs(5)).await;
        let config = ArchiveClientConfig {
            read_timeout: Duration::from_millis(200),
            total_timeout: Duration::from_secs(30),
            ..test_config(base_url)
        };

        let client = ArchiveClient::new(config).unwrap();
        let error = client.fetch_month(march_2009()).await.expect_err("should time out");

        assert!(matches!(error, ArchiveError::RemoteUnavailable { status: None, .. }));
        assert!(error.is_retryable());
    }
}

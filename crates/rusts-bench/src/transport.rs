//! HTTP transport to the database under test.

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid endpoint '{url}': {reason}")]
    Endpoint { url: String, reason: String },
}

/// Status and body of a completed request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub body: String,
}

impl Response {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Sends write batches and queries. A non-2xx reply is still `Ok`; only
/// connection-level problems are errors.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn write(&self, body: Bytes, gzip: bool) -> Result<Response, TransportError>;

    async fn query(&self, sql: &str) -> Result<Response, TransportError>;
}

/// How queries are submitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryApi {
    /// `GET /query?db=..&q=..`
    #[default]
    InfluxQl,
    /// `POST /sql` with a `{"query": ..}` JSON body
    Sql,
}

/// reqwest-backed transport.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
    database: String,
    query_api: QueryApi,
}

impl HttpTransport {
    pub fn new(
        server_url: &str,
        database: &str,
        query_api: QueryApi,
        timeout: Duration,
    ) -> Result<Self, TransportError> {
        if !(server_url.starts_with("http://") || server_url.starts_with("https://")) {
            return Err(TransportError::Endpoint {
                url: server_url.to_string(),
                reason: "expected an http:// or https:// URL".to_string(),
            });
        }
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: server_url.trim_end_matches('/').to_string(),
            database: database.to_string(),
            query_api,
        })
    }

    pub fn write_url(&self) -> String {
        format!("{}/write", self.base_url)
    }

    async fn into_response(response: reqwest::Response) -> Response {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        Response { status, body }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn write(&self, body: Bytes, gzip: bool) -> Result<Response, TransportError> {
        let mut request = self
            .client
            .post(self.write_url())
            .query(&[("db", self.database.as_str())])
            .header("Content-Type", "text/plain; charset=utf-8")
            .body(body);
        if gzip {
            request = request.header("Content-Encoding", "gzip");
        }
        let response = request.send().await?;
        Ok(Self::into_response(response).await)
    }

    async fn query(&self, sql: &str) -> Result<Response, TransportError> {
        let request = match self.query_api {
            QueryApi::InfluxQl => self
                .client
                .get(format!("{}/query", self.base_url))
                .query(&[("db", self.database.as_str()), ("q", sql)]),
            QueryApi::Sql => self
                .client
                .post(format!("{}/sql", self.base_url))
                .json(&serde_json::json!({ "query": sql })),
        };
        let response = request.send().await?;
        Ok(Self::into_response(response).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_success_range() {
        assert!(Response::new(204, "").is_success());
        assert!(!Response::new(500, "timeout").is_success());
        assert!(!Response::new(199, "").is_success());
    }

    #[test]
    fn test_http_transport_urls() {
        let t = HttpTransport::new(
            "http://localhost:8086/",
            "benchmark",
            QueryApi::InfluxQl,
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(t.write_url(), "http://localhost:8086/write");
    }

    #[test]
    fn test_http_transport_rejects_bad_scheme() {
        let err = HttpTransport::new(
            "localhost:8086",
            "benchmark",
            QueryApi::Sql,
            Duration::from_secs(5),
        )
        .unwrap_err();
        assert!(matches!(err, TransportError::Endpoint { .. }));
    }
}

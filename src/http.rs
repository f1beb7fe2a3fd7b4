use crate::client::{BoxError, InfluxClient, QueryResult};
use crate::config::Settings;
use crate::point::BatchPoints;
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use std::time::{Duration, Instant};

/// [`InfluxClient`] speaking the InfluxDB 1.x HTTP API.
///
/// Points are written as line protocol to `/write`; queries are posted as a
/// form to `/query` and their JSON answers are decoded into [`QueryResult`]s.
/// Credentials travel in the `Authorization` header, never in the URL.
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    base_url: String,
    username: String,
    password: String,
}

#[derive(Deserialize)]
struct QueryResponse {
    #[serde(default)]
    results: Vec<QueryResult>,
    #[serde(default)]
    error: Option<String>,
}

impl HttpClient {
    /// Build a client for the host, port and credentials in `settings`.
    ///
    /// Every request is bounded by `settings.timeout`.
    pub fn new(settings: &Settings) -> Result<Self, BoxError> {
        Self::with_base_url(settings.base_url(), settings)
    }

    /// Like [`HttpClient::new`] but against an explicit base URL, e.g.
    /// `http://127.0.0.1:8086`.
    pub fn with_base_url(base_url: impl Into<String>, settings: &Settings) -> Result<Self, BoxError> {
        let client = Client::builder().timeout(settings.timeout).build()?;
        Ok(HttpClient {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            username: settings.username.clone(),
            password: settings.password.clone(),
        })
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        if self.username.is_empty() {
            request
        } else {
            request.basic_auth(&self.username, Some(&self.password))
        }
    }

    fn query_endpoint(&self) -> String {
        format!("{}/query", self.base_url)
    }

    fn write_endpoint(&self, batch: &BatchPoints) -> String {
        format!(
            "{}/write?db={}&precision={}",
            self.base_url,
            urlencoding::encode(&batch.database),
            batch.precision.as_str()
        )
    }
}

async fn ensure_success(resp: Response, what: &str) -> Result<Response, BoxError> {
    if resp.status().is_success() {
        Ok(resp)
    } else {
        let status = resp.status();
        let text = resp.text().await.unwrap_or_else(|_| "<no body>".to_string());
        Err(format!("InfluxDB {} failed with status {}: {}", what, status, text.trim()).into())
    }
}

#[async_trait]
impl InfluxClient for HttpClient {
    async fn ping(&self, timeout: Duration) -> Result<(Duration, String), BoxError> {
        let start = Instant::now();
        let resp = self
            .authorize(self.client.get(format!("{}/ping", self.base_url)))
            .timeout(timeout)
            .send()
            .await?;
        let resp = ensure_success(resp, "ping").await?;

        let version = resp
            .headers()
            .get("X-Influxdb-Version")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        Ok((start.elapsed(), version))
    }

    async fn query(&self, command: &str, database: &str) -> Result<Vec<QueryResult>, BoxError> {
        let resp = self
            .authorize(self.client.post(self.query_endpoint()))
            .form(&[("q", command), ("db", database)])
            .send()
            .await?;
        let resp = ensure_success(resp, "query").await?;

        let body: QueryResponse = serde_json::from_str(&resp.text().await?)?;
        if let Some(e) = body.error {
            return Err(format!("InfluxDB query error: {}", e).into());
        }
        if let Some(e) = body.results.iter().find_map(|r| r.error.as_ref()) {
            return Err(format!("InfluxDB query error: {}", e).into());
        }
        Ok(body.results)
    }

    async fn write(&self, batch: &BatchPoints) -> Result<(), BoxError> {
        let resp = self
            .authorize(self.client.post(self.write_endpoint(batch)))
            .header("Content-Type", "text/plain; charset=utf-8")
            .body(batch.to_line_protocol())
            .send()
            .await?;
        ensure_success(resp, "write").await?;
        Ok(())
    }
}

//! Search Backend Client (spec.md §4.E).
//!
//! Hides whether the backend is OpenSearch or Elasticsearch behind a thin
//! `reqwest`-based HTTP client. URL normalization and retry/backoff follow
//! spec.md exactly; `indices.*` calls back the alias-admin interface
//! listed in spec.md §6 for the (external) query surface to eventually
//! consume.

use std::time::{Duration, Instant};

use reqwest::Client;
use serde_json::Value;
use snafu::ResultExt;
use tracing::{info, warn};

use crate::error::{BackendSnafu, RequestSnafu, SearchClientError};

const DEFAULT_RETRIES: u32 = 3;
const BASE_BACKOFF: Duration = Duration::from_millis(500);

/// Bulk response summary: whether any item errored, and how many items were
/// submitted, enough for the bulk indexer's logging in spec.md §4.F.
pub struct BulkResult {
    pub had_errors: bool,
    pub item_count: usize,
}

pub struct SearchClient {
    http: Client,
    base_url: String,
    auth: Option<(String, String)>,
    retries: u32,
}

/// Normalizes a configured host into a base URL (spec.md §4.E):
/// a bare host becomes `http://host:9200`, `host:port` becomes
/// `http://host:port`, and anything already a full URL passes through
/// unchanged (besides a trailing slash). `url::Url` validates the result
/// parses as a sane absolute URL either way.
pub fn normalize_url(raw: &str) -> String {
    let raw = raw.trim();
    let has_scheme = raw.starts_with("http://") || raw.starts_with("https://");
    let candidate = if has_scheme {
        raw.to_string()
    } else if raw.contains(':') {
        format!("http://{raw}")
    } else {
        format!("http://{raw}:9200")
    };

    match url::Url::parse(&candidate) {
        Ok(parsed) => parsed.as_str().trim_end_matches('/').to_string(),
        Err(_) => candidate.trim_end_matches('/').to_string(),
    }
}

impl SearchClient {
    pub fn new(host: &str, auth: Option<(String, String)>) -> Self {
        Self::with_retries(host, auth, DEFAULT_RETRIES)
    }

    pub fn with_retries(host: &str, auth: Option<(String, String)>, retries: u32) -> Self {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("reqwest client config is static and known-valid");
        Self {
            http,
            base_url: normalize_url(host),
            auth,
            retries,
        }
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        let mut builder = self.http.request(method, url);
        if let Some((user, pass)) = &self.auth {
            builder = builder.basic_auth(user, Some(pass));
        }
        builder
    }

    /// `GET /` — liveness / version info.
    pub async fn info(&self) -> Result<Value, SearchClientError> {
        let resp = self
            .request(reqwest::Method::GET, "/")
            .send()
            .await
            .context(RequestSnafu)?;
        self.decode_json(resp, "info").await
    }

    /// `GET /` treated as a boolean ping, per spec.md §4.E.
    pub async fn ping(&self) -> bool {
        self.request(reqwest::Method::GET, "/")
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }

    /// Bounded-retry readiness probe used at process startup (supplemented
    /// feature, see SPEC_FULL.md, grounded on the original's
    /// `wait_for_elasticsearch`).
    pub async fn wait_until_ready(
        &self,
        attempts: u32,
        delay: Duration,
    ) -> Result<(), SearchClientError> {
        use rand::Rng;

        for attempt in 1..=attempts {
            if self.ping().await {
                info!(attempt, "search_backend_ready");
                return Ok(());
            }
            warn!(attempt, attempts, "search_backend_not_ready_retrying");
            // A little jitter keeps a fleet of consumer processes that all
            // started at once from hammering the backend in lockstep.
            let jitter_ms = rand::rng().random_range(0..250);
            tokio::time::sleep(delay + Duration::from_millis(jitter_ms)).await;
        }
        Err(SearchClientError::NotReady { attempts })
    }

    /// `POST /<index>/_doc` with bounded exponential-backoff retries.
    /// Backoff schedule: `base * (attempt + 1)`, default base 500ms
    /// (spec.md §4.E). Each retry increments `index_retries_total`; the
    /// whole call (including any retries) is timed into
    /// `index_latency_seconds`, distinct from the consumer-level
    /// `event_index_latency_seconds` (spec.md §4.J).
    pub async fn index(
        &self,
        index: &str,
        body: &Value,
        pipeline: Option<&str>,
        refresh: bool,
    ) -> Result<Value, SearchClientError> {
        let mut path = format!("/{index}/_doc");
        let mut query = Vec::new();
        if let Some(pipeline) = pipeline {
            query.push(format!("pipeline={pipeline}"));
        }
        if refresh {
            query.push("refresh=true".to_string());
        }
        if !query.is_empty() {
            path.push('?');
            path.push_str(&query.join("&"));
        }

        let start = Instant::now();
        let mut last_err = None;
        for attempt in 0..=self.retries {
            let result = self
                .request(reqwest::Method::POST, &path)
                .json(body)
                .send()
                .await;

            match result {
                Ok(resp) if resp.status().is_success() => {
                    let decoded = self.decode_json(resp, "index").await;
                    metrics::histogram!("index_latency_seconds")
                        .record(start.elapsed().as_secs_f64());
                    return decoded;
                }
                Ok(resp) => {
                    let status = resp.status();
                    let text = resp.text().await.unwrap_or_default();
                    last_err = Some(SearchClientError::Backend {
                        operation: "index",
                        status,
                        body: text,
                    });
                }
                Err(source) => {
                    last_err = Some(SearchClientError::Request { source });
                }
            }

            if attempt < self.retries {
                metrics::counter!("index_retries_total").increment(1);
                let backoff = BASE_BACKOFF * (attempt + 1);
                warn!(attempt, index, "index_attempt_failed_retrying");
                tokio::time::sleep(backoff).await;
            }
        }
        metrics::histogram!("index_latency_seconds").record(start.elapsed().as_secs_f64());
        Err(last_err.expect("loop runs at least once"))
    }

    /// `POST /_bulk` with an NDJSON body built from `(index, source,
    /// pipeline)` actions.
    pub async fn bulk(
        &self,
        actions: &[(String, Value, Option<String>)],
    ) -> Result<BulkResult, SearchClientError> {
        let mut ndjson = String::new();
        for (index, source, pipeline) in actions {
            let mut header = serde_json::json!({"index": {"_index": index}});
            if let Some(pipeline) = pipeline {
                header["index"]["pipeline"] = Value::String(pipeline.clone());
            }
            ndjson.push_str(&header.to_string());
            ndjson.push('\n');
            ndjson.push_str(&source.to_string());
            ndjson.push('\n');
        }

        let resp = self
            .request(reqwest::Method::POST, "/_bulk")
            .header("Content-Type", "application/x-ndjson")
            .body(ndjson)
            .send()
            .await
            .context(RequestSnafu)?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(SearchClientError::Backend {
                operation: "bulk",
                status,
                body,
            });
        }

        let body: Value = resp.json().await.context(RequestSnafu)?;
        let had_errors = body
            .get("errors")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        Ok(BulkResult {
            had_errors,
            item_count: actions.len(),
        })
    }

    /// `GET /_alias/<alias>`.
    pub async fn indices_get_alias(&self, alias: &str) -> Result<Value, SearchClientError> {
        let resp = self
            .request(reqwest::Method::GET, &format!("/_alias/{alias}"))
            .send()
            .await
            .context(RequestSnafu)?;
        self.decode_json(resp, "indices.get_alias").await
    }

    /// `POST /<index>/_count`.
    pub async fn indices_count(&self, index: &str) -> Result<u64, SearchClientError> {
        let resp = self
            .request(reqwest::Method::POST, &format!("/{index}/_count"))
            .send()
            .await
            .context(RequestSnafu)?;
        let body: Value = self.decode_json(resp, "indices.count").await?;
        Ok(body.get("count").and_then(Value::as_u64).unwrap_or(0))
    }

    /// `HEAD /<index>`.
    pub async fn indices_exists(&self, index: &str) -> Result<bool, SearchClientError> {
        let resp = self
            .request(reqwest::Method::HEAD, &format!("/{index}"))
            .send()
            .await
            .context(RequestSnafu)?;
        Ok(resp.status().is_success())
    }

    async fn decode_json(
        &self,
        resp: reqwest::Response,
        operation: &'static str,
    ) -> Result<Value, SearchClientError> {
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return BackendSnafu {
                operation,
                status,
                body,
            }
            .fail();
        }
        resp.json().await.context(RequestSnafu)
    }
}

//! Single egress path for upstream HTTP calls.
//!
//! Every request flows through the same pipeline:
//!
//! 1. fingerprint the request and consult the [`CacheStore`]
//! 2. on a miss, wait for the host's [`RateLimiter`] slot
//! 3. send with a per-attempt timeout, retrying transient failures
//! 4. reject non-2xx statuses without caching them
//! 5. decode by content type and write the body through to the cache

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use crate::cache::CacheStore;
use crate::fingerprint::RequestFingerprint;
use crate::http_client::{HttpClient, HttpError, HttpMethod, HttpRequest, HttpResponse};
use crate::retry::RetryConfig;
use crate::throttling::RateLimiter;

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const SECONDS_PER_HOUR: u64 = 3_600;

/// Gateway failure after the cache, throttle and retry layers have run.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GatewayError {
    #[error("network failure for {url} after {attempts} attempt(s): {message}")]
    Network {
        url: String,
        attempts: u32,
        message: String,
    },

    #[error("{url} answered with status {status}")]
    Upstream { url: String, status: u16 },

    #[error("could not decode response from {url}: {message}")]
    Decode { url: String, message: String },

    #[error("request cancelled")]
    Cancelled,

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

/// Decoded response body as stored in the cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ResponseBody {
    Json(Value),
    Text(String),
}

/// Outbound request description; the gateway owns transport details.
#[derive(Debug, Clone, PartialEq)]
pub struct GatewayRequest {
    method: HttpMethod,
    url: String,
    params: Vec<(String, String)>,
    headers: BTreeMap<String, String>,
    body: Option<Value>,
    ttl: Duration,
}

impl GatewayRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: HttpMethod::Get,
            url: url.into(),
            params: Vec::new(),
            headers: BTreeMap::new(),
            body: None,
            ttl: Duration::ZERO,
        }
    }

    pub fn post_json(url: impl Into<String>, body: Value) -> Self {
        Self {
            method: HttpMethod::Post,
            body: Some(body),
            ..Self::get(url)
        }
        .header("content-type", "application/json")
    }

    /// Append a query parameter; order is kept in the URL but not in the fingerprint.
    pub fn param(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.params.push((name.into(), value.to_string()));
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers
            .insert(name.into().to_ascii_lowercase(), value.into());
        self
    }

    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn ttl_hours(self, hours: u64) -> Self {
        self.ttl(Duration::from_secs(hours.saturating_mul(SECONDS_PER_HOUR)))
    }

    pub const fn method(&self) -> HttpMethod {
        self.method
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub const fn cache_ttl(&self) -> Duration {
        self.ttl
    }

    pub fn fingerprint(&self) -> RequestFingerprint {
        let parameters = match self.method {
            HttpMethod::Get => {
                let map: Map<String, Value> = self
                    .params
                    .iter()
                    .map(|(name, value)| (name.clone(), Value::String(value.clone())))
                    .collect();
                Value::Object(map)
            }
            HttpMethod::Post => self.body.clone().unwrap_or(Value::Null),
        };
        RequestFingerprint::compute(self.method, &self.url, &parameters)
    }

    /// URL with the query string appended.
    pub fn full_url(&self) -> String {
        if self.params.is_empty() {
            return self.url.clone();
        }
        let query = self
            .params
            .iter()
            .map(|(name, value)| {
                format!(
                    "{}={}",
                    urlencoding::encode(name),
                    urlencoding::encode(value)
                )
            })
            .collect::<Vec<_>>()
            .join("&");
        let separator = if self.url.contains('?') { '&' } else { '?' };
        format!("{}{separator}{query}", self.url)
    }

    fn host(&self) -> Result<String, GatewayError> {
        let parsed = reqwest::Url::parse(&self.url)
            .map_err(|error| GatewayError::InvalidRequest(format!("'{}': {error}", self.url)))?;
        parsed
            .host_str()
            .map(str::to_ascii_lowercase)
            .ok_or_else(|| GatewayError::InvalidRequest(format!("'{}' has no host", self.url)))
    }

    fn to_http_request(&self, timeout: Duration) -> HttpRequest {
        let timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        let mut request = HttpRequest::new(self.method, self.full_url()).with_timeout_ms(timeout_ms);
        for (name, value) in &self.headers {
            request = request.with_header(name.clone(), value.clone());
        }
        if let Some(body) = &self.body {
            request = request.with_body(body.to_string());
        }
        request
    }
}

/// Cache-throttle-retry pipeline shared by every source adapter.
#[derive(Clone)]
pub struct HttpGateway {
    client: Arc<dyn HttpClient>,
    cache: CacheStore,
    limiter: RateLimiter,
    retry: RetryConfig,
    timeout: Duration,
    cancel: CancellationToken,
}

impl std::fmt::Debug for HttpGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpGateway")
            .field("retry", &self.retry)
            .field("timeout", &self.timeout)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl HttpGateway {
    pub fn new(client: Arc<dyn HttpClient>, cache: CacheStore, limiter: RateLimiter) -> Self {
        Self {
            client,
            cache,
            limiter,
            retry: RetryConfig::default(),
            timeout: DEFAULT_REQUEST_TIMEOUT,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Per-attempt network timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Run `request` through the cache, throttle and retry layers.
    #[instrument(skip(self, request), fields(method = %request.method, url = %request.url))]
    pub async fn request(&self, request: GatewayRequest) -> Result<ResponseBody, GatewayError> {
        if self.cancel.is_cancelled() {
            return Err(GatewayError::Cancelled);
        }

        tokio::select! {
            biased;
            () = self.cancel.cancelled() => Err(GatewayError::Cancelled),
            result = self.execute(&request) => result,
        }
    }

    /// Fetch and decode JSON; text bodies are parsed, an empty body is `null`.
    pub async fn get_json(&self, request: GatewayRequest) -> Result<Value, GatewayError> {
        let url = request.url.clone();
        match self.request(request).await? {
            ResponseBody::Json(value) => Ok(value),
            ResponseBody::Text(text) if text.trim().is_empty() => Ok(Value::Null),
            ResponseBody::Text(text) => {
                serde_json::from_str(&text).map_err(|error| GatewayError::Decode {
                    url,
                    message: error.to_string(),
                })
            }
        }
    }

    pub async fn get_text(&self, request: GatewayRequest) -> Result<String, GatewayError> {
        match self.request(request).await? {
            ResponseBody::Json(value) => Ok(value.to_string()),
            ResponseBody::Text(text) => Ok(text),
        }
    }

    pub async fn post_json(
        &self,
        url: &str,
        body: Value,
        ttl: Duration,
    ) -> Result<Value, GatewayError> {
        self.get_json(GatewayRequest::post_json(url, body).ttl(ttl)).await
    }

    async fn execute(&self, request: &GatewayRequest) -> Result<ResponseBody, GatewayError> {
        let host = request.host()?;
        let fingerprint = request.fingerprint();

        match self.cache.get(&fingerprint).await {
            Ok(Some(payload)) => match serde_json::from_str::<ResponseBody>(&payload) {
                Ok(body) => {
                    debug!(%fingerprint, "cache hit");
                    return Ok(body);
                }
                Err(error) => warn!(%fingerprint, %error, "ignoring undecodable cache entry"),
            },
            Ok(None) => debug!(%fingerprint, "cache miss"),
            Err(error) => warn!(%fingerprint, %error, "cache read failed, treating as miss"),
        }

        let response = self
            .send_with_retry(&host, request.to_http_request(self.timeout), &request.url)
            .await?;

        if !response.is_success() {
            return Err(GatewayError::Upstream {
                url: request.url.clone(),
                status: response.status,
            });
        }

        let body = decode_body(&request.url, response)?;

        if !request.ttl.is_zero() {
            match serde_json::to_string(&body) {
                Ok(payload) => {
                    if let Err(error) = self.cache.set(&fingerprint, payload, request.ttl).await {
                        warn!(%fingerprint, %error, "cache write failed");
                    }
                }
                Err(error) => warn!(%fingerprint, %error, "response body not cacheable"),
            }
        }

        Ok(body)
    }

    async fn send_with_retry(
        &self,
        host: &str,
        http_request: HttpRequest,
        url: &str,
    ) -> Result<HttpResponse, GatewayError> {
        let mut attempt: u32 = 1;
        loop {
            self.limiter.acquire(host).await;

            let outcome =
                match tokio::time::timeout(self.timeout, self.client.execute(http_request.clone()))
                    .await
                {
                    Ok(result) => result,
                    Err(_) => Err(HttpError::timeout(format!(
                        "no response within {} ms",
                        self.timeout.as_millis()
                    ))),
                };

            match outcome {
                Ok(response) => return Ok(response),
                Err(error) if self.retry.should_retry(&error, attempt) => {
                    let delay = self.retry.delay_for_attempt(attempt - 1);
                    warn!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        %error,
                        "transient failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(error) => {
                    return Err(GatewayError::Network {
                        url: url.to_owned(),
                        attempts: attempt,
                        message: error.message().to_owned(),
                    })
                }
            }
        }
    }
}

fn decode_body(url: &str, response: HttpResponse) -> Result<ResponseBody, GatewayError> {
    if !response.is_json() {
        return Ok(ResponseBody::Text(response.body));
    }
    if response.body.trim().is_empty() {
        return Ok(ResponseBody::Json(Value::Null));
    }
    serde_json::from_str(&response.body)
        .map(ResponseBody::Json)
        .map_err(|error| GatewayError::Decode {
            url: url.to_owned(),
            message: error.to_string(),
        })
}

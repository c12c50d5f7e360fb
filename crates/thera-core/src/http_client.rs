use std::collections::{BTreeMap, VecDeque};
use std::fmt::{Display, Formatter};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// Minimal HTTP method set needed by source adapters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Get,
    Post,
}

impl HttpMethod {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
        }
    }
}

impl Display for HttpMethod {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// HTTP request envelope used by transport calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub body: Option<String>,
    pub timeout_ms: u64,
}

impl HttpRequest {
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: BTreeMap::new(),
            body: None,
            timeout_ms: 30_000,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Post, url)
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers
            .insert(name.into().to_ascii_lowercase(), value.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }
}

/// HTTP response envelope returned by a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16, content_type: Option<&str>, body: impl Into<String>) -> Self {
        Self {
            status,
            content_type: content_type.map(str::to_owned),
            body: body.into(),
        }
    }

    pub fn ok_json(body: impl Into<String>) -> Self {
        Self::new(200, Some("application/json"), body)
    }

    pub fn ok_xml(body: impl Into<String>) -> Self {
        Self::new(200, Some("text/xml; charset=UTF-8"), body)
    }

    pub fn status(status: u16) -> Self {
        Self::new(status, Some("text/plain"), "")
    }

    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }

    pub fn is_json(&self) -> bool {
        self.content_type
            .as_deref()
            .is_some_and(|value| value.trim().to_ascii_lowercase().starts_with("application/json"))
    }
}

/// Transport failure classes; only timeouts and connect failures are transient.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpErrorKind {
    Timeout,
    Connect,
    Other,
}

/// Transport-level HTTP error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpError {
    kind: HttpErrorKind,
    message: String,
}

impl HttpError {
    pub fn new(kind: HttpErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(HttpErrorKind::Timeout, message)
    }

    pub fn connect(message: impl Into<String>) -> Self {
        Self::new(HttpErrorKind::Connect, message)
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::new(HttpErrorKind::Other, message)
    }

    pub const fn kind(&self) -> HttpErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub const fn retryable(&self) -> bool {
        matches!(self.kind, HttpErrorKind::Timeout | HttpErrorKind::Connect)
    }
}

impl Display for HttpError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for HttpError {}

/// Transport contract used by the gateway.
pub trait HttpClient: Send + Sync {
    fn execute<'a>(
        &'a self,
        request: HttpRequest,
    ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, HttpError>> + Send + 'a>>;
}

/// Production HTTP client using reqwest for real API calls.
#[derive(Debug, Clone)]
pub struct ReqwestHttpClient {
    client: Arc<reqwest::Client>,
}

impl ReqwestHttpClient {
    /// Create a client identifying itself with `user_agent`.
    pub fn new(user_agent: &str) -> Self {
        Self {
            client: Arc::new(
                reqwest::Client::builder()
                    .user_agent(user_agent)
                    .build()
                    .unwrap_or_else(|_| reqwest::Client::new()),
            ),
        }
    }

    /// Create a ReqwestHttpClient with a custom reqwest::Client.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self {
            client: Arc::new(client),
        }
    }
}

impl Default for ReqwestHttpClient {
    fn default() -> Self {
        Self::new(concat!("thera/", env!("CARGO_PKG_VERSION")))
    }
}

impl HttpClient for ReqwestHttpClient {
    fn execute<'a>(
        &'a self,
        request: HttpRequest,
    ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, HttpError>> + Send + 'a>> {
        Box::pin(async move {
            let mut builder = match request.method {
                HttpMethod::Get => self.client.get(&request.url),
                HttpMethod::Post => self.client.post(&request.url),
            };

            for (name, value) in &request.headers {
                builder = builder.header(name, value);
            }

            builder = builder.timeout(Duration::from_millis(request.timeout_ms));

            if let Some(body) = request.body {
                builder = builder.body(body);
            }

            let response = builder.send().await.map_err(classify_reqwest_error)?;

            let status = response.status().as_u16();
            let content_type = response
                .headers()
                .get(reqwest::header::CONTENT_TYPE)
                .and_then(|value| value.to_str().ok())
                .map(str::to_owned);
            let body = response.text().await.map_err(classify_reqwest_error)?;

            Ok(HttpResponse {
                status,
                content_type,
                body,
            })
        })
    }
}

fn classify_reqwest_error(error: reqwest::Error) -> HttpError {
    if error.is_timeout() {
        HttpError::timeout(format!("request timeout: {error}"))
    } else if error.is_connect() {
        HttpError::connect(format!("connection failed: {error}"))
    } else {
        HttpError::other(format!("request failed: {error}"))
    }
}

/// Offline transport that replays canned responses, for deterministic tests.
///
/// Routes match on method, URL prefix and an optional body fragment; the most
/// specific route wins. Each route replays its queue in order and then keeps
/// returning the last entry. Unmatched requests get a 404.
#[derive(Default)]
pub struct ScriptedHttpClient {
    routes: Mutex<Vec<ScriptedRoute>>,
    requests: Mutex<Vec<HttpRequest>>,
    latency: Option<Duration>,
}

struct ScriptedRoute {
    method: HttpMethod,
    url_prefix: String,
    body_contains: Option<String>,
    replies: VecDeque<Result<HttpResponse, HttpError>>,
}

impl ScriptedRoute {
    fn matches(&self, request: &HttpRequest) -> bool {
        if self.method != request.method || !request.url.starts_with(&self.url_prefix) {
            return false;
        }
        match (&self.body_contains, &request.body) {
            (None, _) => true,
            (Some(fragment), Some(body)) => body.contains(fragment.as_str()),
            (Some(_), None) => false,
        }
    }

    fn specificity(&self) -> usize {
        self.url_prefix.len() + self.body_contains.as_ref().map_or(0, |_| 10_000)
    }

    fn next_reply(&mut self) -> Result<HttpResponse, HttpError> {
        if self.replies.len() > 1 {
            if let Some(reply) = self.replies.pop_front() {
                return reply;
            }
        }
        self.replies
            .front()
            .cloned()
            .unwrap_or_else(|| Ok(HttpResponse::status(404)))
    }
}

impl ScriptedHttpClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every reply, to exercise deadlines and overlap.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn on_get(self, url_prefix: &str, reply: Result<HttpResponse, HttpError>) -> Self {
        self.route(HttpMethod::Get, url_prefix, None, reply)
    }

    pub fn on_post(self, url_prefix: &str, reply: Result<HttpResponse, HttpError>) -> Self {
        self.route(HttpMethod::Post, url_prefix, None, reply)
    }

    pub fn on_post_containing(
        self,
        url_prefix: &str,
        body_fragment: &str,
        reply: Result<HttpResponse, HttpError>,
    ) -> Self {
        self.route(HttpMethod::Post, url_prefix, Some(body_fragment), reply)
    }

    fn route(
        self,
        method: HttpMethod,
        url_prefix: &str,
        body_contains: Option<&str>,
        reply: Result<HttpResponse, HttpError>,
    ) -> Self {
        {
            let mut routes = self.routes.lock().unwrap_or_else(PoisonError::into_inner);
            let existing = routes.iter_mut().find(|route| {
                route.method == method
                    && route.url_prefix == url_prefix
                    && route.body_contains.as_deref() == body_contains
            });
            match existing {
                Some(route) => route.replies.push_back(reply),
                None => routes.push(ScriptedRoute {
                    method,
                    url_prefix: url_prefix.to_owned(),
                    body_contains: body_contains.map(str::to_owned),
                    replies: VecDeque::from([reply]),
                }),
            }
        }
        self
    }

    /// Every request seen so far, in arrival order.
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn request_count(&self, url_prefix: &str) -> usize {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|request| request.url.starts_with(url_prefix))
            .count()
    }

    fn reply_for(&self, request: &HttpRequest) -> Result<HttpResponse, HttpError> {
        let mut routes = self.routes.lock().unwrap_or_else(PoisonError::into_inner);
        routes
            .iter_mut()
            .filter(|route| route.matches(request))
            .max_by_key(|route| route.specificity())
            .map_or_else(|| Ok(HttpResponse::status(404)), ScriptedRoute::next_reply)
    }
}

impl HttpClient for ScriptedHttpClient {
    fn execute<'a>(
        &'a self,
        request: HttpRequest,
    ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, HttpError>> + Send + 'a>> {
        Box::pin(async move {
            self.requests
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(request.clone());
            let reply = self.reply_for(&request);
            if let Some(latency) = self.latency {
                tokio::time::sleep(latency).await;
            }
            reply
        })
    }
}

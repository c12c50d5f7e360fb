//! Behavior-driven tests for the HTTP gateway
//!
//! These tests verify HOW outbound calls are cached, throttled, retried and
//! cancelled, using a scripted transport instead of the network.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::json;
use tempfile::tempdir;
use thera_core::{
    CacheStore, DomainPolicy, GatewayError, GatewayRequest, HttpError, HttpGateway, HttpResponse,
    RateLimiter, ResponseBody, RetryConfig, ScriptedHttpClient, TheraConfig,
};
use tokio_util::sync::CancellationToken;

const URL: &str = "https://api.test/items";

fn gateway(client: &Arc<ScriptedHttpClient>) -> HttpGateway {
    HttpGateway::new(client.clone(), CacheStore::memory(), RateLimiter::unthrottled())
        .with_retry(RetryConfig::fixed(Duration::from_millis(10), 2))
}

// =============================================================================
// Gateway: Caching
// =============================================================================

#[tokio::test]
async fn when_identical_request_repeats_within_ttl_network_is_not_touched() {
    // Given: An upstream answering with JSON and a 1 h TTL
    let client = Arc::new(ScriptedHttpClient::new().on_get(URL, Ok(HttpResponse::ok_json(r#"{"n":1}"#))));
    let gateway = gateway(&client);
    let request = GatewayRequest::get(URL).param("q", "EGFR").ttl_hours(1);

    // When: The same request is issued twice
    let first = gateway.get_json(request.clone()).await.expect("first call");
    let second = gateway.get_json(request).await.expect("second call");

    // Then: One network call served both
    assert_eq!(first, json!({"n": 1}));
    assert_eq!(first, second);
    assert_eq!(client.request_count(URL), 1);
}

#[tokio::test]
async fn when_params_are_reordered_cache_still_hits() {
    let client = Arc::new(ScriptedHttpClient::new().on_get(URL, Ok(HttpResponse::ok_json("[]"))));
    let gateway = gateway(&client);

    gateway
        .get_json(GatewayRequest::get(URL).param("a", 1).param("b", 2).ttl_hours(1))
        .await
        .expect("first call");
    gateway
        .get_json(GatewayRequest::get(URL).param("b", 2).param("a", 1).ttl_hours(1))
        .await
        .expect("second call");

    assert_eq!(client.request_count(URL), 1);
}

#[tokio::test]
async fn when_ttl_is_zero_response_is_not_cached() {
    let client = Arc::new(ScriptedHttpClient::new().on_get(URL, Ok(HttpResponse::ok_json("{}"))));
    let gateway = gateway(&client);

    for _ in 0..2 {
        gateway.get_json(GatewayRequest::get(URL)).await.expect("call");
    }

    assert_eq!(client.request_count(URL), 2);
    assert_eq!(gateway.cache().stats().await.expect("stats").total, 0);
}

#[tokio::test]
async fn when_upstream_returns_error_status_nothing_is_cached() {
    // Given: An upstream that fails once with 503, then recovers
    let client = Arc::new(
        ScriptedHttpClient::new()
            .on_get(URL, Ok(HttpResponse::status(503)))
            .on_get(URL, Ok(HttpResponse::ok_json(r#"{"ok":true}"#))),
    );
    let gateway = gateway(&client);
    let request = GatewayRequest::get(URL).ttl_hours(6);

    // When: The request is made twice
    let first = gateway.get_json(request.clone()).await;
    let second = gateway.get_json(request).await.expect("recovered");

    // Then: The failure surfaced immediately and was not replayed from cache
    assert_eq!(
        first,
        Err(GatewayError::Upstream {
            url: String::from(URL),
            status: 503
        })
    );
    assert_eq!(second, json!({"ok": true}));
    assert_eq!(client.request_count(URL), 2);
}

#[tokio::test]
async fn when_cache_is_persisted_a_new_gateway_reuses_it() {
    // Given: Two gateways opening the same DuckDB file one after the other
    let dir = tempdir().expect("tempdir");
    let config = TheraConfig::default().with_home(dir.path());
    let client = Arc::new(ScriptedHttpClient::new().on_get(URL, Ok(HttpResponse::ok_xml("<a/>"))));
    let request = GatewayRequest::get(URL).param("id", 7).ttl_hours(24);

    {
        let cache = CacheStore::open(config.cache_config()).expect("open cache");
        let first = HttpGateway::new(client.clone(), cache, RateLimiter::unthrottled());
        assert_eq!(first.get_text(request.clone()).await.expect("fetch"), "<a/>");
    }

    // When: The second gateway asks for the same resource
    let cache = CacheStore::open(config.cache_config()).expect("reopen cache");
    let second = HttpGateway::new(client.clone(), cache, RateLimiter::unthrottled());
    let body = second.request(request).await.expect("cached");

    // Then: The persisted entry answers and the text body kept its kind
    assert_eq!(body, ResponseBody::Text(String::from("<a/>")));
    assert_eq!(client.request_count(URL), 1);
}

// =============================================================================
// Gateway: Decoding
// =============================================================================

#[tokio::test]
async fn when_json_content_type_carries_invalid_json_decode_error_is_returned() {
    let client = Arc::new(ScriptedHttpClient::new().on_get(URL, Ok(HttpResponse::ok_json("{not json"))));
    let gateway = gateway(&client);

    let result = gateway.get_json(GatewayRequest::get(URL).ttl_hours(1)).await;

    assert!(matches!(result, Err(GatewayError::Decode { .. })));
    assert_eq!(gateway.cache().stats().await.expect("stats").total, 0);
}

#[tokio::test]
async fn when_url_is_malformed_request_is_rejected_before_network() {
    let client = Arc::new(ScriptedHttpClient::new());
    let gateway = gateway(&client);

    let result = gateway.get_json(GatewayRequest::get("not a url")).await;

    assert!(matches!(result, Err(GatewayError::InvalidRequest(_))));
    assert!(client.requests().is_empty());
}

// =============================================================================
// Gateway: Retry and Timeout
// =============================================================================

#[tokio::test]
async fn when_connection_keeps_failing_gateway_gives_up_after_three_attempts() {
    // Given: An upstream that refuses every connection
    let client = Arc::new(ScriptedHttpClient::new().on_get(URL, Err(HttpError::connect("refused"))));
    let gateway = gateway(&client);

    // When: A request is made
    let result = gateway.get_json(GatewayRequest::get(URL)).await;

    // Then: Three attempts were made before a network error surfaced
    match result {
        Err(GatewayError::Network { attempts, .. }) => assert_eq!(attempts, 3),
        other => panic!("expected network error, got {other:?}"),
    }
    assert_eq!(client.request_count(URL), 3);
}

#[tokio::test]
async fn when_transient_failure_recovers_retry_returns_the_response() {
    let client = Arc::new(
        ScriptedHttpClient::new()
            .on_get(URL, Err(HttpError::timeout("slow")))
            .on_get(URL, Ok(HttpResponse::ok_json(r#"{"v":2}"#))),
    );
    let gateway = gateway(&client);

    let value = gateway.get_json(GatewayRequest::get(URL)).await.expect("retried");

    assert_eq!(value, json!({"v": 2}));
    assert_eq!(client.request_count(URL), 2);
}

#[tokio::test]
async fn when_failure_is_not_transient_no_retry_happens() {
    let client = Arc::new(ScriptedHttpClient::new().on_get(URL, Err(HttpError::other("tls handshake"))));
    let gateway = gateway(&client);

    let result = gateway.get_json(GatewayRequest::get(URL)).await;

    assert!(matches!(result, Err(GatewayError::Network { attempts: 1, .. })));
    assert_eq!(client.request_count(URL), 1);
}

#[tokio::test]
async fn when_upstream_is_slower_than_timeout_attempt_is_abandoned() {
    // Given: A transport slower than the per-attempt timeout
    let client = Arc::new(
        ScriptedHttpClient::new()
            .with_latency(Duration::from_millis(500))
            .on_get(URL, Ok(HttpResponse::ok_json("{}"))),
    );
    let gateway = HttpGateway::new(client.clone(), CacheStore::memory(), RateLimiter::unthrottled())
        .with_retry(RetryConfig::no_retry())
        .with_timeout(Duration::from_millis(30));

    // When: A request is made
    let started = Instant::now();
    let result = gateway.get_json(GatewayRequest::get(URL)).await;

    // Then: It fails as a network error well before the transport would answer
    assert!(matches!(result, Err(GatewayError::Network { attempts: 1, .. })));
    assert!(started.elapsed() < Duration::from_millis(400));
}

// =============================================================================
// Gateway: Throttling and Cancellation
// =============================================================================

#[tokio::test]
async fn when_same_host_is_hit_repeatedly_requests_are_spaced() {
    let interval = Duration::from_millis(40);
    let client = Arc::new(ScriptedHttpClient::new().on_get(URL, Ok(HttpResponse::ok_json("{}"))));
    let gateway = HttpGateway::new(
        client.clone(),
        CacheStore::memory(),
        RateLimiter::new([DomainPolicy::new("api.test", interval)]),
    );

    let started = Instant::now();
    for page in 0..3 {
        gateway
            .get_json(GatewayRequest::get(URL).param("page", page))
            .await
            .expect("call");
    }

    assert!(started.elapsed() + Duration::from_millis(5) >= interval * 2);
    assert!(gateway.rate_limiter().snapshot("api.test").is_some());
}

#[tokio::test]
async fn when_cache_hits_no_throttle_wait_is_spent() {
    let client = Arc::new(ScriptedHttpClient::new().on_get(URL, Ok(HttpResponse::ok_json("{}"))));
    let gateway = HttpGateway::new(
        client.clone(),
        CacheStore::memory(),
        RateLimiter::new([DomainPolicy::new("api.test", Duration::from_millis(300))]),
    );
    let request = GatewayRequest::get(URL).ttl_hours(1);
    gateway.get_json(request.clone()).await.expect("warm cache");

    let started = Instant::now();
    for _ in 0..3 {
        gateway.get_json(request.clone()).await.expect("cached");
    }

    assert!(started.elapsed() < Duration::from_millis(150));
}

#[tokio::test]
async fn when_token_is_cancelled_in_flight_request_stops_promptly() {
    // Given: A very slow upstream and a cancellation token
    let cancel = CancellationToken::new();
    let client = Arc::new(
        ScriptedHttpClient::new()
            .with_latency(Duration::from_secs(5))
            .on_get(URL, Ok(HttpResponse::ok_json("{}"))),
    );
    let gateway = Arc::new(
        HttpGateway::new(client.clone(), CacheStore::memory(), RateLimiter::unthrottled())
            .with_cancellation(cancel.clone()),
    );

    // When: The token fires while the request is in flight
    let task = {
        let gateway = Arc::clone(&gateway);
        tokio::spawn(async move { gateway.get_json(GatewayRequest::get(URL).ttl_hours(1)).await })
    };
    tokio::time::sleep(Duration::from_millis(30)).await;
    cancel.cancel();

    // Then: The call ends with Cancelled and leaves no cache entry
    let result = tokio::time::timeout(Duration::from_secs(1), task)
        .await
        .expect("cancelled promptly")
        .expect("task");
    assert_eq!(result, Err(GatewayError::Cancelled));
    assert_eq!(gateway.cache().stats().await.expect("stats").total, 0);
}

#[tokio::test]
async fn when_token_is_already_cancelled_nothing_is_sent() {
    let cancel = CancellationToken::new();
    cancel.cancel();
    let client = Arc::new(ScriptedHttpClient::new());
    let gateway = HttpGateway::new(client.clone(), CacheStore::memory(), RateLimiter::unthrottled())
        .with_cancellation(cancel);

    let result = gateway.get_json(GatewayRequest::get(URL)).await;

    assert_eq!(result, Err(GatewayError::Cancelled));
    assert!(client.requests().is_empty());
}

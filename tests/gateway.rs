//! End-to-end scenarios driven against a real `GatewayClient` talking to an
//! in-process mock server, mirroring the request-capture test pattern used
//! for the provider modules' own unit tests but exercising the full
//! transport/retry/fallback stack on top.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use llm_gateway::config::ProviderConfig;
use llm_gateway::{ChatRequest, GatewayClient, Message, Role};

async fn spawn(router: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{address}/v1")
}

fn user_request(model: &str, content: &str) -> ChatRequest {
    ChatRequest::new(
        model,
        vec![Message {
            role: Role::User,
            content: content.to_string(),
            ..Default::default()
        }],
    )
}

#[derive(Clone, Default)]
struct Captured {
    requests: Arc<Mutex<Vec<(HeaderMap, Value)>>>,
}

async fn capture_and_reply(State(state): State<Captured>, headers: HeaderMap, Json(body): Json<Value>) -> impl IntoResponse {
    state.requests.lock().unwrap().push((headers, body));
    (
        StatusCode::OK,
        Json(json!({
            "id": "chatcmpl-123",
            "object": "chat.completion",
            "created": 1_700_000_000,
            "model": "gpt-4o",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": "Hello!"},
                "finish_reason": "stop"
            }],
            "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}
        })),
    )
}

/// Scenario 1: OpenAI non-streaming happy path, driven through the full
/// client rather than the decoder unit test alone — verifies header
/// injection and canonical decoding end to end.
#[tokio::test]
async fn openai_non_streaming_happy_path() {
    let state = Captured::default();
    let app = Router::new().route("/v1/chat/completions", post(capture_and_reply)).with_state(state.clone());
    let base_url = spawn(app).await;

    let client = GatewayClient::new(ProviderConfig::new(base_url, "sk-test", "gpt-4o")).unwrap();
    let response = client.chat(user_request("gpt-4o", "Hello"), &CancellationToken::new()).await.unwrap();

    assert_eq!(response.id, "chatcmpl-123");
    assert_eq!(response.first_message().unwrap().content, "Hello!");
    assert_eq!(response.usage.total_tokens, 15);

    let requests = state.requests.lock().unwrap();
    assert_eq!(requests.len(), 1);
    let (headers, body) = &requests[0];
    assert_eq!(headers.get("authorization").unwrap(), "Bearer sk-test");
    assert_eq!(body.get("model").and_then(Value::as_str), Some("gpt-4o"));
}

/// Fails every request naming `p-model`, succeeds for anything else — a
/// single endpoint standing in for "the primary model is down, any
/// fallback model works", since this gateway has one configured base URL
/// per client and distinguishes candidates only by the `model` field in
/// the request body.
async fn fails_for_primary_model(State(state): State<Captured>, headers: HeaderMap, Json(body): Json<Value>) -> impl IntoResponse {
    state.requests.lock().unwrap().push((headers, body.clone()));
    if body.get("model").and_then(Value::as_str) == Some("p-model") {
        return (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({"error": {"message": "down for maintenance"}}))).into_response();
    }

    (
        StatusCode::OK,
        Json(json!({
            "id": "chatcmpl-789",
            "created": 0,
            "model": "f-model",
            "choices": [{"index": 0, "message": {"role": "assistant", "content": "ok"}, "finish_reason": "stop"}],
            "usage": {"prompt_tokens": 1, "completion_tokens": 1, "total_tokens": 2}
        })),
    )
        .into_response()
}

/// Scenario 5: fallback after primary failure. The primary model always
/// gets a 500 back; the fallback model id succeeds on the same endpoint.
/// The gateway must surface the fallback's content without retrying the
/// primary past its own budget.
#[tokio::test]
async fn falls_back_to_second_model_after_primary_failures() {
    let state = Captured::default();
    let app = Router::new().route("/v1/chat/completions", post(fails_for_primary_model)).with_state(state.clone());
    let base_url = spawn(app).await;

    let mut config = ProviderConfig::new(base_url, "sk-test", "p-model");
    config.fallback_models = vec!["f-model".to_string()];
    config.fallback_timeout = Some(Duration::from_secs(2));
    let client = GatewayClient::new(config).unwrap().with_retry_policy(llm_gateway::RetryPolicy {
        max_retries: 0,
        ..Default::default()
    });

    let response = client.chat(user_request("p-model", "Hello"), &CancellationToken::new()).await.unwrap();
    assert_eq!(response.first_message().unwrap().content, "ok");

    let requests = state.requests.lock().unwrap();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].1.get("model").and_then(Value::as_str), Some("p-model"));
    assert_eq!(requests[1].1.get("model").and_then(Value::as_str), Some("f-model"));
}

async fn rate_limited_once(
    State(state): State<Arc<Mutex<u32>>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    let mut calls = state.lock().unwrap();
    *calls += 1;
    if *calls == 1 {
        let mut response_headers = HeaderMap::new();
        response_headers.insert("retry-after", "1".parse().unwrap());
        return (StatusCode::TOO_MANY_REQUESTS, response_headers, Json(json!({"error": "rate limit reached"}))).into_response();
    }

    let _ = (headers, body);
    (
        StatusCode::OK,
        Json(json!({
            "id": "chatcmpl-456",
            "created": 0,
            "model": "gpt-4o",
            "choices": [{"index": 0, "message": {"role": "assistant", "content": "ok"}, "finish_reason": "stop"}],
            "usage": {"prompt_tokens": 1, "completion_tokens": 1, "total_tokens": 2}
        })),
    )
        .into_response()
}

/// Scenario 6's non-streaming analogue: a 429 with `Retry-After: 1` on the
/// first attempt forces a ≥1s wait before the retry succeeds.
#[tokio::test]
async fn honors_retry_after_before_succeeding() {
    let calls = Arc::new(Mutex::new(0u32));
    let app = Router::new().route("/v1/chat/completions", post(rate_limited_once)).with_state(calls.clone());
    let base_url = spawn(app).await;

    let client = GatewayClient::new(ProviderConfig::new(base_url, "sk-test", "gpt-4o")).unwrap();

    let started = std::time::Instant::now();
    let response = client.chat(user_request("gpt-4o", "Hello"), &CancellationToken::new()).await.unwrap();
    let elapsed = started.elapsed();

    assert_eq!(response.first_message().unwrap().content, "ok");
    assert!(elapsed >= Duration::from_secs(1), "expected at least a 1s gap, got {elapsed:?}");
    assert_eq!(*calls.lock().unwrap(), 2);
}

/// Cancelling before the call starts returns `Cancelled` without ever
/// reaching the server.
#[tokio::test]
async fn cancellation_short_circuits_before_any_request() {
    let state = Captured::default();
    let app = Router::new().route("/v1/chat/completions", post(capture_and_reply)).with_state(state.clone());
    let base_url = spawn(app).await;

    let client = GatewayClient::new(ProviderConfig::new(base_url, "sk-test", "gpt-4o")).unwrap();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = client.chat(user_request("gpt-4o", "Hello"), &cancel).await.unwrap_err();
    assert!(matches!(err, llm_gateway::GatewayError::Cancelled));
    assert_eq!(state.requests.lock().unwrap().len(), 0);
}

/// Exercises streaming through the full client: content deltas fire in
/// order and the accumulated response carries the terminal usage.
#[tokio::test]
async fn streams_content_deltas_through_full_client() {
    async fn stream_handler(headers: HeaderMap, Json(body): Json<Value>) -> impl IntoResponse {
        let _ = (headers, body);
        let chunks = [
            "data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\n".to_string(),
            "data: {\"choices\":[{\"delta\":{\"content\":\"lo\"}}]}\n\n".to_string(),
            "data: {\"choices\":[{\"delta\":{},\"finish_reason\":\"stop\"}],\"usage\":{\"prompt_tokens\":3,\"completion_tokens\":2}}\n\n".to_string(),
            "data: [DONE]\n\n".to_string(),
        ];
        let body = chunks.join("");
        axum::http::Response::builder()
            .status(StatusCode::OK)
            .header("content-type", "text/event-stream")
            .body(axum::body::Body::from(body))
            .unwrap()
    }

    let app = Router::new().route("/v1/chat/completions", post(stream_handler));
    let base_url = spawn(app).await;

    let client = GatewayClient::new(ProviderConfig::new(base_url, "sk-test", "gpt-4o")).unwrap();

    let mut received = String::new();
    let mut saw_done = false;
    let response = client
        .chat_stream(
            user_request("gpt-4o", "Hello"),
            |content, _thinking, done| {
                received.push_str(content);
                if done {
                    saw_done = true;
                }
            },
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(received, "Hello");
    assert!(saw_done);
    assert_eq!(response.usage.total_tokens, 5);
}

/// Streaming analogue of `falls_back_to_second_model_after_primary_failures`:
/// the primary model's stream request 500s, the fallback's SSE body plays
/// through normally, and deltas only ever arrive from the eventually
/// successful candidate.
#[tokio::test]
async fn falls_back_to_second_model_while_streaming() {
    async fn stream_handler(headers: HeaderMap, Json(body): Json<Value>) -> axum::response::Response {
        let _ = headers;
        if body.get("model").and_then(Value::as_str) == Some("p-model") {
            return (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({"error": {"message": "down for maintenance"}}))).into_response();
        }

        let chunks = [
            "data: {\"choices\":[{\"delta\":{\"content\":\"ok\"}}]}\n\n".to_string(),
            "data: {\"choices\":[{\"delta\":{},\"finish_reason\":\"stop\"}],\"usage\":{\"prompt_tokens\":1,\"completion_tokens\":1}}\n\n".to_string(),
            "data: [DONE]\n\n".to_string(),
        ];
        axum::http::Response::builder()
            .status(StatusCode::OK)
            .header("content-type", "text/event-stream")
            .body(axum::body::Body::from(chunks.join("")))
            .unwrap()
    }

    let app = Router::new().route("/v1/chat/completions", post(stream_handler));
    let base_url = spawn(app).await;

    let mut config = ProviderConfig::new(base_url, "sk-test", "p-model");
    config.fallback_models = vec!["f-model".to_string()];
    config.fallback_timeout = Some(Duration::from_secs(2));
    let client = GatewayClient::new(config).unwrap().with_retry_policy(llm_gateway::RetryPolicy {
        max_retries: 0,
        ..Default::default()
    });

    let mut received = String::new();
    let response = client
        .chat_stream(
            user_request("p-model", "Hello"),
            |content, _thinking, _done| received.push_str(content),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(received, "ok");
    assert_eq!(response.usage.total_tokens, 2);
}


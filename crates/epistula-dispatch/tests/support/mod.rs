//! Mock miners for dispatch integration tests
//!
//! Each miner is an axum server on an ephemeral port. Chat requests are
//! verified with the receiving half of the signature protocol before the
//! configured behavior runs, so a 200 from a mock proves the request was
//! correctly signed for that miner.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::{header::CONTENT_TYPE, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use epistula_dispatch::{
    AvailabilityQuery, DispatchConfig, DispatchContext, QueryTarget, StaticRegistry,
};
use epistula_signature::{
    now_millis, verify, verify_secret_signatures, Identity, ReceivedHeaders, SigningIdentity,
};
use futures::StreamExt;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// How a mock miner answers chat requests.
#[derive(Debug, Clone)]
pub enum ChatBehavior {
    /// Stream these fragments, then `[DONE]`
    Stream(Vec<&'static str>),
    /// Wait before sending any response headers, then stream
    Delayed(Duration, Vec<&'static str>),
    /// Stream these fragments, then never finish
    StallAfter(Vec<&'static str>),
    /// Stream these fragments, then a line that is not JSON
    GarbageAfter(Vec<&'static str>),
    /// Reply with this status and no stream
    Status(u16),
}

/// How a mock miner answers availability probes.
#[derive(Debug, Clone)]
pub enum AvailabilityBehavior {
    /// Reply with this JSON body
    Reply(serde_json::Value),
    /// Wait before sending any response headers, then reply
    DelayedReply(Duration, serde_json::Value),
    /// Reply with a body that is not JSON
    Garbage,
    /// Reply with this status
    Status(u16),
}

struct MinerState {
    identity: Identity,
    chat: ChatBehavior,
    availability: AvailabilityBehavior,
    requests: Mutex<Vec<Vec<(String, String)>>>,
    probes: Mutex<Vec<AvailabilityQuery>>,
}

/// Handle to a running mock miner.
pub struct MockMiner {
    state: Arc<MinerState>,
    addr: SocketAddr,
}

impl MockMiner {
    /// Target pointing at this miner.
    pub fn target(&self, uid: u16) -> QueryTarget {
        QueryTarget::new(uid, self.state.identity, self.addr.to_string())
    }

    /// Headers of every verified chat request, lower-cased names.
    pub fn requests(&self) -> Vec<Vec<(String, String)>> {
        self.state.requests.lock().unwrap().clone()
    }

    /// Availability queries received.
    pub fn probes(&self) -> Vec<AvailabilityQuery> {
        self.state.probes.lock().unwrap().clone()
    }
}

fn fragment(content: &str) -> String {
    let chunk = serde_json::json!({"choices": [{"delta": {"content": content}}]});
    format!("data: {chunk}\n\n")
}

fn sse(body: Body) -> Response {
    (StatusCode::OK, [(CONTENT_TYPE, "text/event-stream")], body).into_response()
}

fn fragment_lines(parts: &[&'static str]) -> Vec<Result<String, Infallible>> {
    parts.iter().map(|p| Ok(fragment(p))).collect()
}

fn finished_stream(parts: &[&'static str]) -> Body {
    let mut lines = fragment_lines(parts);
    lines.push(Ok("data: [DONE]\n\n".to_string()));
    Body::from_stream(futures::stream::iter(lines))
}

async fn chat(State(state): State<Arc<MinerState>>, headers: HeaderMap, body: Bytes) -> Response {
    let pairs: Vec<(String, String)> = headers
        .iter()
        .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.as_str().to_string(), v.to_string())))
        .collect();
    let received =
        ReceivedHeaders::from_pairs(pairs.iter().map(|(k, v)| (k.as_str(), v.as_str())));

    if let Err(reason) = verify(&received.with_body(&body), now_millis()) {
        return (StatusCode::UNAUTHORIZED, reason.to_string()).into_response();
    }
    if received.signed_for() != state.identity.to_string() {
        return (StatusCode::UNAUTHORIZED, "wrong receiver").into_response();
    }
    let signed_by: Identity = match received.signed_by().parse() {
        Ok(id) => id,
        Err(_) => return (StatusCode::UNAUTHORIZED, "bad sender").into_response(),
    };
    let secrets = received.secret_signatures();
    if !verify_secret_signatures(secrets, &signed_by, &state.identity, now_millis()) {
        return (StatusCode::UNAUTHORIZED, "bad secret").into_response();
    }
    state.requests.lock().unwrap().push(pairs);

    match &state.chat {
        ChatBehavior::Stream(parts) => sse(finished_stream(parts)),
        ChatBehavior::Delayed(delay, parts) => {
            tokio::time::sleep(*delay).await;
            sse(finished_stream(parts))
        }
        ChatBehavior::StallAfter(parts) => {
            let stream =
                futures::stream::iter(fragment_lines(parts)).chain(futures::stream::pending());
            sse(Body::from_stream(stream))
        }
        ChatBehavior::GarbageAfter(parts) => {
            let mut lines = fragment_lines(parts);
            lines.push(Ok("data: {this is not json\n\n".to_string()));
            sse(Body::from_stream(futures::stream::iter(lines)))
        }
        ChatBehavior::Status(code) => StatusCode::from_u16(*code).unwrap().into_response(),
    }
}

async fn availability(
    State(state): State<Arc<MinerState>>,
    Json(query): Json<AvailabilityQuery>,
) -> Response {
    state.probes.lock().unwrap().push(query);
    match &state.availability {
        AvailabilityBehavior::Reply(value) => Json(value.clone()).into_response(),
        AvailabilityBehavior::DelayedReply(delay, value) => {
            tokio::time::sleep(*delay).await;
            Json(value.clone()).into_response()
        }
        AvailabilityBehavior::Garbage => (StatusCode::OK, "<html>nope</html>").into_response(),
        AvailabilityBehavior::Status(code) => StatusCode::from_u16(*code).unwrap().into_response(),
    }
}

/// Start a miner with the given behaviors.
pub async fn spawn_miner_with(
    chat_behavior: ChatBehavior,
    availability_behavior: AvailabilityBehavior,
) -> MockMiner {
    let state = Arc::new(MinerState {
        identity: SigningIdentity::generate().identity(),
        chat: chat_behavior,
        availability: availability_behavior,
        requests: Mutex::new(Vec::new()),
        probes: Mutex::new(Vec::new()),
    });
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let app = Router::new()
        .route("/v1/chat/completions", post(chat))
        .route("/availability", post(availability))
        .with_state(Arc::clone(&state));
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    MockMiner { state, addr }
}

/// Start a miner that only cares about chat requests.
pub async fn spawn_miner(chat_behavior: ChatBehavior) -> MockMiner {
    spawn_miner_with(chat_behavior, AvailabilityBehavior::Status(404)).await
}

/// A target whose port has nothing listening.
pub fn unreachable_target(uid: u16) -> QueryTarget {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    QueryTarget::new(uid, SigningIdentity::generate().identity(), addr.to_string())
}

/// Dispatch context with short timeouts and `targets` registered.
pub fn context(targets: &[QueryTarget]) -> DispatchContext {
    context_with(targets, DispatchConfig::testing())
}

/// Dispatch context with a custom config.
pub fn context_with(targets: &[QueryTarget], config: DispatchConfig) -> DispatchContext {
    DispatchContext::new(
        Arc::new(SigningIdentity::generate()),
        Arc::new(StaticRegistry::new(targets.iter().cloned())),
        config,
    )
    .unwrap()
}

/// A minimal chat body.
pub fn chat_body() -> Vec<u8> {
    serde_json::to_vec(&serde_json::json!({
        "model": "test-model",
        "messages": [{"role": "user", "content": "hello"}],
        "temperature": 0.5,
        "seed": 7,
    }))
    .unwrap()
}

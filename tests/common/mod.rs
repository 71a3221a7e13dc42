//! Local WAF stand-in for integration tests
//!
//! Serves the HTTP resources and the `/ws/logs` live feed on an ephemeral
//! port. Tests drive the feed through [`MockWafServer::push`] and
//! [`MockWafServer::kick`].

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, Query, State,
    },
    http::{StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::{delete, get, patch},
    Json, Router,
};
use serde_json::{json, Value};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use uuid::Uuid;

#[derive(Debug, Clone)]
enum FeedCommand {
    Send(String),
    Kick,
}

pub struct WafState {
    pub rules: Mutex<Vec<Value>>,
    pub blocked: Mutex<Vec<Value>>,
    pub stats: Mutex<Value>,
    pub stats_calls: AtomicUsize,
    /// Status and body returned by stats and mutation routes while set
    pub failure: Mutex<Option<(u16, String)>>,
    pub redis_up: AtomicBool,
    pub last_query: Mutex<Option<HashMap<String, String>>>,
    pub last_path: Mutex<Option<String>>,
    /// Feed connections accepted so far
    pub connections: AtomicUsize,
    /// Feed connections currently open
    pub live: AtomicUsize,
    feed: broadcast::Sender<FeedCommand>,
}

impl WafState {
    fn new() -> Self {
        let (feed, _) = broadcast::channel(256);
        Self {
            rules: Mutex::new(Vec::new()),
            blocked: Mutex::new(Vec::new()),
            stats: Mutex::new(stats_json(0)),
            stats_calls: AtomicUsize::new(0),
            failure: Mutex::new(None),
            redis_up: AtomicBool::new(true),
            last_query: Mutex::new(None),
            last_path: Mutex::new(None),
            connections: AtomicUsize::new(0),
            live: AtomicUsize::new(0),
            feed,
        }
    }

    fn failure(&self) -> Option<Response> {
        self.failure.lock().unwrap().clone().map(|(status, body)| {
            let status = StatusCode::from_u16(status).unwrap();
            (status, body).into_response()
        })
    }
}

pub struct MockWafServer {
    pub addr: SocketAddr,
    pub state: Arc<WafState>,
    task: JoinHandle<()>,
}

impl MockWafServer {
    pub async fn start() -> Self {
        let state = Arc::new(WafState::new());
        let router = Router::new()
            .route("/health", get(health))
            .route("/ready", get(ready))
            .route("/api/logs", get(logs))
            .route("/api/stats", get(stats))
            .route("/api/rules", get(rules))
            .route("/api/rules/{id}/toggle", patch(toggle_rule))
            .route("/api/blocked-ips", get(blocked_ips))
            .route("/api/blocked-ips/{ip}", delete(unblock))
            .route("/ws/logs", get(feed))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let task = tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        Self { addr, state, task }
    }

    pub fn api_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    pub fn feed_url(&self) -> url::Url {
        url::Url::parse(&format!("{}/ws/logs", self.ws_url())).unwrap()
    }

    /// Send a text frame to every open feed connection
    pub fn push(&self, text: impl Into<String>) {
        let _ = self.state.feed.send(FeedCommand::Send(text.into()));
    }

    /// Close every open feed connection from the server side
    pub fn kick(&self) {
        let _ = self.state.feed.send(FeedCommand::Kick);
    }

    pub fn fail_with(&self, status: u16, body: &str) {
        *self.state.failure.lock().unwrap() = Some((status, body.to_string()));
    }

    pub fn recover(&self) {
        *self.state.failure.lock().unwrap() = None;
    }

    pub fn connections(&self) -> usize {
        self.state.connections.load(Ordering::SeqCst)
    }

    pub fn live(&self) -> usize {
        self.state.live.load(Ordering::SeqCst)
    }
}

impl Drop for MockWafServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn health() -> Json<Value> {
    Json(json!({"status": "ok", "service": "waf"}))
}

async fn ready(State(state): State<Arc<WafState>>) -> Response {
    if state.redis_up.load(Ordering::SeqCst) {
        Json(json!({"db": "ok", "redis": "ok"})).into_response()
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({"db": "ok", "redis": "error"})),
        )
            .into_response()
    }
}

async fn logs(
    State(state): State<Arc<WafState>>,
    Query(query): Query<HashMap<String, String>>,
) -> Json<Value> {
    let limit: usize = query
        .get("limit")
        .and_then(|v| v.parse().ok())
        .unwrap_or(50);
    *state.last_query.lock().unwrap() = Some(query);
    let events: Vec<Value> = (0..limit.min(3))
        .map(|n| event_json(&format!("/history/{n}")))
        .collect();
    Json(Value::Array(events))
}

async fn stats(State(state): State<Arc<WafState>>) -> Response {
    state.stats_calls.fetch_add(1, Ordering::SeqCst);
    if let Some(failure) = state.failure() {
        return failure;
    }
    Json(state.stats.lock().unwrap().clone()).into_response()
}

async fn rules(State(state): State<Arc<WafState>>) -> Json<Value> {
    Json(Value::Array(state.rules.lock().unwrap().clone()))
}

async fn toggle_rule(State(state): State<Arc<WafState>>, Path(id): Path<String>) -> Response {
    if let Some(failure) = state.failure() {
        return failure;
    }
    let mut rules = state.rules.lock().unwrap();
    match rules.iter_mut().find(|rule| rule["id"] == id.as_str()) {
        Some(rule) => {
            let enabled = rule["enabled"].as_bool().unwrap_or(false);
            rule["enabled"] = Value::Bool(!enabled);
            Json(rule.clone()).into_response()
        }
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({"detail": "Rule not found"})),
        )
            .into_response(),
    }
}

async fn blocked_ips(State(state): State<Arc<WafState>>) -> Json<Value> {
    Json(Value::Array(state.blocked.lock().unwrap().clone()))
}

async fn unblock(
    State(state): State<Arc<WafState>>,
    Path(ip): Path<String>,
    uri: Uri,
) -> Response {
    *state.last_path.lock().unwrap() = Some(uri.path().to_string());
    if let Some(failure) = state.failure() {
        return failure;
    }
    let mut blocked = state.blocked.lock().unwrap();
    let before = blocked.len();
    blocked.retain(|entry| entry["ip_address"] != ip.as_str());
    if blocked.len() == before {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({"detail": "IP not found in blocklist"})),
        )
            .into_response();
    }
    Json(json!({"message": format!("IP {ip} unblocked")})).into_response()
}

async fn feed(ws: WebSocketUpgrade, State(state): State<Arc<WafState>>) -> Response {
    ws.on_upgrade(move |socket| serve_feed(socket, state))
}

async fn serve_feed(mut socket: WebSocket, state: Arc<WafState>) {
    let mut commands = state.feed.subscribe();
    state.connections.fetch_add(1, Ordering::SeqCst);
    state.live.fetch_add(1, Ordering::SeqCst);

    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Ok(FeedCommand::Send(text)) => {
                    if socket.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                Ok(FeedCommand::Kick) => {
                    let _ = socket.send(Message::Close(None)).await;
                    break;
                }
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => break,
            },
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }

    state.live.fetch_sub(1, Ordering::SeqCst);
}

pub fn event_json(endpoint: &str) -> Value {
    json!({
        "id": Uuid::new_v4(),
        "ip_address": "203.0.113.7",
        "method": "GET",
        "endpoint": endpoint,
        "threat_score": 0,
        "action_taken": "allow",
        "threat_types": [],
        "created_at": "2025-03-01T12:00:00.250000"
    })
}

pub fn new_log_frame(endpoint: &str) -> String {
    json!({"type": "new_log", "data": event_json(endpoint)}).to_string()
}

pub fn rule_json(name: &str, enabled: bool) -> Value {
    json!({
        "id": Uuid::new_v4(),
        "name": name,
        "type": "SQLi",
        "pattern": "union\\s+select",
        "score": 60,
        "action": "block",
        "enabled": enabled,
        "created_at": "2025-03-01T09:30:00"
    })
}

pub fn blocked_json(ip: &str) -> Value {
    json!({
        "id": Uuid::new_v4(),
        "ip_address": ip,
        "reason": "Threat score 85 exceeded threshold",
        "expires_at": null,
        "created_at": "2025-03-01T09:30:00"
    })
}

pub fn stats_json(total: u64) -> Value {
    json!({
        "total_requests": total,
        "blocked_requests": total / 4,
        "allowed_requests": total / 2,
        "top_ips": [{"ip": "203.0.113.7", "count": total / 2}],
        "threat_distribution": [{"type": "SQLi", "count": 3}],
        "requests_over_time": [{"hour": "2025-03-01T12:00:00", "count": total}]
    })
}

/// Poll `condition` until it holds, panicking after five seconds
pub async fn eventually<F>(what: &str, condition: F)
where
    F: Fn() -> bool,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !condition() {
        if tokio::time::Instant::now() >= deadline {
            panic!("timed out waiting for {what}");
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

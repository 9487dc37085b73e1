//! Shared helpers for the integration tests.
#![allow(dead_code)]

use axum::{
    body::Body,
    extract::Path,
    http::{HeaderMap, Request, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use http_body_util::BodyExt;
use plantuml_mcp::{
    config::Config,
    plantuml::{
        client::{ERROR_HEADER, ERROR_LINE_HEADER},
        encoding,
    },
    state::GatewayState,
};
use serde_json::{json, Value};
use std::time::Duration;

/// Marker that makes the mock PlantUML server report a syntax error on the
/// line containing it.
pub const BROKEN_MARKER: &str = "!!broken";

/// Answer like a PlantUML server: 200 with an image, or 400 plus the error
/// headers when a line contains [`BROKEN_MARKER`].
async fn render(format: &'static str, encoded: String) -> Response {
    let Ok(source) = encoding::decode(&encoded) else {
        return (StatusCode::BAD_REQUEST, "bad encoding").into_response();
    };

    if let Some(index) = source.lines().position(|l| l.contains(BROKEN_MARKER)) {
        let mut headers = HeaderMap::new();
        headers.insert(ERROR_HEADER, "Syntax Error?".parse().unwrap());
        headers.insert(ERROR_LINE_HEADER, (index + 1).to_string().parse().unwrap());
        return (StatusCode::BAD_REQUEST, headers, "<svg/>").into_response();
    }

    match format {
        "png" => ([("content-type", "image/png")], vec![0x89u8, b'P', b'N', b'G']).into_response(),
        _ => ([("content-type", "image/svg+xml")], "<svg/>").into_response(),
    }
}

/// Start a mock PlantUML server on an ephemeral port and return its URL.
pub async fn spawn_plantuml() -> String {
    let router = Router::new()
        .route(
            "/svg/{encoded}",
            get(|Path(encoded): Path<String>| render("svg", encoded)),
        )
        .route(
            "/png/{encoded}",
            get(|Path(encoded): Path<String>| render("png", encoded)),
        );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

pub fn test_config(plantuml_server: &str, api_key: Option<&str>) -> Config {
    Config {
        plantuml_server: plantuml_server.to_string(),
        plantuml_timeout: Duration::from_secs(5),
        api_key: api_key.map(str::to_string),
        ..Config::default()
    }
}

pub async fn test_state(api_key: Option<&str>) -> GatewayState {
    let server = spawn_plantuml().await;
    GatewayState::from_config(&test_config(&server, api_key)).unwrap()
}

pub fn request(id: i64, method: &str, params: Value) -> Value {
    json!({"jsonrpc": "2.0", "id": id, "method": method, "params": params})
}

pub fn notification(method: &str) -> Value {
    json!({"jsonrpc": "2.0", "method": method})
}

pub fn initialize(id: i64) -> Value {
    request(
        id,
        "initialize",
        json!({
            "protocolVersion": "2025-06-18",
            "capabilities": {},
            "clientInfo": {"name": "test-client", "version": "1.0"}
        }),
    )
}

pub fn post_request(uri: &str, session: Option<&str>, body: &Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(session) = session {
        builder = builder.header("mcp-session-id", session);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

pub async fn body_json(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// Read one complete SSE event (up to the blank line) from a streaming body.
pub async fn next_event(body: &mut Body) -> Option<String> {
    let mut buffer = String::new();
    loop {
        if let Some(end) = buffer.find("\n\n") {
            let event = buffer[..end].to_string();
            return Some(event);
        }
        let frame = tokio::time::timeout(Duration::from_secs(5), body.frame())
            .await
            .expect("timed out waiting for an SSE event")?;
        let frame = frame.unwrap();
        if let Ok(data) = frame.into_data() {
            buffer.push_str(std::str::from_utf8(&data).unwrap());
        }
    }
}

/// The `data:` payload of an SSE event.
pub fn event_data(event: &str) -> String {
    event
        .lines()
        .filter_map(|l| l.strip_prefix("data:"))
        .map(|l| l.trim_start())
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn event_name(event: &str) -> Option<&str> {
    event
        .lines()
        .find_map(|l| l.strip_prefix("event:"))
        .map(|l| l.trim())
}

//! Integration tests for the legacy SSE transport.

mod common;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use common::*;
use plantuml_mcp::{create_app, transport::Transport};
use serde_json::{json, Value};
use tower::ServiceExt; // for `oneshot`

async fn create_test_app(api_key: Option<&str>) -> Router {
    create_app(test_state(api_key).await, Transport::Sse)
}

/// Open a stream and return its body plus the announced POST URL.
async fn connect(app: &Router, uri: &str) -> (Body, String) {
    let response = app
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let mut body = response.into_body();
    let event = next_event(&mut body).await.unwrap();
    assert_eq!(event_name(&event), Some("endpoint"));
    (body, event_data(&event))
}

async fn send(app: &Router, endpoint: &str, message: Value) -> StatusCode {
    app.clone()
        .oneshot(post_request(endpoint, None, &message))
        .await
        .unwrap()
        .status()
}

/// Next `message` event, decoded.
async fn next_message(body: &mut Body) -> Value {
    loop {
        let event = next_event(body).await.expect("stream ended");
        if event_name(&event) == Some("message") {
            return serde_json::from_str(&event_data(&event)).unwrap();
        }
    }
}

#[tokio::test]
async fn test_endpoint_event_names_session() {
    let app = create_test_app(None).await;
    let (_body, endpoint) = connect(&app, "/sse").await;

    assert!(endpoint.starts_with("/messages?sessionId="));
    assert!(endpoint.len() > "/messages?sessionId=".len());
}

#[tokio::test]
async fn test_responses_arrive_on_stream() {
    let app = create_test_app(None).await;
    let (mut body, endpoint) = connect(&app, "/sse").await;

    assert_eq!(send(&app, &endpoint, initialize(1)).await, StatusCode::ACCEPTED);
    let response = next_message(&mut body).await;
    assert_eq!(response["id"], 1);
    assert!(response["result"]["capabilities"]["tools"].is_object());

    assert_eq!(
        send(&app, &endpoint, notification("notifications/initialized")).await,
        StatusCode::ACCEPTED
    );

    send(&app, &endpoint, request(2, "tools/list", json!({}))).await;
    let response = next_message(&mut body).await;
    assert_eq!(response["id"], 2);
    assert_eq!(response["result"]["tools"].as_array().unwrap().len(), 5);
}

#[tokio::test]
async fn test_requests_before_initialize_are_rejected() {
    let app = create_test_app(None).await;
    let (mut body, endpoint) = connect(&app, "/sse").await;

    send(&app, &endpoint, request(1, "tools/list", json!({}))).await;
    let response = next_message(&mut body).await;
    assert_eq!(response["id"], 1);
    assert_eq!(response["error"]["code"], -32002);

    send(&app, &endpoint, request(2, "ping", json!({}))).await;
    let response = next_message(&mut body).await;
    assert_eq!(response["id"], 2);
    assert_eq!(response["error"]["code"], -32002);

    send(&app, &endpoint, initialize(3)).await;
    next_message(&mut body).await;
    send(&app, &endpoint, request(4, "ping", json!({}))).await;
    let response = next_message(&mut body).await;
    assert_eq!(response["id"], 4);
    assert_eq!(response["result"], json!({}));
}

#[tokio::test]
async fn test_log_floor_controls_notifications() {
    let app = create_test_app(None).await;
    let (mut body, endpoint) = connect(&app, "/sse").await;
    send(&app, &endpoint, initialize(1)).await;
    next_message(&mut body).await;

    let encode = |id: i64| {
        request(
            id,
            "tools/call",
            json!({"name": "encode_plantuml", "arguments": {"plantuml_code": "A -> B"}}),
        )
    };

    // Count notifications until the response to `id` arrives.
    async fn notifications_before(body: &mut Body, id: i64) -> usize {
        let mut count = 0;
        loop {
            let message = next_message(body).await;
            if message["id"] == id {
                return count;
            }
            assert_eq!(message["method"], "notifications/message");
            count += 1;
        }
    }

    // No floor set yet: nothing is forwarded.
    send(&app, &endpoint, encode(2)).await;
    assert_eq!(notifications_before(&mut body, 2).await, 0);

    send(&app, &endpoint, request(3, "logging/setLevel", json!({"level": "debug"}))).await;
    next_message(&mut body).await;
    send(&app, &endpoint, encode(4)).await;
    assert_eq!(notifications_before(&mut body, 4).await, 2);

    send(&app, &endpoint, request(5, "logging/setLevel", json!({"level": "info"}))).await;
    next_message(&mut body).await;
    send(&app, &endpoint, encode(6)).await;
    assert_eq!(notifications_before(&mut body, 6).await, 1);
}

#[tokio::test]
async fn test_rebinding_replaces_previous_stream() {
    let app = create_test_app(None).await;
    let (mut first, endpoint) = connect(&app, "/sse").await;
    let session_id = endpoint
        .split("sessionId=")
        .nth(1)
        .unwrap()
        .to_string();

    let (mut second, second_endpoint) =
        connect(&app, &format!("/sse?sessionId={}", session_id)).await;
    assert_eq!(second_endpoint, endpoint);

    // The superseded stream ends.
    assert!(next_event(&mut first).await.is_none());

    // The session survives and answers on the new stream.
    assert_eq!(send(&app, &endpoint, initialize(1)).await, StatusCode::ACCEPTED);
    let response = next_message(&mut second).await;
    assert_eq!(response["id"], 1);
}

#[tokio::test]
async fn test_message_errors() {
    let app = create_test_app(None).await;

    assert_eq!(
        send(&app, "/messages", initialize(1)).await,
        StatusCode::BAD_REQUEST
    );
    assert_eq!(
        send(&app, "/messages?sessionId=unknown", initialize(1)).await,
        StatusCode::NOT_FOUND
    );
    let response = app
        .clone()
        .oneshot(Request::builder().uri("/sse?sessionId=unknown").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    // Malformed body: 400 on the POST, parse error on the stream.
    let (mut body, endpoint) = connect(&app, "/sse").await;
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(&endpoint)
                .body(Body::from("[1, 2"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let error = next_message(&mut body).await;
    assert_eq!(error["error"]["code"], -32700);
}

#[tokio::test]
async fn test_auth_required() {
    let app = create_test_app(Some("secret")).await;

    let response = app
        .clone()
        .oneshot(Request::builder().uri("/sse").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    assert_eq!(
        send(&app, "/messages?sessionId=anything", initialize(1)).await,
        StatusCode::UNAUTHORIZED
    );

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/sse")
                .header("x-api-key", "secret")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

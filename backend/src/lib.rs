//! PlantUML MCP gateway library.
//!
//! This module exposes the application builder for use in tests.

use axum::http::{header, HeaderName, HeaderValue, Method};
use axum::{
    routing::{get, post},
    Router,
};
use plantuml_mcp_types::SESSION_ID_HEADER;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub mod auth;
pub mod capabilities;
pub mod config;
pub mod error;
pub mod logging;
pub mod mcp;
pub mod plantuml;
pub mod state;
pub mod transport;

use state::GatewayState;
use transport::Transport;

/// Create the Axum application router for an HTTP transport.
///
/// This function is used both by the main server binary and by integration tests.
/// `Transport::Stdio` yields a router with only the health check.
pub fn create_app(state: GatewayState, transport: Transport) -> Router {
    let http = state.http().clone();

    let mcp_router = match transport {
        Transport::Sse => Router::new()
            .route(&http.sse_path, get(transport::sse::sse_connect))
            .route(&http.messages_path, post(transport::sse::sse_message)),
        Transport::Http => Router::new().route(
            &http.mcp_path,
            post(transport::streamable::mcp_post)
                .get(transport::streamable::mcp_get)
                .delete(transport::streamable::mcp_delete),
        ),
        Transport::Stdio => Router::new(),
    };

    Router::new()
        .route("/health", get(health))
        .merge(mcp_router)
        .layer({
            let cors = CorsLayer::new()
                .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
                .allow_headers([
                    header::CONTENT_TYPE,
                    header::AUTHORIZATION,
                    header::ACCEPT,
                    HeaderName::from_static("x-api-key"),
                    HeaderName::from_static(SESSION_ID_HEADER),
                ])
                .expose_headers([HeaderName::from_static(SESSION_ID_HEADER)]);

            // If no origins specified, allow any origin
            // Otherwise, restrict to the specified origins
            if http.allowed_origins.is_empty() {
                cors.allow_origin(Any)
            } else {
                let origins: Vec<HeaderValue> = http
                    .allowed_origins
                    .iter()
                    .filter_map(|o| o.parse::<HeaderValue>().ok())
                    .collect();
                cors.allow_origin(origins)
            }
        })
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint.
async fn health() -> &'static str {
    "ok"
}

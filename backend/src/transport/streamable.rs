//! Streamable HTTP transport.
//!
//! ## Endpoints
//!
//! - `POST /mcp` - send one JSON-RPC message; requests are answered inline
//! - `GET /mcp` - open an SSE stream for server-initiated messages
//! - `DELETE /mcp` - terminate a session
//!
//! Sessions are created by an `initialize` POST without `Mcp-Session-Id`;
//! the id comes back in that header and must accompany every later call.

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{
        sse::{KeepAlive, Sse},
        IntoResponse, Response,
    },
    Json,
};
use plantuml_mcp_types::{decode, Incoming, SESSION_ID_HEADER};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::framing::outbound_events;
use super::{invalid_origin, json_error, resolve_detached, unknown_session, validate_origin};
use crate::auth::authorize_http;
use crate::mcp::{ConnectionGuard, SessionKind};
use crate::state::GatewayState;

/// Extract session ID from headers.
fn get_session_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get(SESSION_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
}

fn is_initialize(message: &Incoming) -> bool {
    matches!(message, Incoming::Request(request) if request.method == "initialize")
}

fn with_session_header(mut response: Response, session_id: &str) -> Response {
    if let Ok(value) = HeaderValue::from_str(session_id) {
        response
            .headers_mut()
            .insert(HeaderName::from_static(SESSION_ID_HEADER), value);
    }
    response
}

/// Handle a JSON-RPC message (POST).
pub async fn mcp_post(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let credential = match authorize_http(state.auth(), &headers) {
        Ok(credential) => credential,
        Err(response) => return response,
    };
    if !validate_origin(&headers, &state.http().allowed_origins) {
        return invalid_origin();
    }

    let message = match decode(&body) {
        Ok(message) => message,
        Err(e) => {
            debug!("MCP: rejecting malformed POST body: {}", e);
            return (StatusCode::BAD_REQUEST, Json(e.to_response())).into_response();
        }
    };

    let sessions = state.sessions();
    let (session, created) = match get_session_id(&headers) {
        Some(id) => match sessions.lookup(&id).await {
            Ok(session) => (session, false),
            Err(e) => {
                warn!("MCP: POST for unknown session {}", id);
                return unknown_session(&e);
            }
        },
        None if is_initialize(&message) => (
            sessions.create(SessionKind::StreamableHttp, credential.clone()).await,
            true,
        ),
        None => {
            return json_error(
                StatusCode::BAD_REQUEST,
                "Mcp-Session-Id header required (only initialize may omit it)",
            );
        }
    };

    debug!("MCP: POST {} for session {}", message.method(), session.id());
    let admission = session.admit(message, credential.as_deref());
    match resolve_detached(admission).await {
        Some(response) => {
            if created && response.is_error() {
                sessions.discard(session.id()).await;
                return (StatusCode::OK, Json(response)).into_response();
            }
            with_session_header((StatusCode::OK, Json(response)).into_response(), session.id())
        }
        None => with_session_header(StatusCode::ACCEPTED.into_response(), session.id()),
    }
}

/// Open an SSE stream for server-initiated messages (GET).
///
/// A second GET for the same session replaces the first stream. Losing the
/// stream unbinds the session but leaves it alive until DELETE.
pub async fn mcp_get(State(state): State<GatewayState>, headers: HeaderMap) -> Response {
    if let Err(response) = authorize_http(state.auth(), &headers) {
        return response;
    }
    if !validate_origin(&headers, &state.http().allowed_origins) {
        return invalid_origin();
    }

    let Some(session_id) = get_session_id(&headers) else {
        return json_error(
            StatusCode::BAD_REQUEST,
            "Mcp-Session-Id header required for SSE stream",
        );
    };
    let sessions = state.sessions();
    let session = match sessions.lookup(&session_id).await {
        Ok(session) => session,
        Err(e) => return unknown_session(&e),
    };

    let connection = sessions.bind(&session);
    let guard = ConnectionGuard::new(sessions.clone(), &connection, false);
    info!("MCP: SSE stream opened for session {}", session_id);

    Sse::new(outbound_events(connection, guard))
        .keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
        .into_response()
}

/// Terminate a session (DELETE).
pub async fn mcp_delete(State(state): State<GatewayState>, headers: HeaderMap) -> Response {
    if let Err(response) = authorize_http(state.auth(), &headers) {
        return response;
    }
    if !validate_origin(&headers, &state.http().allowed_origins) {
        return invalid_origin();
    }

    let Some(session_id) = get_session_id(&headers) else {
        return json_error(StatusCode::BAD_REQUEST, "Mcp-Session-Id header required");
    };

    match state.sessions().close(&session_id).await {
        Ok(()) => {
            info!("MCP: Session {} terminated by client", session_id);
            StatusCode::NO_CONTENT.into_response()
        }
        Err(e) => unknown_session(&e),
    }
}

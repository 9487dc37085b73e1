//! Legacy SSE transport.
//!
//! ## Endpoints
//!
//! - `GET /sse` - open the event stream; the first event names the POST URL
//! - `POST /messages?sessionId=<id>` - submit one JSON-RPC message
//!
//! Responses are never returned on the POST; they arrive as `message`
//! events on the stream. Closing the stream closes the session.

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::{
        sse::{KeepAlive, Sse},
        IntoResponse, Response,
    },
};
use plantuml_mcp_types::decode;
use serde::Deserialize;
use std::convert::Infallible;
use std::time::Duration;
use tokio_stream::StreamExt;
use tracing::{debug, info};

use super::framing::{endpoint_event, outbound_events};
use super::{dispatch, invalid_origin, json_error, unknown_session, validate_origin};
use crate::auth::authorize_http;
use crate::mcp::{ConnectionGuard, SessionKind};
use crate::state::GatewayState;

#[derive(Debug, Default, Deserialize)]
pub struct SessionQuery {
    #[serde(rename = "sessionId")]
    pub session_id: Option<String>,
}

/// Open an SSE stream (GET).
///
/// Without `sessionId` a new session is allocated. With one, the existing
/// session is rebound to this stream and the previous stream ends.
pub async fn sse_connect(
    State(state): State<GatewayState>,
    Query(query): Query<SessionQuery>,
    headers: HeaderMap,
) -> Response {
    let credential = match authorize_http(state.auth(), &headers) {
        Ok(credential) => credential,
        Err(response) => return response,
    };
    if !validate_origin(&headers, &state.http().allowed_origins) {
        return invalid_origin();
    }

    let sessions = state.sessions();
    let session = match query.session_id {
        Some(id) => match sessions.lookup(&id).await {
            Ok(session) => session,
            Err(e) => return unknown_session(&e),
        },
        None => sessions.create(SessionKind::Sse, credential).await,
    };

    let connection = sessions.bind(&session);
    let guard = ConnectionGuard::new(sessions.clone(), &connection, true);
    let endpoint = format!(
        "{}?sessionId={}",
        state.http().messages_path,
        session.id()
    );
    info!("MCP: SSE stream opened for session {}", session.id());

    let stream = tokio_stream::once(Ok::<_, Infallible>(endpoint_event(&endpoint)))
        .chain(outbound_events(connection, guard));

    Sse::new(stream)
        .keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
        .into_response()
}

/// Submit one message for an SSE session (POST).
pub async fn sse_message(
    State(state): State<GatewayState>,
    Query(query): Query<SessionQuery>,
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

    let Some(session_id) = query.session_id else {
        return json_error(StatusCode::BAD_REQUEST, "sessionId query parameter required");
    };
    let session = match state.sessions().lookup(&session_id).await {
        Ok(session) => session,
        Err(e) => return unknown_session(&e),
    };

    let message = match decode(&body) {
        Ok(message) => message,
        Err(e) => {
            debug!("MCP: rejecting malformed message for {}: {}", session_id, e);
            session.deliver(e.to_response());
            return json_error(StatusCode::BAD_REQUEST, &e.to_string());
        }
    };

    debug!("MCP: SSE message {} for {}", message.method(), session_id);
    let admission = session.admit(message, credential.as_deref());
    dispatch(&session, admission);

    (StatusCode::ACCEPTED, "Accepted").into_response()
}

//! Transport adapters.
//!
//! Each adapter turns a physical channel into a stream of decoded messages
//! for a [`Session`], and writes back whatever the session delivers.
//!
//! - [`stdio`] - one implicit session over newline-delimited JSON
//! - [`sse`] - legacy two-endpoint transport (`GET /sse` + `POST /messages`)
//! - [`streamable`] - single-endpoint Streamable HTTP (`/mcp`)

pub mod framing;
pub mod sse;
pub mod stdio;
pub mod streamable;

use axum::{
    http::{header, HeaderMap, StatusCode, Uri},
    response::{IntoResponse, Response},
    Json,
};
use plantuml_mcp_types::{JsonRpcResponse, RequestId};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{error, warn};

use crate::error::{ProtocolError, SessionError};
use crate::mcp::{Admission, Session};

/// Which transport the process serves.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    /// Newline-delimited JSON over stdin/stdout
    #[default]
    Stdio,
    /// Legacy Server-Sent Events transport
    Sse,
    /// Streamable HTTP transport
    Http,
}

impl std::fmt::Display for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stdio => write!(f, "stdio"),
            Self::Sse => write!(f, "sse"),
            Self::Http => write!(f, "http"),
        }
    }
}

/// Validate the Origin header against DNS rebinding.
///
/// Requests without an Origin (non-browser clients) and localhost origins
/// are accepted. Anything else must be listed in `allowed_origins`.
pub fn validate_origin(headers: &HeaderMap, allowed_origins: &[String]) -> bool {
    let Some(origin) = headers.get(header::ORIGIN) else {
        return true;
    };
    let Ok(origin_str) = origin.to_str() else {
        warn!("Rejecting MCP request with unreadable origin");
        return false;
    };

    if is_loopback_origin(origin_str) {
        return true;
    }
    if allowed_origins.iter().any(|allowed| allowed == origin_str) {
        return true;
    }

    warn!("Rejecting MCP request from origin: {}", origin_str);
    false
}

/// True when the origin is `http(s)` and its host is exactly a loopback name.
fn is_loopback_origin(origin: &str) -> bool {
    let Ok(uri) = origin.parse::<Uri>() else {
        return false;
    };
    let secure_or_plain = matches!(uri.scheme_str(), Some("http") | Some("https"));
    secure_or_plain && matches!(uri.host(), Some("localhost" | "127.0.0.1" | "[::1]"))
}

pub(crate) fn json_error(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

pub(crate) fn invalid_origin() -> Response {
    json_error(StatusCode::FORBIDDEN, "Invalid origin")
}

/// 404 carrying a JSON-RPC error body, so clients can tell an expired
/// session from a missing route.
pub(crate) fn unknown_session(err: &SessionError) -> Response {
    let body = JsonRpcResponse::error(RequestId::Null, err.to_rpc_error());
    (StatusCode::NOT_FOUND, Json(body)).into_response()
}

/// Hand an admission result to the session's current binding.
///
/// Deferred work runs on its own task, so a slow tool never blocks the
/// reader that admitted it.
pub(crate) fn dispatch(session: &Arc<Session>, admission: Admission) {
    match admission {
        Admission::Reply(response) => {
            session.deliver(response);
        }
        Admission::Deferred(call) => {
            let session = session.clone();
            tokio::spawn(async move {
                call.run_into(|response| {
                    session.deliver(response);
                })
                .await;
            });
        }
        Admission::Silent => {}
    }
}

/// Resolve an admission for a caller that waits on the answer.
///
/// Deferred work still runs on its own task: if the caller goes away the
/// tool finishes anyway and its response is dropped.
pub(crate) async fn resolve_detached(admission: Admission) -> Option<JsonRpcResponse> {
    match admission {
        Admission::Deferred(call) => {
            let id = call.id().clone();
            match tokio::spawn(call.run()).await {
                Ok(response) => Some(response),
                Err(e) => {
                    error!("Tool call {} did not complete: {}", id, e);
                    let err = ProtocolError::Internal("Tool call did not complete".to_string());
                    Some(JsonRpcResponse::error(id, err.to_rpc_error()))
                }
            }
        }
        other => other.resolve().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn with_origin(origin: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::ORIGIN, HeaderValue::from_str(origin).unwrap());
        headers
    }

    #[test]
    fn test_missing_origin_is_accepted() {
        assert!(validate_origin(&HeaderMap::new(), &[]));
    }

    #[test]
    fn test_localhost_origins_are_accepted() {
        assert!(validate_origin(&with_origin("http://localhost:3000"), &[]));
        assert!(validate_origin(&with_origin("https://127.0.0.1"), &[]));
        assert!(validate_origin(&with_origin("http://[::1]:8080"), &[]));
    }

    #[test]
    fn test_lookalike_loopback_hosts_are_rejected() {
        assert!(!validate_origin(&with_origin("http://localhost.evil.example"), &[]));
        assert!(!validate_origin(&with_origin("http://127.0.0.1.nip.io"), &[]));
        assert!(!validate_origin(&with_origin("https://localhostevil.example:443"), &[]));
        assert!(!validate_origin(&with_origin("ftp://localhost"), &[]));
    }

    #[test]
    fn test_foreign_origin_needs_allow_list() {
        let headers = with_origin("https://evil.example.com");
        assert!(!validate_origin(&headers, &[]));
        assert!(validate_origin(
            &headers,
            &["https://evil.example.com".to_string()]
        ));
    }

    #[test]
    fn test_transport_parses_lowercase() {
        let transport: Transport = serde_json::from_str("\"sse\"").unwrap();
        assert_eq!(transport, Transport::Sse);
        assert_eq!(Transport::default(), Transport::Stdio);
        assert_eq!(Transport::Http.to_string(), "http");
    }
}

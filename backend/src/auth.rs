//! Bearer-token authorization shared by every transport.

use axum::{
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::{info, warn};

/// Authentication configuration.
///
/// With no API key the gateway runs in open mode and authorizes everything.
/// With a key, a credential must match it byte for byte.
#[derive(Clone, Debug, Default)]
pub struct AuthConfig {
    /// API key expected as `Authorization: Bearer <key>` or `X-API-Key: <key>`
    api_key: Option<String>,
    /// Whether authentication is enabled
    pub enabled: bool,
}

impl AuthConfig {
    pub fn new(api_key: Option<String>) -> Self {
        let api_key = api_key.filter(|k| !k.is_empty());
        let enabled = api_key.is_some();
        Self { api_key, enabled }
    }

    /// Open mode: no credential required.
    pub fn open() -> Self {
        Self::new(None)
    }

    /// Log the active mode. Open mode is a warning, not a silent default.
    pub fn log_mode(&self) {
        if self.enabled {
            info!("Authentication enabled - bearer API key required");
        } else {
            warn!("Authentication disabled - all MCP endpoints are public!");
        }
    }

    /// Verify API key
    pub fn verify_api_key(&self, key: &str) -> bool {
        self.api_key
            .as_ref()
            .map(|k| k.as_bytes() == key.as_bytes())
            .unwrap_or(false)
    }

    /// The single authorization decision used by every transport.
    pub fn authorize(&self, credential: Option<&str>) -> bool {
        if !self.enabled {
            return true;
        }
        credential.map(|c| self.verify_api_key(c)).unwrap_or(false)
    }
}

/// Extract the presented credential.
///
/// Checks `Authorization: Bearer <token>` first, then `X-API-Key`.
pub fn extract_credential(headers: &HeaderMap) -> Option<String> {
    if let Some(token) = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
    {
        return Some(token.to_string());
    }

    headers
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
}

/// Gate an HTTP request. Returns the presented credential on success.
#[allow(clippy::result_large_err)]
pub fn authorize_http(auth: &AuthConfig, headers: &HeaderMap) -> Result<Option<String>, Response> {
    let credential = extract_credential(headers);
    if auth.authorize(credential.as_deref()) {
        return Ok(credential);
    }

    warn!("MCP: Authentication failed - no valid API key provided");
    Err((
        StatusCode::UNAUTHORIZED,
        Json(json!({"error": "Authentication required. Provide Authorization: Bearer <api-key> or X-API-Key header"})),
    )
        .into_response())
}

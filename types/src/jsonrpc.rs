//! JSON-RPC 2.0 messages and the wire codec shared by every transport.
//!
//! Decoding is strict: a payload must be a single JSON object carrying
//! `"jsonrpc": "2.0"` and a non-empty `method`. Batches (arrays) and bare
//! scalars are rejected. Request ids are preserved exactly as sent, so a
//! client that sends `"id": 7` gets `"id": 7` back, never `"id": "7"`.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

/// JSON-RPC protocol version string.
pub const JSONRPC_VERSION: &str = "2.0";

/// Standard and MCP-specific JSON-RPC error codes.
pub mod error_codes {
    pub const PARSE_ERROR: i32 = -32700;
    pub const INVALID_REQUEST: i32 = -32600;
    pub const METHOD_NOT_FOUND: i32 = -32601;
    pub const INVALID_PARAMS: i32 = -32602;
    pub const INTERNAL_ERROR: i32 = -32603;
    /// Caller failed authorization.
    pub const UNAUTHORIZED: i32 = -32001;
    /// Request arrived before `initialize` completed.
    pub const SERVER_NOT_INITIALIZED: i32 = -32002;
    /// Session id did not resolve to a live session.
    pub const UNKNOWN_SESSION: i32 = -32003;
}

/// Client-chosen correlation token.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RequestId {
    Number(i64),
    /// Integer ids above `i64::MAX`.
    Unsigned(u64),
    String(String),
    /// Explicit `"id": null`. Distinct from an absent id (notification).
    Null,
}

impl RequestId {
    fn from_value(value: Value) -> Result<Self, String> {
        match value {
            Value::Number(n) => {
                if let Some(n) = n.as_i64() {
                    Ok(RequestId::Number(n))
                } else if let Some(n) = n.as_u64() {
                    Ok(RequestId::Unsigned(n))
                } else {
                    Err("id must be an integer, not a float".to_string())
                }
            }
            Value::String(s) => Ok(RequestId::String(s)),
            Value::Null => Ok(RequestId::Null),
            _ => Err("id must be a string, an integer or null".to_string()),
        }
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{}", n),
            Self::Unsigned(n) => write!(f, "{}", n),
            Self::String(s) => write!(f, "\"{}\"", s),
            Self::Null => write!(f, "null"),
        }
    }
}

impl From<i64> for RequestId {
    fn from(value: i64) -> Self {
        Self::Number(value)
    }
}

impl From<&str> for RequestId {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl Serialize for RequestId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            RequestId::Number(n) => serializer.serialize_i64(*n),
            RequestId::Unsigned(n) => serializer.serialize_u64(*n),
            RequestId::String(s) => serializer.serialize_str(s),
            RequestId::Null => serializer.serialize_none(),
        }
    }
}

impl<'de> Deserialize<'de> for RequestId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        RequestId::from_value(value).map_err(serde::de::Error::custom)
    }
}

/// A request that expects exactly one response.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub id: RequestId,
    pub method: String,
    pub params: Option<Value>,
}

/// A one-way message; never answered.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub method: String,
    pub params: Option<Value>,
}

/// A decoded inbound message.
#[derive(Debug, Clone, PartialEq)]
pub enum Incoming {
    Request(Request),
    Notification(Notification),
}

impl Incoming {
    pub fn method(&self) -> &str {
        match self {
            Self::Request(r) => &r.method,
            Self::Notification(n) => &n.method,
        }
    }
}

/// JSON-RPC 2.0 error object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }
}

/// JSON-RPC 2.0 response. Exactly one of `result` / `error` is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: RequestId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    /// Create a success response.
    pub fn success(id: RequestId, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    /// Create an error response.
    pub fn error(id: RequestId, error: JsonRpcError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: None,
            error: Some(error),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Server-to-client notification (e.g. `notifications/message`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcNotification {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcNotification {
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: method.into(),
            params,
        }
    }
}

/// Any message the gateway writes back to a client.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Outgoing {
    Response(JsonRpcResponse),
    Notification(JsonRpcNotification),
}

impl From<JsonRpcResponse> for Outgoing {
    fn from(value: JsonRpcResponse) -> Self {
        Self::Response(value)
    }
}

impl From<JsonRpcNotification> for Outgoing {
    fn from(value: JsonRpcNotification) -> Self {
        Self::Notification(value)
    }
}

/// Failure to turn raw bytes into an [`Incoming`] message.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DecodeError {
    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Invalid Request: {reason}")]
    Invalid {
        /// Id recovered from the malformed object, if any.
        id: Option<RequestId>,
        reason: String,
    },
}

impl DecodeError {
    fn invalid(id: Option<RequestId>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            id,
            reason: reason.into(),
        }
    }

    pub fn code(&self) -> i32 {
        match self {
            Self::Parse(_) => error_codes::PARSE_ERROR,
            Self::Invalid { .. } => error_codes::INVALID_REQUEST,
        }
    }

    /// The error response to send back. Unrecoverable ids become `null`.
    pub fn to_response(&self) -> JsonRpcResponse {
        let id = match self {
            Self::Parse(_) => RequestId::Null,
            Self::Invalid { id, .. } => id.clone().unwrap_or(RequestId::Null),
        };
        JsonRpcResponse::error(id, JsonRpcError::new(self.code(), self.to_string()))
    }
}

/// Decode one framed payload.
pub fn decode(raw: &[u8]) -> Result<Incoming, DecodeError> {
    let value: Value =
        serde_json::from_slice(raw).map_err(|e| DecodeError::Parse(e.to_string()))?;
    decode_value(value)
}

/// Decode an already-parsed JSON value.
pub fn decode_value(value: Value) -> Result<Incoming, DecodeError> {
    let mut object: Map<String, Value> = match value {
        Value::Object(object) => object,
        Value::Array(_) => {
            return Err(DecodeError::invalid(None, "batch requests are not supported"))
        }
        _ => return Err(DecodeError::invalid(None, "expected a JSON object")),
    };

    let id = match object.remove("id") {
        None => None,
        Some(raw) => Some(RequestId::from_value(raw).map_err(|e| DecodeError::invalid(None, e))?),
    };

    match object.get("jsonrpc") {
        Some(Value::String(v)) if v == JSONRPC_VERSION => {}
        _ => return Err(DecodeError::invalid(id, "jsonrpc must be \"2.0\"")),
    }

    let method = match object.remove("method") {
        Some(Value::String(m)) if !m.is_empty() => m,
        Some(_) => return Err(DecodeError::invalid(id, "method must be a non-empty string")),
        None => return Err(DecodeError::invalid(id, "missing method")),
    };

    let params = match object.remove("params") {
        None | Some(Value::Null) => None,
        Some(p @ (Value::Object(_) | Value::Array(_))) => Some(p),
        Some(_) => {
            return Err(DecodeError::invalid(
                id,
                "params must be an object or an array",
            ))
        }
    };

    Ok(match id {
        Some(id) => Incoming::Request(Request { id, method, params }),
        None => Incoming::Notification(Notification { method, params }),
    })
}

/// Encode an outbound message as a single-line JSON document.
pub fn encode(message: &Outgoing) -> Result<String, serde_json::Error> {
    serde_json::to_string(message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_request_and_preserves_id_type() {
        let msg = decode(br#"{"jsonrpc":"2.0","id":7,"method":"ping"}"#).unwrap();
        let Incoming::Request(req) = msg else {
            panic!("expected request");
        };
        assert_eq!(req.id, RequestId::Number(7));

        let response = JsonRpcResponse::success(req.id, json!({}));
        let encoded = encode(&response.into()).unwrap();
        assert!(encoded.contains(r#""id":7"#));

        let msg = decode(br#"{"jsonrpc":"2.0","id":18446744073709551615,"method":"ping"}"#).unwrap();
        let Incoming::Request(req) = msg else {
            panic!("expected request");
        };
        assert_eq!(req.id, RequestId::Unsigned(u64::MAX));
        let encoded = encode(&JsonRpcResponse::success(req.id, json!({})).into()).unwrap();
        assert!(encoded.contains(r#""id":18446744073709551615"#));

        let err = decode(br#"{"jsonrpc":"2.0","id":1.5,"method":"ping"}"#).unwrap_err();
        assert_eq!(err.to_response().id, RequestId::Null);

        let msg = decode(br#"{"jsonrpc":"2.0","id":"abc","method":"ping"}"#).unwrap();
        let Incoming::Request(req) = msg else {
            panic!("expected request");
        };
        let encoded = encode(&JsonRpcResponse::success(req.id, json!({})).into()).unwrap();
        assert!(encoded.contains(r#""id":"abc""#));
    }

    #[test]
    fn missing_id_is_notification() {
        let msg = decode(br#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#).unwrap();
        assert!(matches!(msg, Incoming::Notification(_)));
    }

    #[test]
    fn explicit_null_id_is_request() {
        let msg = decode(br#"{"jsonrpc":"2.0","id":null,"method":"ping"}"#).unwrap();
        assert!(matches!(msg, Incoming::Request(Request { id: RequestId::Null, .. })));
    }

    #[test]
    fn rejects_invalid_json() {
        let err = decode(b"{not json").unwrap_err();
        assert_eq!(err.code(), error_codes::PARSE_ERROR);
        assert_eq!(err.to_response().id, RequestId::Null);
    }

    #[test]
    fn rejects_non_objects() {
        for raw in [&b"[]"[..], b"42", b"\"ping\"", b"null"] {
            let err = decode(raw).unwrap_err();
            assert_eq!(err.code(), error_codes::INVALID_REQUEST);
        }
    }

    #[test]
    fn invalid_request_echoes_recoverable_id() {
        let err = decode(br#"{"jsonrpc":"2.0","id":3}"#).unwrap_err();
        assert_eq!(err.to_response().id, RequestId::Number(3));

        let err = decode(br#"{"jsonrpc":"1.0","id":"x","method":"ping"}"#).unwrap_err();
        assert_eq!(err.to_response().id, RequestId::String("x".into()));
    }

    #[test]
    fn rejects_float_ids_and_scalar_params() {
        assert!(decode(br#"{"jsonrpc":"2.0","id":1.5,"method":"ping"}"#).is_err());
        assert!(decode(br#"{"jsonrpc":"2.0","id":1,"method":"ping","params":3}"#).is_err());
    }

    #[test]
    fn error_response_omits_result() {
        let response = JsonRpcResponse::error(
            RequestId::Number(1),
            JsonRpcError::new(error_codes::METHOD_NOT_FOUND, "Method not found: nope"),
        );
        let value = serde_json::to_value(&response).unwrap();
        assert!(value.get("result").is_none());
        assert_eq!(value["error"]["code"], -32601);
    }
}

//! Error types shared by the protocol engine, the session manager and the
//! capability registry.

use plantuml_mcp_types::{error_codes, CapabilityKind, JsonRpcError, RequestId};

/// Protocol-level failures. Always answered on the JSON-RPC error channel.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProtocolError {
    #[error("Server not initialized: '{0}' received before initialize")]
    NotInitialized(String),

    #[error("Session already initialized")]
    AlreadyInitialized,

    #[error("Session is closing")]
    Closing,

    #[error("Request id {0} is already in flight")]
    DuplicateId(RequestId),

    #[error("Method not found: {0}")]
    MethodNotFound(String),

    #[error("Invalid params: {0}")]
    InvalidParams(String),

    #[error("Unauthorized: missing or invalid bearer credential")]
    Unauthorized,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ProtocolError {
    pub fn code(&self) -> i32 {
        match self {
            Self::NotInitialized(_) => error_codes::SERVER_NOT_INITIALIZED,
            Self::AlreadyInitialized | Self::Closing | Self::DuplicateId(_) => {
                error_codes::INVALID_REQUEST
            }
            Self::MethodNotFound(_) => error_codes::METHOD_NOT_FOUND,
            Self::InvalidParams(_) => error_codes::INVALID_PARAMS,
            Self::Unauthorized => error_codes::UNAUTHORIZED,
            Self::Internal(_) => error_codes::INTERNAL_ERROR,
        }
    }

    pub fn to_rpc_error(&self) -> JsonRpcError {
        JsonRpcError::new(self.code(), self.to_string())
    }
}

/// Session index failures.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SessionError {
    #[error("Unknown session: {0}")]
    UnknownSession(String),
}

impl SessionError {
    pub fn to_rpc_error(&self) -> JsonRpcError {
        JsonRpcError::new(error_codes::UNKNOWN_SESSION, self.to_string())
    }
}

/// Failures raised by capability handlers.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum InvocationError {
    #[error("Unknown {kind}: {name}")]
    Unknown { kind: CapabilityKind, name: String },

    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("{0}")]
    Failed(String),
}

impl InvocationError {
    pub fn unknown(kind: CapabilityKind, name: impl Into<String>) -> Self {
        Self::Unknown {
            kind,
            name: name.into(),
        }
    }
}

impl From<garde::Report> for InvocationError {
    fn from(report: garde::Report) -> Self {
        Self::InvalidArguments(report.to_string())
    }
}

impl From<serde_json::Error> for InvocationError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidArguments(err.to_string())
    }
}

/// Registry assembly failures.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RegistryError {
    #[error("Duplicate {kind} registered: {name}")]
    Duplicate { kind: CapabilityKind, name: String },
}

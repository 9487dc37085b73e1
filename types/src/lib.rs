//! Shared wire types for the PlantUML MCP gateway.
//!
//! This crate contains the JSON-RPC codec and the MCP payload types shared
//! between the protocol engine, the transports and the tests.

/// Default port for the HTTP transports.
pub const DEFAULT_PORT: u16 = 8765;

/// Header carrying the session id on the Streamable HTTP transport.
pub const SESSION_ID_HEADER: &str = "mcp-session-id";

pub mod capability;
pub mod jsonrpc;
pub mod logging;
pub mod mcp;

// Re-export commonly used types
pub use capability::{
    CapabilityKind, PromptArgument, PromptDescriptor, ResourceDescriptor, ToolDescriptor,
};
pub use jsonrpc::{
    decode, encode, error_codes, DecodeError, Incoming, JsonRpcError, JsonRpcNotification,
    JsonRpcResponse, Notification, Outgoing, Request, RequestId,
};
pub use logging::LogLevel;
pub use mcp::{CallToolResult, Content, ServerCapabilities};

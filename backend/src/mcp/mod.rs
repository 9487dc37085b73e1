//! MCP (Model Context Protocol) core, shared by every transport.
//!
//! ## Layers
//!
//! - [`registry`] - tools, prompts and resources, assembled once at startup
//! - [`engine`] - per-session protocol state machine and method dispatch
//! - [`session`] - session index, outbound bindings and their lifecycle
//! - [`outbound`] - delivery through the current binding and log forwarding
//!
//! Transports decode frames, hand them to [`Session::admit`] and write back
//! whatever comes out; they never look inside the messages themselves.

pub mod engine;
pub mod outbound;
pub mod registry;
pub mod session;

pub use engine::{
    negotiate_capabilities, Admission, DeferredCall, EngineContext, EngineSettings, EngineState,
    ProtocolEngine,
};
pub use outbound::{ConnectionId, LogFloor, Outbound, SessionLogger};
pub use registry::{
    CapabilityRegistry, PromptHandler, RegistryBuilder, StaticResource, ToolContext, ToolHandler,
};
pub use session::{
    Connection, ConnectionGuard, Session, SessionKind, SessionManager, SessionState,
};

//! Per-session MCP protocol engine.
//!
//! Admission (state check, authorization, method lookup, in-flight id
//! registration) is synchronous and happens in the order the transport
//! delivers messages. Only `tools/call` produces a deferred future; the
//! transport decides how to run it (inline for Streamable HTTP, spawned
//! for stdio and SSE).

use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use plantuml_mcp_types::{
    mcp::{
        negotiate_protocol_version, CallToolParams, CategoryCapability, GetPromptParams,
        Implementation, InitializeParams, InitializeResult, ListPromptsResult,
        ListResourcesResult, ListToolsResult, ReadResourceParams, SetLevelParams,
    },
    CallToolResult, Incoming, JsonRpcResponse, LogLevel, Notification, Request, RequestId,
    ServerCapabilities,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

use super::outbound::{LogFloor, Outbound, SessionLogger};
use super::registry::{CapabilityRegistry, ToolContext};
use crate::auth::AuthConfig;
use crate::config::{CapabilityToggles, Config};
use crate::error::{InvocationError, ProtocolError};

/// Engine settings shared by every session.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub capabilities: CapabilityToggles,
    pub handler_timeout: Duration,
    pub server_info: Implementation,
    pub instructions: Option<String>,
}

impl EngineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            capabilities: config.capabilities,
            handler_timeout: config.handler_timeout,
            ..Self::default()
        }
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            capabilities: CapabilityToggles::default(),
            handler_timeout: Duration::from_secs(120),
            server_info: Implementation {
                name: "plantuml-mcp".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
            instructions: Some(
                "Generate PlantUML diagrams. On a failed render, read structuredContent.error \
                 (message, line, problematic_code), fix that line and call the tool again."
                    .to_string(),
            ),
        }
    }
}

/// Everything an engine needs besides its own state.
pub struct EngineContext {
    pub registry: Arc<CapabilityRegistry>,
    pub auth: Arc<AuthConfig>,
    pub settings: EngineSettings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Negotiating,
    Ready,
    Draining,
    Terminated,
}

/// Capabilities advertised at `initialize`. A category is offered when its
/// toggle is on and (for tools, prompts and resources) the registry has
/// something in it.
pub fn negotiate_capabilities(
    toggles: &CapabilityToggles,
    registry: &CapabilityRegistry,
) -> ServerCapabilities {
    let category = |on: bool| on.then(CategoryCapability::default);
    ServerCapabilities {
        tools: category(toggles.tools && registry.has_tools()),
        prompts: category(toggles.prompts && registry.has_prompts()),
        resources: category(toggles.resources && registry.has_resources()),
        logging: toggles.logging.then(Map::new),
    }
}

/// Outcome of admitting one inbound message.
pub enum Admission {
    /// Answer right away.
    Reply(JsonRpcResponse),
    /// Handler work; resolves to exactly one response.
    Deferred(DeferredCall),
    /// A notification; nothing to send.
    Silent,
}

impl Admission {
    pub async fn resolve(self) -> Option<JsonRpcResponse> {
        match self {
            Self::Reply(response) => Some(response),
            Self::Deferred(call) => Some(call.run().await),
            Self::Silent => None,
        }
    }
}

impl std::fmt::Debug for Admission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Reply(response) => f.debug_tuple("Reply").field(response).finish(),
            Self::Deferred(_) => f.write_str("Deferred"),
            Self::Silent => f.write_str("Silent"),
        }
    }
}

/// A `tools/call` that has been admitted but not yet run.
///
/// The request id stays in flight until the response has been handed on,
/// so closing a session cannot cut off an answer that is being delivered.
pub struct DeferredCall {
    future: BoxFuture<'static, JsonRpcResponse>,
    in_flight: InFlightGuard,
}

impl DeferredCall {
    pub fn id(&self) -> &RequestId {
        &self.in_flight.id
    }

    /// Run the call and return its response.
    pub async fn run(self) -> JsonRpcResponse {
        let DeferredCall { future, in_flight } = self;
        let response = future.await;
        drop(in_flight);
        response
    }

    /// Run the call and pass the response to `deliver` before the request
    /// leaves the in-flight set.
    pub async fn run_into<F>(self, deliver: F)
    where
        F: FnOnce(JsonRpcResponse),
    {
        let DeferredCall { future, in_flight } = self;
        deliver(future.await);
        drop(in_flight);
    }
}

struct EngineInner {
    state: EngineState,
    capabilities: ServerCapabilities,
    client: Option<Implementation>,
    in_flight: HashSet<RequestId>,
}

pub struct ProtocolEngine {
    session_id: String,
    context: Arc<EngineContext>,
    inner: Mutex<EngineInner>,
    log_floor: Arc<LogFloor>,
    outbound: Outbound,
    drained: Notify,
}

impl ProtocolEngine {
    pub fn new(session_id: String, context: Arc<EngineContext>, outbound: Outbound) -> Arc<Self> {
        Arc::new(Self {
            session_id,
            context,
            inner: Mutex::new(EngineInner {
                state: EngineState::Negotiating,
                capabilities: ServerCapabilities::default(),
                client: None,
                in_flight: HashSet::new(),
            }),
            log_floor: Arc::new(LogFloor::new()),
            outbound,
            drained: Notify::new(),
        })
    }

    pub fn state(&self) -> EngineState {
        self.inner.lock().state
    }

    /// Capabilities negotiated at `initialize` (empty before).
    pub fn capabilities(&self) -> ServerCapabilities {
        self.inner.lock().capabilities.clone()
    }

    pub fn client_info(&self) -> Option<Implementation> {
        self.inner.lock().client.clone()
    }

    pub fn log_floor(&self) -> Option<LogLevel> {
        self.log_floor.get()
    }

    pub fn in_flight(&self) -> usize {
        self.inner.lock().in_flight.len()
    }

    /// Logger forwarding to this session's client.
    pub fn logger(&self, name: Option<&str>) -> SessionLogger {
        SessionLogger::new(
            name.map(str::to_string),
            self.log_floor.clone(),
            self.outbound.clone(),
        )
    }

    pub fn admit(self: &Arc<Self>, message: Incoming, credential: Option<&str>) -> Admission {
        match message {
            Incoming::Notification(notification) => {
                self.on_notification(notification, credential);
                Admission::Silent
            }
            Incoming::Request(request) => {
                let id = request.id.clone();
                match self.admit_request(request, credential) {
                    Ok(admission) => admission,
                    Err(err) => {
                        debug!("Session {}: rejecting request {}: {}", self.session_id, id, err);
                        Admission::Reply(JsonRpcResponse::error(id, err.to_rpc_error()))
                    }
                }
            }
        }
    }

    fn admit_request(
        self: &Arc<Self>,
        request: Request,
        credential: Option<&str>,
    ) -> Result<Admission, ProtocolError> {
        let capabilities = {
            let mut inner = self.inner.lock();
            match inner.state {
                EngineState::Negotiating if request.method == "initialize" => {
                    self.authorize(credential)?;
                    let result = self.initialize(&mut inner, request.params)?;
                    return Ok(Admission::Reply(JsonRpcResponse::success(request.id, result)));
                }
                EngineState::Negotiating => {
                    return Err(ProtocolError::NotInitialized(request.method));
                }
                EngineState::Draining | EngineState::Terminated => {
                    return Err(ProtocolError::Closing);
                }
                EngineState::Ready => {}
            }
            if request.method == "ping" {
                return Ok(Admission::Reply(JsonRpcResponse::success(request.id, json!({}))));
            }
            self.authorize(credential)?;
            if inner.in_flight.contains(&request.id) {
                return Err(ProtocolError::DuplicateId(request.id));
            }
            inner.capabilities.clone()
        };

        self.route(request, &capabilities)
    }

    fn authorize(&self, credential: Option<&str>) -> Result<(), ProtocolError> {
        if self.context.auth.authorize(credential) {
            Ok(())
        } else {
            warn!("Session {}: unauthorized request", self.session_id);
            Err(ProtocolError::Unauthorized)
        }
    }

    fn initialize(
        &self,
        inner: &mut EngineInner,
        params: Option<Value>,
    ) -> Result<Value, ProtocolError> {
        let params: InitializeParams = parse_params(params)?;
        let protocol_version = negotiate_protocol_version(params.protocol_version.as_deref());
        let capabilities =
            negotiate_capabilities(&self.context.settings.capabilities, &self.context.registry);

        inner.state = EngineState::Ready;
        inner.capabilities = capabilities.clone();
        inner.client = params.client_info.clone();

        match &params.client_info {
            Some(client) => info!(
                "Session {} initialized by {} {} (protocol {})",
                self.session_id, client.name, client.version, protocol_version
            ),
            None => info!(
                "Session {} initialized (protocol {})",
                self.session_id, protocol_version
            ),
        }

        to_value(InitializeResult {
            protocol_version: protocol_version.to_string(),
            capabilities,
            server_info: self.context.settings.server_info.clone(),
            instructions: self.context.settings.instructions.clone(),
        })
    }

    fn route(
        self: &Arc<Self>,
        request: Request,
        capabilities: &ServerCapabilities,
    ) -> Result<Admission, ProtocolError> {
        let registry = &self.context.registry;
        let Request { id, method, params } = request;

        let result = match method.as_str() {
            "initialize" => return Err(ProtocolError::AlreadyInitialized),

            "tools/list" if capabilities.has_tools() => to_value(ListToolsResult {
                tools: registry.list_tools(),
            })?,
            "tools/call" if capabilities.has_tools() => {
                let params: CallToolParams = parse_params(params)?;
                if !registry.has_tool(&params.name) {
                    return Err(ProtocolError::InvalidParams(format!(
                        "Unknown tool: {}",
                        params.name
                    )));
                }
                return self.defer_tool_call(id, params);
            }

            "prompts/list" if capabilities.has_prompts() => to_value(ListPromptsResult {
                prompts: registry.list_prompts(),
            })?,
            "prompts/get" if capabilities.has_prompts() => {
                let params: GetPromptParams = parse_params(params)?;
                let result = registry
                    .get_prompt(&params.name, &params.arguments)
                    .map_err(invocation_to_protocol)?;
                to_value(result)?
            }

            "resources/list" if capabilities.has_resources() => to_value(ListResourcesResult {
                resources: registry.list_resources(),
            })?,
            "resources/read" if capabilities.has_resources() => {
                let params: ReadResourceParams = parse_params(params)?;
                let result = registry
                    .read_resource(&params.uri)
                    .map_err(invocation_to_protocol)?;
                to_value(result)?
            }

            "logging/setLevel" if capabilities.has_logging() => {
                let params: SetLevelParams = parse_params(params)?;
                self.set_log_level(params.level);
                json!({})
            }

            _ => return Err(ProtocolError::MethodNotFound(method)),
        };

        Ok(Admission::Reply(JsonRpcResponse::success(id, result)))
    }

    fn defer_tool_call(
        self: &Arc<Self>,
        id: RequestId,
        params: CallToolParams,
    ) -> Result<Admission, ProtocolError> {
        let in_flight = self.register(id.clone())?;
        let engine = self.clone();

        let future = async move {
            let name = params.name.clone();
            let outcome = AssertUnwindSafe(engine.call_tool(params))
                .catch_unwind()
                .await;
            match outcome {
                Ok(Ok(result)) => match serde_json::to_value(result) {
                    Ok(value) => JsonRpcResponse::success(id, value),
                    Err(e) => JsonRpcResponse::error(
                        id,
                        ProtocolError::Internal(e.to_string()).to_rpc_error(),
                    ),
                },
                Ok(Err(err)) => JsonRpcResponse::error(id, err.to_rpc_error()),
                Err(_) => {
                    error!("Session {}: tool '{}' panicked", engine.session_id, name);
                    JsonRpcResponse::error(
                        id,
                        ProtocolError::Internal(format!("Tool '{}' failed unexpectedly", name))
                            .to_rpc_error(),
                    )
                }
            }
        };

        Ok(Admission::Deferred(DeferredCall {
            future: future.boxed(),
            in_flight,
        }))
    }

    async fn call_tool(&self, params: CallToolParams) -> Result<CallToolResult, ProtocolError> {
        let ctx = ToolContext {
            session_id: self.session_id.clone(),
            logger: self.logger(Some(params.name.as_str())),
        };
        let arguments = params.arguments.unwrap_or_else(|| json!({}));
        let timeout = self.context.settings.handler_timeout;

        debug!("Session {}: calling tool '{}'", self.session_id, params.name);
        let invocation = self.context.registry.invoke_tool(&params.name, arguments, ctx);

        match tokio::time::timeout(timeout, invocation).await {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(err @ InvocationError::Unknown { .. })) => {
                Err(ProtocolError::InvalidParams(err.to_string()))
            }
            Ok(Err(err)) => Ok(failure_result(err.to_string())),
            Err(_) => {
                warn!(
                    "Session {}: tool '{}' timed out after {:?}",
                    self.session_id, params.name, timeout
                );
                Ok(failure_result(format!(
                    "Tool '{}' timed out after {}s",
                    params.name,
                    timeout.as_secs()
                )))
            }
        }
    }

    fn register(self: &Arc<Self>, id: RequestId) -> Result<InFlightGuard, ProtocolError> {
        let mut inner = self.inner.lock();
        if inner.state != EngineState::Ready {
            return Err(ProtocolError::Closing);
        }
        if !inner.in_flight.insert(id.clone()) {
            return Err(ProtocolError::DuplicateId(id));
        }
        Ok(InFlightGuard {
            engine: self.clone(),
            id,
        })
    }

    fn on_notification(&self, notification: Notification, credential: Option<&str>) {
        match notification.method.as_str() {
            "notifications/initialized" | "initialized" => {
                debug!("Session {}: client initialized", self.session_id);
            }
            "notifications/cancelled" => {
                debug!("Session {}: cancellation acknowledged", self.session_id);
            }
            "logging/setLevel" => {
                let ready = {
                    let inner = self.inner.lock();
                    inner.state == EngineState::Ready && inner.capabilities.has_logging()
                };
                if !ready || self.authorize(credential).is_err() {
                    debug!("Session {}: ignoring logging/setLevel notification", self.session_id);
                    return;
                }
                match parse_params::<SetLevelParams>(notification.params) {
                    Ok(params) => self.set_log_level(params.level),
                    Err(e) => warn!("Session {}: {}", self.session_id, e),
                }
            }
            other => debug!("Session {}: ignoring notification {}", self.session_id, other),
        }
    }

    fn set_log_level(&self, level: LogLevel) {
        self.log_floor.set(level);
        info!("Session {}: client log level set to {}", self.session_id, level);
    }

    /// Stop admitting requests. Returns `false` if already draining.
    pub fn begin_drain(&self) -> bool {
        let mut inner = self.inner.lock();
        match inner.state {
            EngineState::Negotiating | EngineState::Ready => {
                inner.state = EngineState::Draining;
                true
            }
            EngineState::Draining | EngineState::Terminated => false,
        }
    }

    /// Wait until no deferred work is in flight.
    pub async fn drained(&self) {
        loop {
            let notified = self.drained.notified();
            if self.inner.lock().in_flight.is_empty() {
                return;
            }
            notified.await;
        }
    }

    pub fn terminate(&self) {
        self.inner.lock().state = EngineState::Terminated;
    }
}

/// Removes a request id from the in-flight set when its future completes
/// or is dropped.
struct InFlightGuard {
    engine: Arc<ProtocolEngine>,
    id: RequestId,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let mut inner = self.engine.inner.lock();
        inner.in_flight.remove(&self.id);
        if inner.in_flight.is_empty() {
            self.engine.drained.notify_waiters();
        }
    }
}

fn parse_params<T: DeserializeOwned>(params: Option<Value>) -> Result<T, ProtocolError> {
    let params = match params {
        None => Value::Object(Map::new()),
        Some(Value::Array(_)) => {
            return Err(ProtocolError::InvalidParams(
                "params must be an object".to_string(),
            ))
        }
        Some(params) => params,
    };
    serde_json::from_value(params).map_err(|e| ProtocolError::InvalidParams(e.to_string()))
}

fn to_value<T: Serialize>(value: T) -> Result<Value, ProtocolError> {
    serde_json::to_value(value).map_err(|e| ProtocolError::Internal(e.to_string()))
}

fn invocation_to_protocol(err: InvocationError) -> ProtocolError {
    match err {
        InvocationError::Unknown { .. } => ProtocolError::InvalidParams(err.to_string()),
        InvocationError::InvalidArguments(msg) => ProtocolError::InvalidParams(msg),
        InvocationError::Failed(msg) => ProtocolError::Internal(msg),
    }
}

fn failure_result(message: String) -> CallToolResult {
    CallToolResult::failure(
        message.clone(),
        json!({
            "success": false,
            "error": {"message": message},
        }),
    )
}

//! MCP session management.
//!
//! Sessions are identified by random UUIDs and indexed for concurrent
//! lookup. Each session owns one protocol engine and at most one live
//! outbound binding.

use parking_lot::Mutex;
use plantuml_mcp_types::{Incoming, Outgoing};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info};
use uuid::Uuid;

use super::engine::{Admission, EngineContext, EngineState, ProtocolEngine};
use super::outbound::{ConnectionId, Outbound};
use crate::error::SessionError;

/// Which adapter a session arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionKind {
    Stdio,
    Sse,
    StreamableHttp,
}

impl std::fmt::Display for SessionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stdio => write!(f, "stdio"),
            Self::Sse => write!(f, "sse"),
            Self::StreamableHttp => write!(f, "streamable-http"),
        }
    }
}

/// Externally visible lifecycle of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Initializing,
    Active,
    Closing,
    Closed,
}

impl From<EngineState> for SessionState {
    fn from(state: EngineState) -> Self {
        match state {
            EngineState::Negotiating => Self::Initializing,
            EngineState::Ready => Self::Active,
            EngineState::Draining => Self::Closing,
            EngineState::Terminated => Self::Closed,
        }
    }
}

/// An MCP session.
pub struct Session {
    id: String,
    kind: SessionKind,
    /// Credential presented when the session was created.
    credential: Option<String>,
    last_activity: Mutex<Instant>,
    engine: Arc<ProtocolEngine>,
    outbound: Outbound,
}

impl Session {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> SessionKind {
        self.kind
    }

    pub fn credential(&self) -> Option<&str> {
        self.credential.as_deref()
    }

    pub fn engine(&self) -> &Arc<ProtocolEngine> {
        &self.engine
    }

    pub fn state(&self) -> SessionState {
        self.engine.state().into()
    }

    /// Admit one inbound message on this session's engine.
    pub fn admit(&self, message: Incoming, credential: Option<&str>) -> Admission {
        *self.last_activity.lock() = Instant::now();
        self.engine.admit(message, credential)
    }

    /// Send through the current binding. Returns `false` when discarded.
    pub fn deliver(&self, message: impl Into<Outgoing>) -> bool {
        let delivered = self.outbound.send(message);
        if !delivered {
            debug!("Session {}: message undeliverable, discarded", self.id);
        }
        delivered
    }

    pub fn is_bound(&self) -> bool {
        self.outbound.is_bound()
    }

    pub fn connection_id(&self) -> Option<ConnectionId> {
        self.outbound.connection_id()
    }

    pub fn idle_for(&self) -> Duration {
        self.last_activity.lock().elapsed()
    }
}

/// A bound physical connection: the receiving end of a session's outbound
/// channel.
pub struct Connection {
    pub session: Arc<Session>,
    pub connection_id: ConnectionId,
    pub receiver: mpsc::UnboundedReceiver<Outgoing>,
}

/// Manager for MCP sessions.
#[derive(Clone)]
pub struct SessionManager {
    sessions: Arc<RwLock<HashMap<String, Arc<Session>>>>,
    context: Arc<EngineContext>,
    next_connection: Arc<AtomicU64>,
}

impl SessionManager {
    /// Create a new session manager.
    pub fn new(context: Arc<EngineContext>) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            context,
            next_connection: Arc::new(AtomicU64::new(1)),
        }
    }

    pub fn context(&self) -> &Arc<EngineContext> {
        &self.context
    }

    /// Create a new session and index it.
    pub async fn create(&self, kind: SessionKind, credential: Option<String>) -> Arc<Session> {
        let id = Uuid::new_v4().to_string();
        let outbound = Outbound::new();
        let engine = ProtocolEngine::new(id.clone(), self.context.clone(), outbound.clone());
        let now = Instant::now();
        let session = Arc::new(Session {
            id: id.clone(),
            kind,
            credential,
            last_activity: Mutex::new(now),
            engine,
            outbound,
        });

        let mut sessions = self.sessions.write().await;
        sessions.insert(id.clone(), session.clone());
        info!("Created MCP session: {} ({})", id, kind);
        session
    }

    /// Resolve a client-supplied session id. Never creates.
    pub async fn lookup(&self, id: &str) -> Result<Arc<Session>, SessionError> {
        let sessions = self.sessions.read().await;
        sessions
            .get(id)
            .cloned()
            .ok_or_else(|| SessionError::UnknownSession(id.to_string()))
    }

    /// Check if a session exists.
    pub async fn session_exists(&self, id: &str) -> bool {
        let sessions = self.sessions.read().await;
        sessions.contains_key(id)
    }

    /// Attach a new connection, replacing (and thereby closing) any previous one.
    pub fn bind(&self, session: &Arc<Session>) -> Connection {
        let connection_id = self.next_connection.fetch_add(1, Ordering::Relaxed);
        let (receiver, previous) = session.outbound.bind(connection_id);
        match previous {
            Some(previous) => info!(
                "MCP session {}: connection {} replaces {}",
                session.id, connection_id, previous
            ),
            None => debug!("MCP session {}: bound connection {}", session.id, connection_id),
        }
        Connection {
            session: session.clone(),
            connection_id,
            receiver,
        }
    }

    /// A connection went away.
    ///
    /// Stale connections (already superseded by a rebind) are ignored. When
    /// `close_session` is set, losing the current binding also closes the
    /// session.
    pub async fn release(&self, session_id: &str, connection_id: ConnectionId, close_session: bool) {
        let Ok(session) = self.lookup(session_id).await else {
            return;
        };
        if !session.outbound.release(connection_id) {
            debug!(
                "MCP session {}: stale connection {} released",
                session_id, connection_id
            );
            return;
        }
        debug!("MCP session {}: connection {} released", session_id, connection_id);
        if close_session {
            let _ = self.close(session_id).await;
        }
    }

    /// Drain in-flight work, then terminate and forget the session.
    pub async fn close(&self, id: &str) -> Result<(), SessionError> {
        let session = self.lookup(id).await?;
        if !session.engine.begin_drain() {
            debug!("MCP session {} already closing", id);
            return Ok(());
        }
        debug!(
            "MCP session {} draining ({} in flight)",
            id,
            session.engine.in_flight()
        );

        session.engine.drained().await;
        session.outbound.unbind();
        session.engine.terminate();

        let mut sessions = self.sessions.write().await;
        sessions.remove(id);
        info!("Terminated MCP session: {}", id);
        Ok(())
    }

    /// Drop a session that never got past a failed `initialize`.
    pub async fn discard(&self, id: &str) {
        let mut sessions = self.sessions.write().await;
        if let Some(session) = sessions.remove(id) {
            session.engine.terminate();
            debug!("Discarded MCP session: {}", id);
        }
    }

    /// Get the number of active sessions.
    pub async fn session_count(&self) -> usize {
        let sessions = self.sessions.read().await;
        sessions.len()
    }

    /// Close HTTP sessions with no binding that have been idle too long.
    /// The stdio session is never collected.
    pub async fn cleanup_stale(&self, max_idle: Duration) -> usize {
        let stale: Vec<String> = {
            let sessions = self.sessions.read().await;
            sessions
                .values()
                .filter(|s| s.kind != SessionKind::Stdio)
                .filter(|s| !s.is_bound() && s.idle_for() >= max_idle)
                .map(|s| s.id.clone())
                .collect()
        };

        let mut closed = 0;
        for id in stale {
            if self.close(&id).await.is_ok() {
                closed += 1;
            }
        }
        if closed > 0 {
            info!("Cleaned up {} stale MCP sessions", closed);
        }
        closed
    }
}

/// Releases a connection when the stream holding it is dropped.
pub struct ConnectionGuard {
    manager: SessionManager,
    session_id: String,
    connection_id: ConnectionId,
    close_session: bool,
}

impl ConnectionGuard {
    pub fn new(manager: SessionManager, connection: &Connection, close_session: bool) -> Self {
        Self {
            manager,
            session_id: connection.session.id.clone(),
            connection_id: connection.connection_id,
            close_session,
        }
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        let manager = self.manager.clone();
        let session_id = std::mem::take(&mut self.session_id);
        let connection_id = self.connection_id;
        let close_session = self.close_session;
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                manager.release(&session_id, connection_id, close_session).await;
            });
        }
    }
}

//! Server-to-client delivery.
//!
//! Each session has at most one live binding (an open stream or stdout).
//! Messages are always sent through whatever binding is current at send
//! time, so a handler that finishes after the client reconnected still
//! reaches the new stream. With no binding the message is discarded.

use parking_lot::Mutex;
use plantuml_mcp_types::{
    mcp::LoggingMessageParams, JsonRpcNotification, LogLevel, Outgoing,
};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

/// Identifies one physical connection bound to a session.
pub type ConnectionId = u64;

struct Binding {
    connection_id: ConnectionId,
    tx: mpsc::UnboundedSender<Outgoing>,
}

/// Replaceable binding slot for one session.
#[derive(Clone, Default)]
pub struct Outbound {
    slot: Arc<Mutex<Option<Binding>>>,
}

impl Outbound {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a new binding. The previous one (if any) is dropped, which
    /// ends its stream. Returns the superseded connection id.
    pub fn bind(
        &self,
        connection_id: ConnectionId,
    ) -> (mpsc::UnboundedReceiver<Outgoing>, Option<ConnectionId>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let previous = self.slot.lock().replace(Binding { connection_id, tx });
        (rx, previous.map(|b| b.connection_id))
    }

    /// Remove the binding only if `connection_id` is still current.
    pub fn release(&self, connection_id: ConnectionId) -> bool {
        let mut slot = self.slot.lock();
        if slot.as_ref().map(|b| b.connection_id) == Some(connection_id) {
            *slot = None;
            true
        } else {
            false
        }
    }

    /// Remove whatever binding is current.
    pub fn unbind(&self) {
        self.slot.lock().take();
    }

    pub fn connection_id(&self) -> Option<ConnectionId> {
        self.slot.lock().as_ref().map(|b| b.connection_id)
    }

    pub fn is_bound(&self) -> bool {
        self.slot.lock().is_some()
    }

    /// Send through the current binding. Returns `false` when discarded.
    pub fn send(&self, message: impl Into<Outgoing>) -> bool {
        let message = message.into();
        let slot = self.slot.lock();
        match slot.as_ref() {
            Some(binding) => binding.tx.send(message).is_ok(),
            None => {
                debug!("No live binding, discarding outbound message");
                false
            }
        }
    }
}

const UNSET: u8 = u8::MAX;

/// Per-session verbosity floor for forwarded log events. Unset until the
/// client calls `logging/setLevel`.
#[derive(Debug)]
pub struct LogFloor(AtomicU8);

impl LogFloor {
    pub fn new() -> Self {
        Self(AtomicU8::new(UNSET))
    }

    pub fn get(&self) -> Option<LogLevel> {
        LogLevel::ALL
            .get(self.0.load(Ordering::Acquire) as usize)
            .copied()
    }

    pub fn set(&self, level: LogLevel) {
        self.0.store(level.severity_index(), Ordering::Release);
    }
}

impl Default for LogFloor {
    fn default() -> Self {
        Self::new()
    }
}

/// Forwards handler log events to the client as `notifications/message`.
#[derive(Clone)]
pub struct SessionLogger {
    logger: Option<String>,
    floor: Arc<LogFloor>,
    outbound: Outbound,
}

impl SessionLogger {
    pub fn new(logger: Option<String>, floor: Arc<LogFloor>, outbound: Outbound) -> Self {
        Self {
            logger,
            floor,
            outbound,
        }
    }

    /// Forward one event. Returns whether it was sent.
    pub fn log(&self, level: LogLevel, message: impl Into<String>, details: Option<Value>) -> bool {
        let Some(floor) = self.floor.get() else {
            return false;
        };
        if !level.passes(floor) {
            return false;
        }

        let message = message.into();
        let data = match details {
            Some(details) => json!({"message": message, "details": details}),
            None => Value::String(message),
        };
        let params = LoggingMessageParams {
            level,
            logger: self.logger.clone(),
            data,
        };
        let Ok(params) = serde_json::to_value(params) else {
            return false;
        };
        self.outbound
            .send(JsonRpcNotification::new("notifications/message", Some(params)))
    }

    pub fn debug(&self, message: impl Into<String>) -> bool {
        self.log(LogLevel::Debug, message, None)
    }

    pub fn info(&self, message: impl Into<String>) -> bool {
        self.log(LogLevel::Info, message, None)
    }

    pub fn warning(&self, message: impl Into<String>) -> bool {
        self.log(LogLevel::Warning, message, None)
    }

    pub fn error(&self, message: impl Into<String>, details: Option<Value>) -> bool {
        self.log(LogLevel::Error, message, details)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plantuml_mcp_types::{JsonRpcResponse, RequestId};

    #[test]
    fn rebinding_ends_previous_stream() {
        let outbound = Outbound::new();
        let (mut first, previous) = outbound.bind(1);
        assert_eq!(previous, None);

        let (mut second, previous) = outbound.bind(2);
        assert_eq!(previous, Some(1));

        // The old sender is gone, so the old receiver is closed and empty.
        assert!(first.try_recv().is_err());
        assert!(first.is_closed());

        assert!(outbound.send(JsonRpcResponse::success(RequestId::Number(1), json!({}))));
        assert!(second.try_recv().is_ok());
    }

    #[test]
    fn stale_release_keeps_new_binding() {
        let outbound = Outbound::new();
        let (_first, _) = outbound.bind(1);
        let (_second, _) = outbound.bind(2);

        assert!(!outbound.release(1));
        assert_eq!(outbound.connection_id(), Some(2));
        assert!(outbound.release(2));
        assert!(!outbound.is_bound());
    }

    #[test]
    fn unbound_send_is_discarded() {
        let outbound = Outbound::new();
        assert!(!outbound.send(JsonRpcResponse::success(RequestId::Null, json!({}))));
    }

    #[test]
    fn logger_respects_floor() {
        let outbound = Outbound::new();
        let (mut rx, _) = outbound.bind(1);
        let floor = Arc::new(LogFloor::new());
        let logger = SessionLogger::new(Some("test".into()), floor.clone(), outbound);

        // Unset floor forwards nothing.
        assert!(!logger.error("boom", None));

        floor.set(LogLevel::Info);
        assert!(!logger.debug("hidden"));
        assert!(logger.info("shown"));
        assert!(logger.warning("shown too"));

        let Outgoing::Notification(n) = rx.try_recv().unwrap() else {
            panic!("expected notification");
        };
        assert_eq!(n.method, "notifications/message");
        let params = n.params.unwrap();
        assert_eq!(params["level"], "info");
        assert_eq!(params["logger"], "test");
        assert_eq!(params["data"], "shown");
    }

    #[test]
    fn floor_round_trips() {
        let floor = LogFloor::new();
        assert_eq!(floor.get(), None);
        floor.set(LogLevel::Debug);
        assert_eq!(floor.get(), Some(LogLevel::Debug));
        floor.set(LogLevel::Emergency);
        assert_eq!(floor.get(), Some(LogLevel::Emergency));
    }
}

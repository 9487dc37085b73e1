//! Wire framing for outbound messages: JSON lines and SSE events.

use axum::response::sse::Event;
use futures::stream::Stream;
use plantuml_mcp_types::{encode, Outgoing};
use std::convert::Infallible;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::StreamExt;
use tracing::error;

use crate::mcp::{Connection, ConnectionGuard};

/// One message as a single line of JSON, without the trailing newline.
pub fn encode_line(message: &Outgoing) -> Option<String> {
    match encode(message) {
        Ok(line) => Some(line),
        Err(e) => {
            error!("Failed to encode outbound message: {}", e);
            None
        }
    }
}

/// A JSON-RPC message as an SSE `message` event.
pub fn message_event(message: &Outgoing) -> Option<Event> {
    encode_line(message).map(|data| Event::default().event("message").data(data))
}

/// The legacy transport's first event: where to POST messages.
pub fn endpoint_event(url: &str) -> Event {
    Event::default().event("endpoint").data(url)
}

/// Turn a bound connection into an SSE event stream.
///
/// The stream ends when the binding is replaced or the session terminates.
/// The guard lives inside the stream, so dropping the response (client
/// disconnect) releases the connection.
pub fn outbound_events(
    connection: Connection,
    guard: ConnectionGuard,
) -> impl Stream<Item = Result<Event, Infallible>> {
    UnboundedReceiverStream::new(connection.receiver).filter_map(move |message| {
        let _guard = &guard;
        message_event(&message).map(Ok)
    })
}

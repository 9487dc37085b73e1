//! stdio transport: newline-delimited JSON over a reader/writer pair.
//!
//! The process serves exactly one session. Lines are admitted in arrival
//! order; tool calls run concurrently and their responses are written as
//! they finish. End of input closes the session after in-flight calls
//! complete.

use plantuml_mcp_types::decode;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, error, info, warn};

use super::dispatch;
use super::framing::encode_line;
use crate::mcp::SessionKind;
use crate::state::GatewayState;

/// Serve one session until `reader` reaches end of input.
pub async fn serve<R, W>(state: GatewayState, reader: R, mut writer: W) -> anyhow::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let sessions = state.sessions().clone();
    let credential = state.stdio_credential().map(str::to_string);
    let session = sessions.create(SessionKind::Stdio, credential).await;
    let mut connection = sessions.bind(&session);

    let writer_task = tokio::spawn(async move {
        while let Some(message) = connection.receiver.recv().await {
            let Some(line) = encode_line(&message) else {
                continue;
            };
            if let Err(e) = write_line(&mut writer, &line).await {
                error!("stdio: failed to write to stdout: {}", e);
                break;
            }
        }
    });

    info!("MCP stdio transport ready (session {})", session.id());

    let mut lines = BufReader::new(reader).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                warn!("stdio: read error, closing session: {}", e);
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        match decode(line.as_bytes()) {
            Ok(message) => {
                debug!("stdio: {}", message.method());
                let admission = session.admit(message, session.credential());
                dispatch(&session, admission);
            }
            Err(e) => {
                debug!("stdio: rejecting malformed line: {}", e);
                session.deliver(e.to_response());
            }
        }
    }

    info!("stdio: end of input, closing session {}", session.id());
    sessions.close(session.id()).await?;
    if let Err(e) = writer_task.await {
        error!("stdio: writer task failed: {}", e);
    }
    Ok(())
}

async fn write_line<W: AsyncWrite + Unpin>(writer: &mut W, line: &str) -> std::io::Result<()> {
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await
}

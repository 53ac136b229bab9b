//! Persistent-pipe transport: newline-delimited JSON-RPC on stdin/stdout.
//!
//! - Messages are UTF-8 encoded JSON-RPC, delimited by newlines
//! - Messages must not contain embedded newlines
//! - stdin: receives messages from the client
//! - stdout: sends messages to the client
//! - stderr: carries logging (never protocol frames)
//!
//! There is exactly one implicit session — the process itself. The channel
//! is bound to the dispatcher at construction time, before `start()` is
//! called.

use std::io;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use crate::error::TransportError;
use crate::mcp::channel::{Dispatcher, McpChannel};
use crate::transport::TransportManager;

/// Buffered newline-delimited JSON framing over stdin/stdout.
struct StdioFraming {
    reader: BufReader<tokio::io::Stdin>,
    writer: tokio::io::Stdout,
}

impl StdioFraming {
    fn new() -> Self {
        Self {
            reader: BufReader::new(tokio::io::stdin()),
            writer: tokio::io::stdout(),
        }
    }

    /// Reads the next message line from stdin.
    ///
    /// Returns `None` on EOF (peer closed its end).
    async fn read_line(&mut self) -> io::Result<Option<String>> {
        let mut line = String::new();
        let bytes_read = self.reader.read_line(&mut line).await?;

        if bytes_read == 0 {
            return Ok(None);
        }

        if line.ends_with('\n') {
            line.pop();
            if line.ends_with('\r') {
                line.pop();
            }
        }

        Ok(Some(line))
    }

    /// Writes a JSON value to stdout with newline termination.
    async fn write_json(&mut self, value: &Value) -> io::Result<()> {
        let json = serde_json::to_string(value)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

        // Protocol framing: messages must not contain embedded newlines.
        debug_assert!(
            !json.contains('\n'),
            "JSON message must not contain embedded newlines"
        );

        self.writer.write_all(json.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await?;

        Ok(())
    }
}

/// The persistent-pipe transport manager.
pub struct StdioTransport {
    channel: Arc<McpChannel>,
    stopped: bool,
}

impl StdioTransport {
    /// Creates the transport, binding its single channel immediately.
    #[must_use]
    pub fn new(dispatcher: &Dispatcher) -> Self {
        Self {
            channel: dispatcher.bind(),
            stopped: false,
        }
    }

    /// Handles one line of input, writing any response.
    async fn handle_line(&self, framing: &mut StdioFraming, line: &str) -> io::Result<()> {
        if line.trim().is_empty() {
            return Ok(());
        }

        let value: Value = match serde_json::from_str(line) {
            Ok(v) => v,
            Err(_) => {
                let error = crate::mcp::protocol::JsonRpcError::parse_error();
                let body = serde_json::to_value(&error)
                    .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
                return framing.write_json(&body).await;
            }
        };

        if let Some(response) = self.channel.handle_value(value).await {
            framing.write_json(&response).await?;
        }

        Ok(())
    }

    /// Serves until EOF or a termination signal.
    #[cfg(unix)]
    async fn serve(&self) -> io::Result<()> {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigint = signal(SignalKind::interrupt()).map_err(io::Error::other)?;
        let mut sigterm = signal(SignalKind::terminate()).map_err(io::Error::other)?;
        let mut framing = StdioFraming::new();

        loop {
            tokio::select! {
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT, initiating graceful shutdown");
                    return Ok(());
                }

                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM, initiating graceful shutdown");
                    return Ok(());
                }

                line_result = framing.read_line() => {
                    let Some(line) = line_result? else {
                        tracing::info!("stdin closed, shutting down");
                        return Ok(());
                    };
                    self.handle_line(&mut framing, &line).await?;
                }
            }
        }
    }

    /// Serves until EOF or Ctrl+C.
    #[cfg(windows)]
    async fn serve(&self) -> io::Result<()> {
        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);
        let mut framing = StdioFraming::new();

        loop {
            tokio::select! {
                _ = &mut ctrl_c => {
                    tracing::info!("Received Ctrl+C, initiating graceful shutdown");
                    return Ok(());
                }

                line_result = framing.read_line() => {
                    let Some(line) = line_result? else {
                        tracing::info!("stdin closed, shutting down");
                        return Ok(());
                    };
                    self.handle_line(&mut framing, &line).await?;
                }
            }
        }
    }
}

#[async_trait]
impl TransportManager for StdioTransport {
    async fn start(&mut self) -> Result<(), TransportError> {
        if self.stopped {
            return Err(TransportError::Config {
                message: "stdio transport cannot be restarted".to_string(),
            });
        }

        tracing::info!("stdio transport ready, waiting for client messages");
        self.serve().await?;
        self.stopped = true;
        Ok(())
    }

    async fn shutdown(&mut self) {
        // The single channel owns no OS resources beyond the process's own
        // stdio handles; marking stopped is sufficient and repeat calls are
        // harmless.
        if !self.stopped {
            tracing::info!("stdio transport shut down");
            self.stopped = true;
        }
    }
}

impl std::fmt::Debug for StdioTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StdioTransport")
            .field("stopped", &self.stopped)
            .field("channel", &self.channel)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::{LevelController, LogLevel};
    use crate::mcp::channel::ChannelState;
    use crate::mcp::prompt::PromptRegistry;
    use crate::mcp::registry::ToolRegistry;

    fn dispatcher() -> Dispatcher {
        Dispatcher::new(
            Arc::new(ToolRegistry::new()),
            Arc::new(PromptRegistry::new()),
            Arc::new(LevelController::detached(LogLevel::Warn)),
        )
    }

    #[test]
    fn channel_bound_at_construction() {
        let transport = StdioTransport::new(&dispatcher());
        assert_eq!(transport.channel.state(), ChannelState::AwaitingInit);
    }

    #[tokio::test]
    async fn repeated_shutdown_is_idempotent() {
        let mut transport = StdioTransport::new(&dispatcher());
        transport.shutdown().await;
        transport.shutdown().await;
        assert!(transport.stopped);
    }

    #[tokio::test]
    async fn serialised_responses_have_no_embedded_newlines() {
        let error = crate::mcp::protocol::JsonRpcError::parse_error();
        let json = serde_json::to_string(&error).unwrap();
        assert!(!json.contains('\n'));
    }
}

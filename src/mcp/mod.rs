//! MCP protocol implementation.
//!
//! This module contains the transport-independent core of the gateway:
//!
//! - [`protocol`] — JSON-RPC 2.0 message types and parsing
//! - [`registry`] — the tool registry and result envelope
//! - [`prompt`] — the prompt registry and template engine
//! - [`channel`] — the per-connection dispatcher and lifecycle state machine
//!
//! Transports live in [`crate::transport`]; they own channels and move
//! messages in and out, nothing more.

pub mod channel;
pub mod prompt;
pub mod protocol;
pub mod registry;

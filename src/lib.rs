//! storefront-mcp: MCP gateway exposing a storefront backend as typed tools
//!
//! This library adapts an e-commerce REST backend (product search, carts,
//! checkout, orders, authentication) into schema-described MCP tools that a
//! calling agent can discover and invoke over JSON-RPC 2.0.
//!
//! # Architecture
//!
//! The gateway provides the protocol plumbing. The backend provides the
//! commerce; the calling agent provides the intelligence:
//!
//! - **Registries**: tools and prompt templates, populated once at startup
//! - **Channels**: per-connection lifecycle state over the shared registries
//! - **Transports**: stdio (persistent pipe), HTTP (session affinity), SSE
//!   (event stream) — one contract, three variants
//!
//! # Modules
//!
//! - [`config`] — Configuration loading and validation
//! - [`error`] — Error types
//! - [`logging`] — Levels, mapping, and runtime filter control
//! - [`backend`] — Downstream storefront REST client
//! - [`mcp`] — MCP protocol implementation
//! - [`tools`] — Tool adapters over the backend
//! - [`prompts`] — Built-in prompt templates
//! - [`transport`] — Session/transport managers

pub mod backend;
pub mod config;
pub mod error;
pub mod logging;
pub mod mcp;
pub mod prompts;
pub mod tools;
pub mod transport;

//! # contextd
//!
//! A multi-tenant session-context daemon for an AI coding assistant. It
//! persists three kinds of knowledge — session *checkpoints*, error
//! *remediations*, and generic *troubleshooting patterns* — behind a
//! tenant-scoped vector store, and serves semantic retrieval over them via
//! a JSON-RPC "MCP" tool surface (stdio bridge + HTTP daemon) and a REST
//! mirror.
//!
//! ## Layout
//!
//! - [`config`] — TOML + environment configuration.
//! - [`error`] — the shared error taxonomy and its HTTP/JSON-RPC mappings.
//! - [`value`] — `DynValue`, the untyped metadata payload type.
//! - [`tenant`] — scope/kind → collection-name routing and tenant validation.
//! - [`store`] — the `Store` trait and its in-memory/local/gRPC backends.
//! - [`embed`] — the `Embedder` trait and its hash/fastembed implementations.
//! - [`services`] — Checkpoint, Remediation, and Troubleshooting.
//! - [`prefetch`] — the speculative pre-fetch orchestrator.
//! - [`mcp`] — JSON-RPC protocol, tool registry, dispatcher, stdio bridge.
//! - [`http`] — the HTTP daemon's router (`/health`, `/mcp`, REST mirror).
//! - [`auth`] — bearer-token verification and owner-ID derivation.
//! - [`logging`] — structured logging: custom levels, sampling, redaction.
//! - [`state`] — [`AppState`](state::AppState), the daemon's shared handle.

pub mod auth;
pub mod config;
pub mod embed;
pub mod error;
#[cfg(feature = "mcp")]
pub mod http;
pub mod logging;
#[cfg(feature = "mcp")]
pub mod mcp;
pub mod prefetch;
pub mod services;
pub mod state;
pub mod store;
pub mod tenant;
pub mod value;

pub use error::{ContextdError, Result};
pub use state::AppState;

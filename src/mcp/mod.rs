//! The Model Context Protocol tool surface (§4.6): JSON-RPC 2.0 envelope,
//! tool schema registry, and the dispatcher that turns a tool call into a
//! service invocation. Used by both the `/mcp` HTTP endpoint and the
//! standalone [`stdio`] bridge process.

pub mod args;
pub mod dispatch;
mod prefetch_candidates;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod stdio;

pub use dispatch::{dispatch, DispatchOutcome};
pub use protocol::{JsonRpcRequest, JsonRpcResponse};
pub use server::handle_request;

//! Core library for the Mergington activities service.
//!
//! - [`registry`]: the in-memory activity store and its signup rules.
//! - [`mcp`]: the GitHub issue-search proxy that talks to an MCP server
//!   over HTTP, or over stdio when the HTTP endpoint is unreachable.

pub mod mcp;
pub mod registry;

/// Core Server Framework Module
///
/// This module contains the core server implementation including:
/// - server.rs: MCP dispatcher, HTTP and STDIO transports
/// - sse.rs: MCP Server-Sent Events session transport
/// - config.rs: environment-driven configuration
/// - logging.rs: tracing subscriber setup
/// - error.rs: error types shared across modules

pub mod config;
pub mod error;
pub mod logging;
pub mod server;
pub mod sse;

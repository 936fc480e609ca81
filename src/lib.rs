//! # MCP Workflow Healer
//!
//! A Model Context Protocol (MCP) server that autonomously diagnoses and
//! repairs automation workflows hosted on an external engine.
//!
//! ## Features
//!
//! - **Diagnostics**: disabled nodes, missing credentials, missing HTTP
//!   timeouts, unreachable nodes, and repeatedly failing nodes, summarized
//!   as a 0-100 health score
//! - **Bounded Auto-Fix**: confidence-scored, allowlist-gated repairs with
//!   a hard per-run cap
//! - **Verification**: every applied fix set is validated by a test run
//! - **Rollback**: pre-mutation snapshots with automatic restore when
//!   verification fails
//! - **Guard Rails**: per-workflow rate limiting with a sticky failure
//!   circuit, and a 0-3 autonomy level controlling what proceeds unattended
//!
//! ## Architecture
//!
//! ```text
//! MCP Client → MCP Server (Rust) → Workflow Engine REST API (HTTP)
//!                    ↓
//!          in-process state (rollback points, rate limits, history)
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use mcp_workflow_healer::{AppState, Config, McpServer};
//! use mcp_workflow_healer::engine::HttpEngineClient;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_env()?;
//!     let engine = Arc::new(HttpEngineClient::new(&config.engine, &config.request)?);
//!     let state = Arc::new(AppState::new(config, engine));
//!     let server = McpServer::new(state);
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]

/// Configuration management for the MCP server.
pub mod config;
/// Workflow engine REST client and types.
pub mod engine;
/// Error types and result aliases for the application.
pub mod error;
/// Self-healing pipeline: diagnostics, fixes, verification, rollback.
pub mod healing;
/// MCP server implementation and request handling.
pub mod server;

pub use config::Config;
pub use error::{AppError, AppResult};
pub use server::{AppState, McpServer, SharedState};

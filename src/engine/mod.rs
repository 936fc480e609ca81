//! Workflow engine REST client and wire types.

pub mod client;
pub mod types;

pub use client::{EngineClient, HttpEngineClient};
pub use types::{
    ConnectionTarget, Execution, ExecutionError, ExecutionHandle, NodeConnections,
    WorkflowDefinition, WorkflowNode,
};

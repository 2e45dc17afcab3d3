//! Tool registry and argument-repair contracts.
//!
//! The performer never implements tools itself. It consumes a ready
//! [`ToolExecutor`] that knows how to run a named function, expose the JSON
//! schema set for the model, and classify barrier tools (tools whose
//! successful execution terminates the loop). A companion [`ArgRepairer`]
//! rewrites argument blobs that a tool rejected, using the tool's schema and
//! the failure message.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::error::Result;

/// The model-facing description of one tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    /// JSON schema of the tool's arguments.
    pub parameters: Value,
}

/// Executes parsed tool calls against the real tool implementations.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    /// Runs one tool call and returns its observation text.
    ///
    /// `stream_id` and `reasoning` tie the execution to the model turn that
    /// requested it; both are zero/empty for all but the first call of a
    /// response.
    async fn execute(
        &self,
        cancel: CancellationToken,
        stream_id: i64,
        tool_call_id: &str,
        name: &str,
        reasoning: &str,
        arguments: &str,
    ) -> Result<String>;

    /// The schema set advertised to the model.
    fn tools(&self) -> Vec<ToolSchema>;

    /// Schema of a single tool, looked up by name.
    fn tool_schema(&self, name: &str) -> Result<ToolSchema>;

    /// Whether a successful execution of this tool terminates the loop.
    fn is_barrier(&self, name: &str) -> bool;

    /// Names of all barrier tools.
    fn barrier_names(&self) -> Vec<String>;

    /// Full schemas of all barrier tools.
    fn barrier_tools(&self) -> Vec<ToolSchema>;
}

/// Rewrites a rejected argument blob so the next execution attempt can
/// succeed.
#[async_trait]
pub trait ArgRepairer: Send + Sync {
    async fn fix_args(
        &self,
        cancel: CancellationToken,
        name: &str,
        arguments: &str,
        schema: &ToolSchema,
        prior_error: &str,
    ) -> Result<String>;
}

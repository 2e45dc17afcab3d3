//! Prompt template rendering contract.
//!
//! Prompt texts live with the upstream service; the loop only names which
//! template it needs and hands over the variables as a JSON value.

use serde_json::Value;

use crate::error::Result;

/// The templates the performer renders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TemplateKind {
    /// System prompt for the reflector agent: barrier tool descriptions,
    /// current time, execution context, last human request.
    ReflectorSystem,
    /// Human prompt carrying the offending prose and barrier tool names to
    /// the reflector.
    ReflectorQuestion,
    /// Knowledge-graph record of an agent response.
    AgentResponseRecord,
    /// Knowledge-graph record of a tool execution.
    ToolExecutionRecord,
}

/// Renders a named template with the given variables.
pub trait Prompter: Send + Sync {
    fn render(&self, kind: TemplateKind, vars: &Value) -> Result<String>;
}

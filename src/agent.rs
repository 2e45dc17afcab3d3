//! Agent identities executed by the chain performer.
//!
//! The performer runs the same loop for every agent kind; the kind only
//! decides what happens when the model answers with prose instead of a tool
//! call. The assistant treats prose as its final answer, every other kind is
//! sent through the reflector to get back on track.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The role a chain run is executed under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentKind {
    /// The task-driving agent. Expected to act through tools.
    Primary,
    /// The conversational assistant. A prose-only response finalizes the run.
    Assistant,
    /// The corrective agent used for reflection sub-chains.
    Reflector,
}

impl AgentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentKind::Primary => "primary",
            AgentKind::Assistant => "assistant",
            AgentKind::Reflector => "reflector",
        }
    }

    /// Whether a response with no tool calls ends the run instead of
    /// engaging the reflector.
    pub fn finalizes_on_prose(&self) -> bool {
        matches!(self, AgentKind::Assistant)
    }
}

impl fmt::Display for AgentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

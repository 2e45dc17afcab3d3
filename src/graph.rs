//! Best-effort knowledge-graph side channel.
//!
//! Agent responses and tool executions are mirrored into a knowledge graph
//! as rendered message records so later runs can recall what happened. The
//! sink is strictly best-effort: writes run under the sink's own timeout and
//! a failure is logged and swallowed, never surfaced to the loop.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::error::Result;

/// One rendered record sent to the graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphMessage {
    /// Rendered record body.
    pub content: String,
    /// Who produced the event, e.g. "primary Agent".
    pub author: String,
    pub timestamp: DateTime<Utc>,
    /// Record kind, e.g. "agent_response" or "tool_execution_scan".
    pub name: String,
    /// Human-readable provenance of the record.
    pub source_description: String,
}

/// Receiver of graph records, grouped by flow.
#[async_trait]
pub trait KnowledgeSink: Send + Sync {
    /// Whether the sink is configured and accepting writes.
    fn is_enabled(&self) -> bool;

    /// Budget for one write before the performer gives up on it.
    fn timeout(&self) -> Duration;

    async fn add_messages(
        &self,
        cancel: CancellationToken,
        group_id: &str,
        messages: Vec<GraphMessage>,
    ) -> Result<()>;
}

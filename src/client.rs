//! LLM transport contract consumed by the performer.
//!
//! The concrete provider drivers (OpenAI-compatible, Anthropic, local
//! gateways) live upstream; the loop only needs a way to run one completion
//! over a chain, optionally with a tool schema set and a streaming callback,
//! and a provider-specific accessor that digs token counts out of the
//! generation-info map.

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde_json::{Map, Value};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::agent::AgentKind;
use crate::chain::{Message, ToolCall};
use crate::error::Result;
use crate::executor::ToolSchema;

/// An incremental chunk surfaced by a streaming provider driver.
#[derive(Debug, Clone)]
pub enum ProviderChunk {
    /// Reasoning text delta.
    Reasoning(String),
    /// Answer text delta.
    Text(String),
    /// A partial tool call. Buffered by the caller, never streamed onward.
    ToolCall {
        id: String,
        name: String,
        arguments: String,
    },
    /// End of the streamed response.
    Done,
}

/// Callback the provider invokes for every streamed chunk.
pub type ChunkCallback =
    Arc<dyn Fn(ProviderChunk) -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// One completion choice returned by the provider.
#[derive(Debug, Clone, Default)]
pub struct Choice {
    /// Assistant text, possibly empty.
    pub content: String,
    /// Reasoning text when the provider exposes it.
    pub reasoning: String,
    /// Why generation stopped.
    pub stop_reason: String,
    /// Tool calls in emission order.
    pub tool_calls: Vec<ToolCall>,
    /// Provider metadata, including token usage.
    pub generation_info: Option<Map<String, Value>>,
}

/// The raw provider response before assembly into a call result.
#[derive(Debug, Clone, Default)]
pub struct ChatResponse {
    pub choices: Vec<Choice>,
}

/// A chat-completion transport bound to one provider instance.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// One completion without tools. Used by corrective sub-chains.
    async fn call(
        &self,
        cancel: CancellationToken,
        agent: AgentKind,
        chain: &[Message],
    ) -> Result<ChatResponse>;

    /// One completion with the supplied tool schema set. When `on_chunk` is
    /// present the driver streams deltas through it as they arrive.
    async fn call_with_tools(
        &self,
        cancel: CancellationToken,
        agent: AgentKind,
        chain: &[Message],
        tools: &[ToolSchema],
        on_chunk: Option<ChunkCallback>,
    ) -> Result<ChatResponse>;

    /// Extracts (input, output) token counts from generation info.
    fn usage(&self, info: &Map<String, Value>) -> (i64, i64);
}

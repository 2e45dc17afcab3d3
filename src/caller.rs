//! Single model call with retries, streaming, and response assembly.
//!
//! `call_with_retries` is the only path to the model for agent rounds. Each
//! attempt runs the provider's streaming chat API with the executor's tool
//! schema set; deltas are forwarded to the stream sink while tool-call chunks
//! are buffered for the assembled result. An attempt only counts as success
//! when the response carries non-whitespace content or at least one tool
//! call. Between attempts the loop waits a fixed delay, aborting the wait the
//! moment the cancellation signal fires.
//!
//! `call_simple` is the stripped-down variant used by corrective sub-chains:
//! one completion with its own retry budget, no tools, no streaming.

use futures::future::BoxFuture;
use serde_json::{Map, Value};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::agent::AgentKind;
use crate::chain::{Message, ToolCall};
use crate::client::{ChatResponse, ChunkCallback, ProviderChunk};
use crate::error::{PerformError, Result};
use crate::performer::ChainPerformer;
use crate::stream::{MsgLogType, StreamChunk, StreamSink};

/// The distilled output of one model call.
#[derive(Debug, Clone, Default)]
pub struct CallResult {
    /// Stream the response was rendered into; zero when nothing streamed.
    pub stream_id: i64,
    /// Tool calls across all choices, in emission order.
    pub tool_calls: Vec<ToolCall>,
    /// Provider metadata of the first choice that supplied any.
    pub info: Option<Map<String, Value>>,
    /// Reasoning text, when the provider exposes it.
    pub reasoning: String,
    /// Assistant text with non-empty choice contents joined by newlines.
    pub content: String,
}

impl CallResult {
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// Folds a raw provider response into a `CallResult`, rejecting responses
/// that carry neither usable content nor tool calls.
fn assemble(response: ChatResponse) -> Result<CallResult> {
    if response.choices.is_empty() {
        return Err(PerformError::Provider("no choices in response".to_string()));
    }

    let mut result = CallResult::default();
    let mut stop_reason = String::new();
    let mut parts: Vec<String> = Vec::new();

    for choice in response.choices {
        if stop_reason.is_empty() {
            stop_reason = choice.stop_reason.clone();
        }

        if !choice.content.trim().is_empty() {
            parts.push(choice.content);
        }

        if result.info.is_none() {
            if let Some(info) = choice.generation_info {
                if !info.is_empty() {
                    result.info = Some(info);
                }
            }
        }

        result.tool_calls.extend(choice.tool_calls);

        if !choice.reasoning.is_empty() {
            result.reasoning = choice.reasoning;
        }
    }

    result.content = parts.join("\n");

    let stripped = result
        .content
        .trim_matches(&['\'', ' ', '"', '\n', '\r', '\t'][..]);
    if stripped.is_empty() && result.tool_calls.is_empty() {
        return Err(PerformError::EmptyResponse { stop_reason });
    }

    Ok(result)
}

/// Builds the provider callback that forwards deltas into the sink under a
/// fixed stream id. Tool-call chunks are skipped; the assembled response
/// carries them instead.
fn forwarder(sink: Arc<dyn StreamSink>, stream_id: i64) -> ChunkCallback {
    Arc::new(move |chunk: ProviderChunk| {
        let sink = sink.clone();
        Box::pin(async move {
            match chunk {
                ProviderChunk::Reasoning(text) => {
                    sink.emit(StreamChunk::Thinking {
                        stream_id,
                        msg_type: MsgLogType::Answer,
                        text,
                    })
                    .await
                }
                ProviderChunk::Text(text) => {
                    sink.emit(StreamChunk::Content {
                        stream_id,
                        msg_type: MsgLogType::Answer,
                        text,
                    })
                    .await
                }
                ProviderChunk::ToolCall { .. } => Ok(()),
                ProviderChunk::Done => {
                    sink.emit(StreamChunk::Flush {
                        stream_id,
                        msg_type: MsgLogType::Answer,
                    })
                    .await
                }
            }
        }) as BoxFuture<'static, Result<()>>
    })
}

impl ChainPerformer {
    /// One agent-round model call with up to `max_call_retries` attempts.
    pub(crate) async fn call_with_retries(
        &self,
        cancel: &CancellationToken,
        chain: &[Message],
        agent: AgentKind,
    ) -> Result<CallResult> {
        let mut causes: Vec<String> = Vec::new();
        let mut assembled: Option<CallResult> = None;
        let tools = self.executor.tools();

        for attempt in 0..self.config.max_call_retries {
            if attempt > 0 {
                self.wait_retry(cancel).await?;
            }

            // a fresh stream id per attempt keeps abandoned partial streams
            // from bleeding into the one that completes
            let mut stream_id = 0;
            let on_chunk = self.sink.as_ref().map(|sink| {
                stream_id = self.next_stream_id();
                forwarder(sink.clone(), stream_id)
            });

            let outcome = self
                .client
                .call_with_tools(cancel.clone(), agent, chain, &tools, on_chunk)
                .await
                .and_then(assemble);

            match outcome {
                Ok(mut result) => {
                    result.stream_id = stream_id;
                    assembled = Some(result);
                    break;
                }
                Err(PerformError::Cancelled) => return Err(PerformError::Cancelled),
                Err(err) => {
                    warn!(agent = %agent, attempt, error = %err, "model call attempt failed");
                    causes.push(err.to_string());
                }
            }
        }

        let mut result = assembled.ok_or_else(|| PerformError::CallExhausted {
            attempts: self.config.max_call_retries,
            causes: causes.join("; "),
        })?;

        if let Some(sink) = &self.sink {
            if result.stream_id != 0 {
                if let Err(err) = sink
                    .emit(StreamChunk::Update {
                        stream_id: result.stream_id,
                        msg_type: MsgLogType::Answer,
                        content: result.content.clone(),
                        thinking: result.reasoning.clone(),
                    })
                    .await
                {
                    debug!(error = %err, "final update chunk was not delivered");
                }

                // content arriving alongside tool calls stands as its own
                // message; clearing the ids keeps the coming tool stream
                // from re-attributing that text
                if result.has_tool_calls() && !result.content.is_empty() {
                    result.stream_id = 0;
                    result.reasoning = String::new();
                }
            }
        }

        Ok(result)
    }

    /// One no-tools completion with its own retry budget. Returns the joined
    /// non-empty choice contents.
    pub(crate) async fn call_simple(
        &self,
        cancel: &CancellationToken,
        agent: AgentKind,
        system: String,
        user: String,
    ) -> Result<String> {
        let chain = vec![Message::system(system), Message::human(user)];
        let mut causes: Vec<String> = Vec::new();

        for attempt in 0..self.config.max_call_retries {
            if attempt > 0 {
                self.wait_retry(cancel).await?;
            }

            match self.client.call(cancel.clone(), agent, &chain).await {
                Ok(response) => {
                    let content = response
                        .choices
                        .iter()
                        .map(|choice| choice.content.as_str())
                        .filter(|content| !content.trim().is_empty())
                        .collect::<Vec<_>>()
                        .join("\n");
                    if !content.trim().is_empty() {
                        return Ok(content);
                    }
                    causes.push("no content in response".to_string());
                }
                Err(PerformError::Cancelled) => return Err(PerformError::Cancelled),
                Err(err) => {
                    warn!(agent = %agent, attempt, error = %err, "simple call attempt failed");
                    causes.push(err.to_string());
                }
            }
        }

        Err(PerformError::CallExhausted {
            attempts: self.config.max_call_retries,
            causes: causes.join("; "),
        })
    }

    /// Sleeps the configured retry delay, aborting when cancellation fires.
    async fn wait_retry(&self, cancel: &CancellationToken) -> Result<()> {
        tokio::select! {
            _ = tokio::time::sleep(self.config.retry_delay) => Ok(()),
            _ = cancel.cancelled() => Err(PerformError::Cancelled),
        }
    }
}

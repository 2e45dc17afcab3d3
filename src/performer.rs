//! # The Agent Loop
//!
//! `ChainPerformer` is the top-level driver: it repeatedly prompts the model
//! over the growing message chain, executes the tool calls the model emits,
//! appends their observations, and persists the chain after every mutation.
//! A run ends when a barrier tool fires, when an assistant-kind agent answers
//! with prose, or when a sub-component fails beyond recovery.
//!
//! The loop is strictly sequential within one invocation. The enclosing
//! runtime may drive many performers concurrently over different chains; the
//! shared collaborators (stream sink, knowledge sink, LLM client) must
//! tolerate that outer parallelism, while the chain itself is owned
//! exclusively by the invocation that received it.
//!
//! Recovery is layered: empty model responses retry inside the caller,
//! failing tool calls go through argument repair, prose-only responses from
//! non-assistant agents engage the reflector, and a repeating tool call is
//! answered with an advisory observation instead of being executed again.
//! Summarization and knowledge-graph writes are best-effort side channels; a
//! failure there is logged and the loop keeps going.

use chrono::Utc;
use serde_json::{json, Map, Value};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info_span, warn, Instrument};

use crate::agent::AgentKind;
use crate::caller::CallResult;
use crate::chain::{last_human_message, Chain, Message, ToolCall};
use crate::client::LlmClient;
use crate::config::PerformerConfig;
use crate::detector::RepetitionDetector;
use crate::error::{PerformError, Result};
use crate::executor::{ArgRepairer, ToolExecutor};
use crate::graph::{GraphMessage, KnowledgeSink};
use crate::prompter::{Prompter, TemplateKind};
use crate::store::ChainStore;
use crate::stream::{MsgLogType, StreamChunk, StreamSink};
use crate::summarizer::Summarizer;
use crate::usage::Usage;

/// Advice injected when the reflector sub-chain itself fails.
pub(crate) const TOOL_ADVICE_PLACEHOLDER: &str =
    "You must respond with a tool call. Pick the appropriate tool and pass its arguments as JSON.";

/// Clamp for log fields carrying model output.
pub(crate) const LOG_FIELD_LIMIT: usize = 1000;

/// Clips a string for logging without splitting a UTF-8 character.
pub(crate) fn clip(text: &str, limit: usize) -> &str {
    if text.len() <= limit {
        return text;
    }
    let mut end = limit;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

/// Task coordinates and context snapshot for one loop invocation.
///
/// Absent ids stay absent in telemetry fields rather than showing up as
/// zeros. `execution_context` is an opaque snapshot of task state the
/// upstream service derives; the loop only forwards it to reflector prompts.
#[derive(Debug, Clone, Default)]
pub struct LoopScope {
    pub task_id: Option<i64>,
    pub subtask_id: Option<i64>,
    pub execution_context: String,
}

/// The top-level loop driver. One instance serves one flow and may perform
/// many chains for it over its lifetime.
pub struct ChainPerformer {
    pub(crate) client: Arc<dyn LlmClient>,
    pub(crate) executor: Arc<dyn ToolExecutor>,
    pub(crate) repairer: Arc<dyn ArgRepairer>,
    pub(crate) prompter: Arc<dyn Prompter>,
    pub(crate) store: ChainStore,
    pub(crate) sink: Option<Arc<dyn StreamSink>>,
    pub(crate) graph: Option<Arc<dyn KnowledgeSink>>,
    pub(crate) summarizer: Option<Arc<dyn Summarizer>>,
    pub(crate) config: PerformerConfig,
    pub(crate) call_counter: AtomicI64,
    pub(crate) flow_id: i64,
}

impl ChainPerformer {
    pub fn new(
        client: Arc<dyn LlmClient>,
        executor: Arc<dyn ToolExecutor>,
        repairer: Arc<dyn ArgRepairer>,
        prompter: Arc<dyn Prompter>,
        store: ChainStore,
        flow_id: i64,
    ) -> Self {
        Self {
            client,
            executor,
            repairer,
            prompter,
            store,
            sink: None,
            graph: None,
            summarizer: None,
            config: PerformerConfig::default(),
            call_counter: AtomicI64::new(0),
            flow_id,
        }
    }

    /// Attach a stream sink; model output is then streamed live.
    pub fn with_stream_sink(mut self, sink: Arc<dyn StreamSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Attach a best-effort knowledge-graph sink.
    pub fn with_knowledge_sink(mut self, graph: Arc<dyn KnowledgeSink>) -> Self {
        self.graph = Some(graph);
        self
    }

    /// Attach a summarizer that may compact the chain between iterations.
    pub fn with_summarizer(mut self, summarizer: Arc<dyn Summarizer>) -> Self {
        self.summarizer = Some(summarizer);
        self
    }

    /// Override the default recovery budget.
    pub fn with_config(mut self, config: PerformerConfig) -> Self {
        self.config = config;
        self
    }

    /// Fresh stream id. Zero is reserved for "no stream"; ids start at one
    /// and stay unique for the lifetime of the performer.
    pub(crate) fn next_stream_id(&self) -> i64 {
        self.call_counter.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Drives the chain to completion and returns the final chain state.
    ///
    /// The performer owns the chain for the duration of the call; on return
    /// (or error) ownership goes back to the caller, and the last persisted
    /// chain is the durable state.
    pub async fn perform(
        &self,
        cancel: CancellationToken,
        agent: AgentKind,
        chain_id: i64,
        scope: LoopScope,
        chain: Chain,
    ) -> Result<Chain> {
        let span = info_span!(
            "perform_chain",
            flow_id = self.flow_id,
            chain_id,
            agent = %agent,
            task_id = tracing::field::Empty,
            subtask_id = tracing::field::Empty,
        );
        if let Some(id) = scope.task_id {
            span.record("task_id", id);
        }
        if let Some(id) = scope.subtask_id {
            span.record("subtask_id", id);
        }

        self.perform_inner(cancel, agent, chain_id, scope, chain)
            .instrument(span)
            .await
    }

    async fn perform_inner(
        &self,
        cancel: CancellationToken,
        agent: AgentKind,
        chain_id: i64,
        scope: LoopScope,
        mut chain: Chain,
    ) -> Result<Chain> {
        let mut detector = RepetitionDetector::new();
        let group_id = format!("flow-{}", self.flow_id);

        loop {
            let mut result = self.call_with_retries(&cancel, &chain, agent).await?;
            self.persist_usage(chain_id, result.info.as_ref()).await?;

            if result.tool_calls.is_empty() {
                if agent.finalizes_on_prose() {
                    self.record_agent_response(&cancel, &group_id, agent, &result, &scope)
                        .await;
                    return self
                        .finalize_assistant(&cancel, chain_id, chain, result)
                        .await;
                }

                // The prose detour lives only inside the reflector; the
                // owned chain keeps growing with tool traffic alone.
                let mut detour = chain.clone();
                detour.push(Message::ai(result.content.clone()));
                let human_message = last_human_message(&chain);
                result = match self
                    .reflect(
                        &cancel,
                        agent,
                        chain_id,
                        &scope,
                        detour,
                        human_message,
                        result.content.clone(),
                    )
                    .await
                {
                    Ok(reflected) => reflected,
                    Err(err) => {
                        error!(
                            chain_id,
                            content = clip(&result.content, LOG_FIELD_LIMIT),
                            execution = clip(&scope.execution_context, LOG_FIELD_LIMIT),
                            error = %err,
                            "failed to perform reflector"
                        );
                        return Err(err);
                    }
                };
            }

            self.record_agent_response(&cancel, &group_id, agent, &result, &scope)
                .await;

            chain.push(Message::ai_tool_calls(result.tool_calls.clone()));
            self.store.persist_chain(chain_id, &chain).await?;

            let mut stop = false;
            for idx in 0..result.tool_calls.len() {
                let call = result.tool_calls[idx].clone();
                let outcome = self
                    .exec_tool_call(&cancel, chain_id, idx, &result, &mut detector)
                    .await;
                self.record_tool_execution(&cancel, &group_id, agent, &call, &outcome, &scope)
                    .await;

                let observation = match outcome {
                    Ok(observation) => observation,
                    Err(err) => {
                        error!(
                            chain_id,
                            func_name = %call.name,
                            func_args = clip(&call.arguments, LOG_FIELD_LIMIT),
                            error = %err,
                            "failed to exec tool call"
                        );
                        return Err(err);
                    }
                };

                chain.push(Message::tool_response(
                    call.id.clone(),
                    call.name.clone(),
                    observation,
                ));
                self.store.persist_chain(chain_id, &chain).await?;

                if self.executor.is_barrier(&call.name) {
                    stop = true;
                }
            }

            if stop {
                return Ok(chain);
            }

            if let Some(summarizer) = &self.summarizer {
                match summarizer.summarize(cancel.clone(), &chain).await {
                    Ok(compacted) => {
                        chain = compacted;
                        self.store.persist_chain(chain_id, &chain).await?;
                    }
                    Err(err) => {
                        warn!(chain_id, error = %err, "failed to summarize chain");
                    }
                }
            }
        }
    }

    /// Ends an assistant run whose response carried no tool calls: emit the
    /// final update, optionally compact, append the answer, persist.
    async fn finalize_assistant(
        &self,
        cancel: &CancellationToken,
        chain_id: i64,
        mut chain: Chain,
        mut result: CallResult,
    ) -> Result<Chain> {
        if let Some(sink) = &self.sink {
            if result.stream_id == 0 {
                result.stream_id = self.next_stream_id();
            }
            sink.emit(StreamChunk::Update {
                stream_id: result.stream_id,
                msg_type: MsgLogType::Answer,
                content: result.content.clone(),
                thinking: result.reasoning.clone(),
            })
            .await
            .map_err(|err| PerformError::Stream(err.to_string()))?;
        }

        if let Some(summarizer) = &self.summarizer {
            match summarizer.summarize(cancel.clone(), &chain).await {
                Ok(compacted) => chain = compacted,
                Err(err) => warn!(chain_id, error = %err, "failed to summarize chain"),
            }
        }

        chain.push(Message::ai(result.content.clone()));
        self.store.persist_chain(chain_id, &chain).await?;
        Ok(chain)
    }

    /// Extracts token counts from generation info and records them.
    pub(crate) async fn persist_usage(
        &self,
        chain_id: i64,
        info: Option<&Map<String, Value>>,
    ) -> Result<()> {
        let usage = info
            .map(|info| {
                let (input, output) = self.client.usage(info);
                Usage::new(input, output)
            })
            .unwrap_or_default();
        self.store.persist_usage(chain_id, usage).await
    }

    async fn record_agent_response(
        &self,
        cancel: &CancellationToken,
        group_id: &str,
        agent: AgentKind,
        result: &CallResult,
        scope: &LoopScope,
    ) {
        let Some(graph) = &self.graph else { return };
        if !graph.is_enabled() || result.content.is_empty() {
            return;
        }

        let vars = json!({
            "agent_type": agent.as_str(),
            "response": result.content,
            "task_id": scope.task_id,
            "subtask_id": scope.subtask_id,
        });
        let content = match self.prompter.render(TemplateKind::AgentResponseRecord, &vars) {
            Ok(content) => content,
            Err(err) => {
                warn!(error = %err, "failed to render agent response record");
                return;
            }
        };

        let message = GraphMessage {
            content,
            author: format!("{} Agent", agent.as_str()),
            timestamp: Utc::now(),
            name: "agent_response".to_string(),
            source_description: format!(
                "{} agent execution in flow {}, task {}, subtask {}",
                agent.as_str(),
                self.flow_id,
                fmt_opt(scope.task_id),
                fmt_opt(scope.subtask_id),
            ),
        };
        self.store_to_graph(cancel, group_id, vec![message]).await;
    }

    async fn record_tool_execution(
        &self,
        cancel: &CancellationToken,
        group_id: &str,
        agent: AgentKind,
        call: &ToolCall,
        outcome: &Result<String>,
        scope: &LoopScope,
    ) {
        let Some(graph) = &self.graph else { return };
        if !graph.is_enabled() {
            return;
        }

        let description = self
            .executor
            .tool_schema(&call.name)
            .map(|schema| schema.description)
            .unwrap_or_default();
        let (status, result_text) = match outcome {
            Ok(observation) => ("success", observation.clone()),
            Err(err) => ("failure", format!("Error: {err}")),
        };

        let vars = json!({
            "tool_name": call.name,
            "description": description,
            "is_barrier": self.executor.is_barrier(&call.name),
            "arguments": call.arguments,
            "agent_type": agent.as_str(),
            "status": status,
            "result": result_text,
            "task_id": scope.task_id,
            "subtask_id": scope.subtask_id,
        });
        let content = match self.prompter.render(TemplateKind::ToolExecutionRecord, &vars) {
            Ok(content) => content,
            Err(err) => {
                warn!(error = %err, "failed to render tool execution record");
                return;
            }
        };

        let message = GraphMessage {
            content,
            author: format!("{} Agent", agent.as_str()),
            timestamp: Utc::now(),
            name: format!("tool_execution_{}", call.name),
            source_description: format!(
                "tool execution in flow {}, task {}, subtask {}",
                self.flow_id,
                fmt_opt(scope.task_id),
                fmt_opt(scope.subtask_id),
            ),
        };
        self.store_to_graph(cancel, group_id, vec![message]).await;
    }

    /// Writes records to the knowledge graph under its timeout, logging and
    /// swallowing every failure.
    async fn store_to_graph(
        &self,
        cancel: &CancellationToken,
        group_id: &str,
        messages: Vec<GraphMessage>,
    ) {
        let Some(graph) = &self.graph else { return };
        if !graph.is_enabled() {
            return;
        }

        let write = graph.add_messages(cancel.clone(), group_id, messages);
        match tokio::time::timeout(graph.timeout(), write).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                warn!(group_id, error = %err, "failed to store messages to knowledge graph");
            }
            Err(_) => {
                warn!(group_id, "timed out storing messages to knowledge graph");
            }
        }
    }
}

fn fmt_opt(id: Option<i64>) -> String {
    id.map(|value| value.to_string())
        .unwrap_or_else(|| "none".to_string())
}

//! Shared test doubles: a scripted client, a recording executor, an
//! in-memory repository, and friends. Compiled for tests only.

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::agent::AgentKind;
use crate::chain::{Chain, Message, ToolCall};
use crate::client::{ChatResponse, Choice, ChunkCallback, LlmClient, ProviderChunk};
use crate::error::{PerformError, Result};
use crate::executor::{ArgRepairer, ToolExecutor, ToolSchema};
use crate::graph::{GraphMessage, KnowledgeSink};
use crate::prompter::{Prompter, TemplateKind};
use crate::store::ChainRepository;
use crate::stream::{StreamChunk, StreamSink};
use crate::summarizer::Summarizer;
use crate::usage::Usage;

/// A tool call with a fresh unique id.
pub(crate) fn tool_call(name: &str, arguments: &str) -> ToolCall {
    ToolCall {
        id: format!("call_{}", uuid::Uuid::new_v4().simple()),
        name: name.to_string(),
        arguments: arguments.to_string(),
    }
}

fn scripted_info() -> Map<String, Value> {
    let mut info = Map::new();
    info.insert("input_tokens".to_string(), json!(10));
    info.insert("output_tokens".to_string(), json!(5));
    info
}

/// A single-choice response carrying only text.
pub(crate) fn text_response(content: &str) -> ChatResponse {
    ChatResponse {
        choices: vec![Choice {
            content: content.to_string(),
            stop_reason: "stop".to_string(),
            generation_info: Some(scripted_info()),
            ..Choice::default()
        }],
    }
}

/// A single-choice response carrying only tool calls.
pub(crate) fn tool_calls_response(calls: Vec<ToolCall>) -> ChatResponse {
    ChatResponse {
        choices: vec![Choice {
            stop_reason: "tool_calls".to_string(),
            tool_calls: calls,
            generation_info: Some(scripted_info()),
            ..Choice::default()
        }],
    }
}

enum ScriptEntry {
    Response {
        response: Result<ChatResponse>,
        chunks: Vec<ProviderChunk>,
    },
    Hook(Box<dyn FnOnce() -> Result<ChatResponse> + Send>),
}

/// An `LlmClient` that replays a scripted sequence of responses and records
/// every invocation.
#[derive(Default)]
pub(crate) struct ScriptedClient {
    tool_script: Mutex<VecDeque<ScriptEntry>>,
    simple_script: Mutex<VecDeque<Result<ChatResponse>>>,
    pub tool_invocations: Mutex<Vec<AgentKind>>,
    pub simple_invocations: Mutex<Vec<AgentKind>>,
    pub tool_chains: Mutex<Vec<Chain>>,
    pub simple_chains: Mutex<Vec<Chain>>,
}

impl ScriptedClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_tool_calls(&self, calls: Vec<ToolCall>) {
        self.push_entry(Ok(tool_calls_response(calls)), Vec::new());
    }

    pub fn push_text(&self, content: &str) {
        self.push_entry(Ok(text_response(content)), Vec::new());
    }

    pub fn push_empty(&self) {
        self.push_entry(
            Ok(ChatResponse {
                choices: vec![Choice {
                    stop_reason: "stop".to_string(),
                    ..Choice::default()
                }],
            }),
            Vec::new(),
        );
    }

    pub fn push_error(&self, err: PerformError) {
        self.push_entry(Err(err), Vec::new());
    }

    pub fn push_streamed(&self, response: ChatResponse, chunks: Vec<ProviderChunk>) {
        self.push_entry(Ok(response), chunks);
    }

    pub fn push_hook(&self, hook: impl FnOnce() -> Result<ChatResponse> + Send + 'static) {
        self.tool_script
            .lock()
            .unwrap()
            .push_back(ScriptEntry::Hook(Box::new(hook)));
    }

    pub fn push_simple(&self, response: Result<ChatResponse>) {
        self.simple_script.lock().unwrap().push_back(response);
    }

    pub fn push_simple_text(&self, content: &str) {
        self.push_simple(Ok(text_response(content)));
    }

    pub fn total_calls(&self) -> usize {
        self.tool_invocations.lock().unwrap().len() + self.simple_invocations.lock().unwrap().len()
    }

    /// The chain passed to the most recent tool-enabled call.
    pub fn last_chain(&self) -> Chain {
        self.tool_chains.lock().unwrap().last().cloned().unwrap()
    }

    fn push_entry(&self, response: Result<ChatResponse>, chunks: Vec<ProviderChunk>) {
        self.tool_script
            .lock()
            .unwrap()
            .push_back(ScriptEntry::Response { response, chunks });
    }
}

#[async_trait]
impl LlmClient for ScriptedClient {
    async fn call(
        &self,
        cancel: CancellationToken,
        agent: AgentKind,
        chain: &[Message],
    ) -> Result<ChatResponse> {
        if cancel.is_cancelled() {
            return Err(PerformError::Cancelled);
        }
        self.simple_invocations.lock().unwrap().push(agent);
        self.simple_chains.lock().unwrap().push(chain.to_vec());
        self.simple_script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(PerformError::Provider("simple script exhausted".to_string())))
    }

    async fn call_with_tools(
        &self,
        cancel: CancellationToken,
        agent: AgentKind,
        chain: &[Message],
        _tools: &[ToolSchema],
        on_chunk: Option<ChunkCallback>,
    ) -> Result<ChatResponse> {
        if cancel.is_cancelled() {
            return Err(PerformError::Cancelled);
        }
        self.tool_invocations.lock().unwrap().push(agent);
        self.tool_chains.lock().unwrap().push(chain.to_vec());

        let entry = self.tool_script.lock().unwrap().pop_front();
        match entry {
            Some(ScriptEntry::Response { response, chunks }) => {
                if let Some(on_chunk) = on_chunk {
                    for chunk in chunks {
                        on_chunk(chunk).await?;
                    }
                }
                response
            }
            Some(ScriptEntry::Hook(hook)) => hook(),
            None => Err(PerformError::Provider("script exhausted".to_string())),
        }
    }

    fn usage(&self, info: &Map<String, Value>) -> (i64, i64) {
        let read = |key: &str| info.get(key).and_then(Value::as_i64).unwrap_or(0);
        (read("input_tokens"), read("output_tokens"))
    }
}

/// What one `execute` invocation received.
pub(crate) struct ExecRecord {
    pub stream_id: i64,
    pub tool_call_id: String,
    pub name: String,
    pub reasoning: String,
    pub arguments: String,
}

/// A `ToolExecutor` replaying scripted outcomes and recording every
/// execution and schema lookup.
#[derive(Default)]
pub(crate) struct ScriptedExecutor {
    script: Mutex<VecDeque<Result<String>>>,
    pub executed: Mutex<Vec<ExecRecord>>,
    pub schema_lookups: Mutex<Vec<String>>,
    barriers: HashSet<String>,
    missing_schemas: HashSet<String>,
    schemas: HashMap<String, ToolSchema>,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_barrier(mut self, name: &str) -> Self {
        self.barriers.insert(name.to_string());
        self
    }

    pub fn with_missing_schema(mut self, name: &str) -> Self {
        self.missing_schemas.insert(name.to_string());
        self
    }

    pub fn push(&self, outcome: Result<String>) {
        self.script.lock().unwrap().push_back(outcome);
    }

    pub fn push_ok(&self, observation: &str) {
        self.push(Ok(observation.to_string()));
    }

    pub fn push_err(&self, message: &str) {
        self.push(Err(PerformError::Tool(message.to_string())));
    }

    fn default_schema(&self, name: &str) -> ToolSchema {
        self.schemas.get(name).cloned().unwrap_or_else(|| ToolSchema {
            name: name.to_string(),
            description: "scripted tool".to_string(),
            parameters: json!({"type": "object"}),
        })
    }
}

#[async_trait]
impl ToolExecutor for ScriptedExecutor {
    async fn execute(
        &self,
        cancel: CancellationToken,
        stream_id: i64,
        tool_call_id: &str,
        name: &str,
        reasoning: &str,
        arguments: &str,
    ) -> Result<String> {
        if cancel.is_cancelled() {
            return Err(PerformError::Cancelled);
        }
        self.executed.lock().unwrap().push(ExecRecord {
            stream_id,
            tool_call_id: tool_call_id.to_string(),
            name: name.to_string(),
            reasoning: reasoning.to_string(),
            arguments: arguments.to_string(),
        });
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(format!("{name} executed")))
    }

    fn tools(&self) -> Vec<ToolSchema> {
        self.schemas.values().cloned().collect()
    }

    fn tool_schema(&self, name: &str) -> Result<ToolSchema> {
        self.schema_lookups.lock().unwrap().push(name.to_string());
        if self.missing_schemas.contains(name) {
            return Err(PerformError::Tool(format!("no schema for '{name}'")));
        }
        Ok(self.default_schema(name))
    }

    fn is_barrier(&self, name: &str) -> bool {
        self.barriers.contains(name)
    }

    fn barrier_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.barriers.iter().cloned().collect();
        names.sort();
        names
    }

    fn barrier_tools(&self) -> Vec<ToolSchema> {
        self.barrier_names()
            .iter()
            .map(|name| self.default_schema(name))
            .collect()
    }
}

/// An `ArgRepairer` replaying scripted repairs; echoes the input arguments
/// when nothing is scripted.
#[derive(Default)]
pub(crate) struct ScriptedRepairer {
    script: Mutex<VecDeque<Result<String>>>,
    /// (name, arguments, prior error) per invocation.
    pub calls: Mutex<Vec<(String, String, String)>>,
}

impl ScriptedRepairer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_fixed(&self, arguments: &str) {
        self.script
            .lock()
            .unwrap()
            .push_back(Ok(arguments.to_string()));
    }

    pub fn push_err(&self, message: &str) {
        self.script
            .lock()
            .unwrap()
            .push_back(Err(PerformError::Provider(message.to_string())));
    }
}

#[async_trait]
impl ArgRepairer for ScriptedRepairer {
    async fn fix_args(
        &self,
        cancel: CancellationToken,
        name: &str,
        arguments: &str,
        _schema: &ToolSchema,
        prior_error: &str,
    ) -> Result<String> {
        if cancel.is_cancelled() {
            return Err(PerformError::Cancelled);
        }
        self.calls.lock().unwrap().push((
            name.to_string(),
            arguments.to_string(),
            prior_error.to_string(),
        ));
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(arguments.to_string()))
    }
}

/// An in-memory `ChainRepository` that accepts writes for any chain id.
#[derive(Default)]
pub(crate) struct MemoryRepository {
    rows: Mutex<HashMap<i64, (Vec<u8>, Usage)>>,
}

impl MemoryRepository {
    /// Decoded chain stored under the id. Panics when nothing was written.
    pub fn chain(&self, chain_id: i64) -> Chain {
        let rows = self.rows.lock().unwrap();
        let (blob, _) = rows.get(&chain_id).expect("chain was never persisted");
        serde_json::from_slice(blob).unwrap()
    }

    /// Accumulated usage stored under the id.
    pub fn usage(&self, chain_id: i64) -> Usage {
        let rows = self.rows.lock().unwrap();
        rows.get(&chain_id).map(|(_, usage)| *usage).unwrap_or_default()
    }
}

#[async_trait]
impl ChainRepository for MemoryRepository {
    async fn update_chain(&self, chain_id: i64, blob: &[u8]) -> Result<()> {
        let mut rows = self.rows.lock().unwrap();
        let row = rows.entry(chain_id).or_default();
        row.0 = blob.to_vec();
        Ok(())
    }

    async fn update_usage(
        &self,
        chain_id: i64,
        input_tokens: i64,
        output_tokens: i64,
    ) -> Result<()> {
        let mut rows = self.rows.lock().unwrap();
        let row = rows.entry(chain_id).or_default();
        row.1.add_usage(&Usage::new(input_tokens, output_tokens));
        Ok(())
    }
}

/// A `StreamSink` recording every chunk it receives.
#[derive(Default)]
pub(crate) struct RecordingSink {
    pub chunks: Mutex<Vec<StreamChunk>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StreamSink for RecordingSink {
    async fn emit(&self, chunk: StreamChunk) -> Result<()> {
        self.chunks.lock().unwrap().push(chunk);
        Ok(())
    }
}

/// A `StreamSink` that rejects every chunk.
pub(crate) struct FailingSink;

#[async_trait]
impl StreamSink for FailingSink {
    async fn emit(&self, _chunk: StreamChunk) -> Result<()> {
        Err(PerformError::Stream("sink closed".to_string()))
    }
}

/// A `Summarizer` replaying scripted outcomes; identity when unscripted.
#[derive(Default)]
pub(crate) struct ScriptedSummarizer {
    script: Mutex<VecDeque<Result<Chain>>>,
}

impl ScriptedSummarizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_ok(&self, chain: Chain) {
        self.script.lock().unwrap().push_back(Ok(chain));
    }

    pub fn push_err(&self, message: &str) {
        self.script
            .lock()
            .unwrap()
            .push_back(Err(PerformError::Summarizer(message.to_string())));
    }
}

#[async_trait]
impl Summarizer for ScriptedSummarizer {
    async fn summarize(&self, _cancel: CancellationToken, chain: &[Message]) -> Result<Chain> {
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(chain.to_vec()))
    }
}

/// A `KnowledgeSink` recording every write, optionally failing them all.
pub(crate) struct RecordingGraph {
    pub records: Mutex<Vec<(String, Vec<GraphMessage>)>>,
    fail: bool,
}

impl RecordingGraph {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(Vec::new()),
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            records: Mutex::new(Vec::new()),
            fail: true,
        }
    }
}

#[async_trait]
impl KnowledgeSink for RecordingGraph {
    fn is_enabled(&self) -> bool {
        true
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(1)
    }

    async fn add_messages(
        &self,
        _cancel: CancellationToken,
        group_id: &str,
        messages: Vec<GraphMessage>,
    ) -> Result<()> {
        if self.fail {
            return Err(PerformError::Graph("graph unavailable".to_string()));
        }
        self.records
            .lock()
            .unwrap()
            .push((group_id.to_string(), messages));
        Ok(())
    }
}

/// A `Prompter` that embeds the template kind and variables into the
/// rendered text, so tests can assert on what reached a prompt.
pub(crate) struct StaticPrompter;

impl Prompter for StaticPrompter {
    fn render(&self, kind: TemplateKind, vars: &Value) -> Result<String> {
        Ok(format!("{kind:?} {vars}"))
    }
}

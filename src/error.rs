//! # Error Handling for the Chain Performer
//!
//! This module defines the centralized error type for the crate. It provides
//! a unified `Result` alias and a `PerformError` enum covering every failure
//! class a chain run can hit, from transport errors to recovery exhaustion.
//!
//! Collaborator traits (LLM client, tool executor, repositories, sinks)
//! return `PerformError` as well, so errors propagate through the loop with
//! `?` and surface to the caller as a single wrapped failure naming the first
//! fatal condition.
//!
//! Cancellation is deliberately its own variant: a fired cancellation signal
//! must preempt retries and must never be mistaken for a tool or transport
//! failure that recovery logic would try to repair.

use thiserror::Error;

/// A specialized `Result` type for chain performer operations.
pub type Result<T> = std::result::Result<T, PerformError>;

/// The error enum for every failure a chain run can produce.
#[derive(Debug, Error)]
pub enum PerformError {
    /// The ambient cancellation signal fired. Surfaced immediately without
    /// retrying and without persisting partially built messages.
    #[error("operation cancelled")]
    Cancelled,

    /// All attempts of a model call failed. Carries every attempt error.
    #[error("failed to call agent chain: max retries reached, {attempts}: {causes}")]
    CallExhausted { attempts: usize, causes: String },

    /// A single model attempt produced neither content nor tool calls.
    /// Retryable inside the caller; never escapes it.
    #[error("no content and tool calls in response: stop reason '{stop_reason}'")]
    EmptyResponse { stop_reason: String },

    /// An error reported by the LLM transport driver.
    #[error("provider error: {0}")]
    Provider(String),

    /// A tool execution kept failing after every repair attempt.
    #[error("failed to exec function '{name}': reached max retries to call function: {message}")]
    ToolExhausted { name: String, message: String },

    /// An error raised by a tool implementation.
    #[error("tool error: {0}")]
    Tool(String),

    /// The executor could not supply the JSON schema for a tool.
    #[error("failed to get tool schema for '{name}': {message}")]
    SchemaLookup { name: String, message: String },

    /// The argument-repair helper failed to produce repaired arguments.
    #[error("failed to fix tool call args for '{name}': {message}")]
    ArgRepair { name: String, message: String },

    /// The reflector hit its per-iteration recursion cap.
    #[error("reflector called too many times")]
    ReflectorLimit,

    /// A prompt template failed to render.
    #[error("template render error: {0}")]
    Template(String),

    /// The stream sink rejected a chunk during assistant finalization.
    #[error("failed to stream assistant result: {0}")]
    Stream(String),

    /// Chain or usage persistence failed. Fatal for the loop.
    #[error("repository error: {0}")]
    Repository(String),

    /// JSON serialization or deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// An error from the SQLite store.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A summarizer failure. The loop logs it and keeps the chain unchanged.
    #[error("summarizer error: {0}")]
    Summarizer(String),

    /// A knowledge-graph sink failure. Logged and swallowed.
    #[error("knowledge sink error: {0}")]
    Graph(String),
}

impl PerformError {
    /// True when the error is the ambient cancellation signal.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, PerformError::Cancelled)
    }
}

//! Out-of-band streaming channel for incremental model output.
//!
//! While a model call is in flight the performer forwards text deltas to an
//! attached [`StreamSink`] so a UI can render them live. Each streamed turn is
//! scoped by a `stream_id` drawn from an atomic counter; `0` means the chunk
//! belongs to no stream. `Flush` delimits the end of a streamed turn and
//! `Update` replaces every preceding delta with the final authoritative text.
//!
//! The sink is process-wide and may be called concurrently from many loops,
//! so implementations must be thread-safe.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// The message-log category a chunk belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MsgLogType {
    /// A model answer, streamed or final.
    Answer,
    /// A generated report artifact.
    Report,
    /// A question raised back to the user.
    Question,
}

/// One chunk of a streamed model turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamChunk {
    /// Reasoning text delta.
    Thinking {
        stream_id: i64,
        msg_type: MsgLogType,
        text: String,
    },
    /// Answer text delta.
    Content {
        stream_id: i64,
        msg_type: MsgLogType,
        text: String,
    },
    /// A tool invocation surfaced mid-stream by a tool runtime.
    ToolCall {
        stream_id: i64,
        msg_type: MsgLogType,
        name: String,
        text: String,
    },
    /// End-of-stream marker for one turn.
    Flush { stream_id: i64, msg_type: MsgLogType },
    /// Final authoritative content replacing the accumulated deltas.
    Update {
        stream_id: i64,
        msg_type: MsgLogType,
        content: String,
        thinking: String,
    },
}

impl StreamChunk {
    pub fn stream_id(&self) -> i64 {
        match self {
            StreamChunk::Thinking { stream_id, .. }
            | StreamChunk::Content { stream_id, .. }
            | StreamChunk::ToolCall { stream_id, .. }
            | StreamChunk::Flush { stream_id, .. }
            | StreamChunk::Update { stream_id, .. } => *stream_id,
        }
    }
}

/// Receiver of streamed chunks. Shared across loops; must be thread-safe.
#[async_trait]
pub trait StreamSink: Send + Sync {
    async fn emit(&self, chunk: StreamChunk) -> Result<()>;
}

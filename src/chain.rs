//! # Conversation Data Model
//!
//! This module defines the message chain the performer drives: role-tagged
//! messages whose content is an ordered list of parts. A part is plain text,
//! reasoning text, a tool call emitted by the model, or the response a tool
//! produced for a call.
//!
//! The chain is the durable unit of a run. It serializes to a tagged JSON
//! array and round-trips every part kind losslessly, so a stored chain can be
//! reloaded and resumed.
//!
//! ## Invariants
//!
//! - The first message of a chain is a system message.
//! - A tool-call part is always answered, before the next ai message, by a
//!   tool-response part with the same id.
//! - Within one loop iteration the chain is append-only; earlier messages are
//!   never rewritten.
//!
//! ### Example: Building a Short Chain
//!
//! ```rust
//! use agent_chain::chain::{last_human_message, Message, Role};
//!
//! let chain = vec![
//!     Message::system("You are a research agent."),
//!     Message::human("Scan the target network."),
//! ];
//!
//! assert_eq!(chain[0].role, Role::System);
//! assert_eq!(last_human_message(&chain), "Scan the target network.");
//! ```

use serde::{Deserialize, Serialize};

/// The author of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Instructions that frame the whole conversation.
    System,
    /// The end user or an injected corrective prompt.
    Human,
    /// The model.
    Ai,
    /// A tool answering a call.
    Tool,
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Provider-assigned identifier pairing the call with its response.
    pub id: String,
    /// Name of the function to execute.
    pub name: String,
    /// Raw argument blob as the model emitted it. Kept as text because the
    /// model can produce malformed JSON that the repair pass later rewrites.
    pub arguments: String,
}

/// One element of a message's content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    /// Assistant or human text.
    Text { text: String },
    /// Model reasoning text, carried separately from the answer.
    Reasoning { text: String },
    /// A tool call emitted by the model.
    ToolCall(ToolCall),
    /// The observation a tool produced for a call.
    ToolResponse {
        id: String,
        name: String,
        content: String,
    },
}

/// A single message: a role plus an ordered list of parts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub parts: Vec<ContentPart>,
}

impl Message {
    /// A message holding a single text part.
    pub fn text(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            parts: vec![ContentPart::Text { text: text.into() }],
        }
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::text(Role::System, text)
    }

    pub fn human(text: impl Into<String>) -> Self {
        Self::text(Role::Human, text)
    }

    pub fn ai(text: impl Into<String>) -> Self {
        Self::text(Role::Ai, text)
    }

    /// An ai message carrying only tool calls.
    pub fn ai_tool_calls(calls: Vec<ToolCall>) -> Self {
        Self {
            role: Role::Ai,
            parts: calls.into_iter().map(ContentPart::ToolCall).collect(),
        }
    }

    /// A tool message answering the call with the given id.
    pub fn tool_response(
        id: impl Into<String>,
        name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            role: Role::Tool,
            parts: vec![ContentPart::ToolResponse {
                id: id.into(),
                name: name.into(),
                content: content.into(),
            }],
        }
    }

    /// Joins the text parts of the message with newlines.
    pub fn text_content(&self) -> String {
        let texts: Vec<&str> = self
            .parts
            .iter()
            .filter_map(|part| match part {
                ContentPart::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect();
        texts.join("\n")
    }

    /// The tool calls carried by this message, in emission order.
    pub fn tool_calls(&self) -> Vec<&ToolCall> {
        self.parts
            .iter()
            .filter_map(|part| match part {
                ContentPart::ToolCall(call) => Some(call),
                _ => None,
            })
            .collect()
    }
}

/// The ordered message sequence constituting one conversation.
pub type Chain = Vec<Message>;

/// Text of the most recent human message, scanning the chain in reverse.
/// Empty when the chain holds no human message.
pub fn last_human_message(chain: &[Message]) -> String {
    chain
        .iter()
        .rev()
        .find(|message| message.role == Role::Human)
        .map(Message::text_content)
        .unwrap_or_default()
}

//! # Agent Chain Performer
//!
//! A library for driving a large language model through autonomous
//! reason → act → observe cycles. The performer repeatedly prompts the
//! model over a growing message chain, parses its output into tool calls,
//! executes them through an injected tool registry, feeds the observations
//! back into the chain, and durably persists the conversation after every
//! mutation. It recovers from degenerate model behavior along the way:
//! empty responses are retried, rejected tool arguments are repaired
//! against the tool's schema, a repeating tool call is answered with an
//! advisory instead of being executed again, and a model that talks instead
//! of acting is coached back on track by a reflection sub-chain.
//!
//! ## Core Concepts
//!
//! - **[`ChainPerformer`]**: the top-level loop driver. One instance serves
//!   one flow; each [`perform`] call owns a chain until a barrier tool
//!   fires, an assistant answer finalizes it, or a sub-component fails
//!   beyond recovery.
//! - **[`Chain`]**: the ordered message sequence of one conversation.
//!   Messages carry polymorphic parts (text, reasoning, tool calls, tool
//!   responses) and serialize losslessly for storage.
//! - **[`AgentKind`]**: the role a run executes under. Only the assistant
//!   finalizes on a prose answer; every other kind engages the reflector.
//! - **Collaborator traits**: the LLM transport ([`LlmClient`]), tool
//!   registry ([`ToolExecutor`]), argument repair ([`ArgRepairer`]), prompt
//!   templates ([`Prompter`]), chain persistence ([`ChainRepository`]),
//!   stream sink ([`StreamSink`]), summarizer ([`Summarizer`]), and
//!   knowledge graph ([`KnowledgeSink`]) all live upstream and are injected
//!   as trait objects.
//!
//! The crate has no CLI or HTTP surface; it is consumed by a service layer
//! that owns routing, authentication, and the tool implementations.
//!
//! ## Example: Wiring a Performer
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use agent_chain::{
//!     AgentKind, ChainPerformer, ChainStore, LoopScope, Message, SqliteChainRepository,
//! };
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run(
//! #     client: Arc<dyn agent_chain::LlmClient>,
//! #     executor: Arc<dyn agent_chain::ToolExecutor>,
//! #     repairer: Arc<dyn agent_chain::ArgRepairer>,
//! #     prompter: Arc<dyn agent_chain::Prompter>,
//! # ) -> agent_chain::Result<()> {
//! let repo = Arc::new(SqliteChainRepository::new("chains.db").await?);
//! let chain = vec![
//!     Message::system("You are an autonomous agent."),
//!     Message::human("Audit the staging host."),
//! ];
//! let chain_id = repo.create_chain(&chain).await?;
//!
//! let performer = ChainPerformer::new(
//!     client,
//!     executor,
//!     repairer,
//!     prompter,
//!     ChainStore::new(repo),
//!     1,
//! );
//!
//! let final_chain = performer
//!     .perform(
//!         CancellationToken::new(),
//!         AgentKind::Primary,
//!         chain_id,
//!         LoopScope::default(),
//!         chain,
//!     )
//!     .await?;
//! # let _ = final_chain;
//! # Ok(())
//! # }
//! ```
//!
//! [`perform`]: ChainPerformer::perform

pub mod agent;
pub mod caller;
pub mod chain;
pub mod client;
pub mod config;
pub mod detector;
pub mod error;
pub mod executor;
pub mod graph;
mod invoker;
pub mod performer;
pub mod prompter;
mod reflector;
pub mod store;
pub mod stream;
pub mod summarizer;
pub mod usage;

#[cfg(test)]
pub(crate) mod testing;

pub use agent::AgentKind;
pub use caller::CallResult;
pub use chain::{last_human_message, Chain, ContentPart, Message, Role, ToolCall};
pub use client::{ChatResponse, Choice, ChunkCallback, LlmClient, ProviderChunk};
pub use config::PerformerConfig;
pub use detector::RepetitionDetector;
pub use error::{PerformError, Result};
pub use executor::{ArgRepairer, ToolExecutor, ToolSchema};
pub use graph::{GraphMessage, KnowledgeSink};
pub use performer::{ChainPerformer, LoopScope};
pub use prompter::{Prompter, TemplateKind};
pub use store::{ChainRepository, ChainStore, SqliteChainRepository};
pub use stream::{MsgLogType, StreamChunk, StreamSink};
pub use summarizer::Summarizer;
pub use usage::Usage;

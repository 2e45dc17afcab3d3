//! Corrective sub-chain for a model that answers with prose instead of
//! acting.
//!
//! When a non-assistant agent returns zero tool calls, the reflector
//! diagnoses the stall: it renders a pair of prompts around the offending
//! prose (barrier tool descriptions, current time, execution context, the
//! last human request), asks a dedicated reflector agent for advice, injects
//! that advice as a new human message, and re-runs the original agent. The
//! cycle repeats until the model acts or the depth cap is hit.
//!
//! The advice sub-chain is allowed to fail; a fixed placeholder instruction
//! takes its place rather than aborting the run. The depth cap is a hard
//! failure.

use chrono::Utc;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{info_span, warn, Instrument};

use crate::agent::AgentKind;
use crate::caller::CallResult;
use crate::chain::{Chain, Message};
use crate::error::{PerformError, Result};
use crate::performer::{clip, ChainPerformer, LoopScope, LOG_FIELD_LIMIT, TOOL_ADVICE_PLACEHOLDER};
use crate::prompter::TemplateKind;

impl ChainPerformer {
    /// Runs reflection rounds until the re-prompted model produces tool
    /// calls, up to `max_reflector_calls` rounds.
    ///
    /// `chain` is the working copy with the offending prose already appended
    /// as an ai message; the detour stays local to the reflector and is
    /// never persisted.
    pub(crate) async fn reflect(
        &self,
        cancel: &CancellationToken,
        origin: AgentKind,
        chain_id: i64,
        scope: &LoopScope,
        mut chain: Chain,
        human_message: String,
        mut content: String,
    ) -> Result<CallResult> {
        for iteration in 1..=self.config.max_reflector_calls {
            let span = info_span!(
                "reflector",
                origin = %origin,
                chain_id,
                iteration,
            );

            let outcome = self
                .reflect_once(cancel, origin, chain_id, scope, &mut chain, &human_message, &content)
                .instrument(span)
                .await?;

            match outcome {
                Some(result) => return Ok(result),
                None => {
                    // the model answered with prose again; the new prose is
                    // already on the working chain, go around once more
                    content = match chain.last() {
                        Some(message) => message.text_content(),
                        None => String::new(),
                    };
                }
            }
        }

        warn!(
            chain_id,
            origin = %origin,
            content = clip(&content, LOG_FIELD_LIMIT),
            "reflector limit calls reached"
        );
        Err(PerformError::ReflectorLimit)
    }

    /// One reflection round. Returns `Some(result)` when the re-prompted
    /// model produced tool calls, `None` when it answered with prose again.
    #[allow(clippy::too_many_arguments)]
    async fn reflect_once(
        &self,
        cancel: &CancellationToken,
        origin: AgentKind,
        chain_id: i64,
        scope: &LoopScope,
        chain: &mut Chain,
        human_message: &str,
        content: &str,
    ) -> Result<Option<CallResult>> {
        warn!(
            chain_id,
            origin = %origin,
            content = clip(content, LOG_FIELD_LIMIT),
            "got message instead of tool call"
        );

        let user_vars = json!({
            "message": content,
            "barrier_tool_names": self.executor.barrier_names(),
        });
        let mut system_vars = json!({
            "barrier_tools": self.executor.barrier_tools(),
            "current_time": Utc::now().to_rfc3339(),
            "execution_context": scope.execution_context,
        });
        if !human_message.is_empty() {
            system_vars["request"] = json!(human_message);
        }

        let user_prompt = self
            .prompter
            .render(TemplateKind::ReflectorQuestion, &user_vars)?;
        let system_prompt = self
            .prompter
            .render(TemplateKind::ReflectorSystem, &system_vars)?;

        let advice = match self
            .call_simple(cancel, AgentKind::Reflector, system_prompt, user_prompt)
            .await
        {
            Ok(advice) => advice,
            Err(PerformError::Cancelled) => return Err(PerformError::Cancelled),
            Err(err) => {
                warn!(chain_id, error = %err, "reflector advice chain failed, using placeholder");
                TOOL_ADVICE_PLACEHOLDER.to_string()
            }
        };

        chain.push(Message::human(advice));

        let result = self.call_with_retries(cancel, chain, origin).await?;
        self.persist_usage(chain_id, result.info.as_ref()).await?;

        if result.has_tool_calls() {
            return Ok(Some(result));
        }

        chain.push(Message::ai(result.content.clone()));
        Ok(None)
    }
}

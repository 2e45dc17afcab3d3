//! Execution of one parsed tool call, with repair-driven retries.

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::caller::CallResult;
use crate::detector::RepetitionDetector;
use crate::error::{PerformError, Result};
use crate::performer::{clip, ChainPerformer, LOG_FIELD_LIMIT};

impl ChainPerformer {
    /// Executes the `idx`-th tool call of a call result and returns its
    /// observation.
    ///
    /// A call flagged by the repetition detector is not executed; a
    /// human-readable advisory becomes the observation instead and the chain
    /// continues. A failing execution goes through schema lookup and
    /// argument repair before the next attempt, up to `max_tool_retries`
    /// attempts. Cancellation propagates untouched.
    pub(crate) async fn exec_tool_call(
        &self,
        cancel: &CancellationToken,
        chain_id: i64,
        idx: usize,
        result: &CallResult,
        detector: &mut RepetitionDetector,
    ) -> Result<String> {
        // stream id and reasoning ride along only with the first call of a
        // response; repeating them would double-attribute the streamed text
        let (stream_id, reasoning) = if idx == 0 {
            (result.stream_id, result.reasoning.as_str())
        } else {
            (0, "")
        };

        let call = &result.tool_calls[idx];
        let mut arguments = call.arguments.clone();

        if detector.observe(call) {
            warn!(
                chain_id,
                func_name = %call.name,
                tool_call_id = %call.id,
                "failed to exec function: tool call is repeating"
            );
            return Ok(format!(
                "tool call '{}' is repeating, please try another tool",
                call.name
            ));
        }

        let mut last_error = String::new();
        for attempt in 0..self.config.max_tool_retries {
            debug!(
                chain_id,
                func_name = %call.name,
                func_args = clip(&arguments, LOG_FIELD_LIMIT),
                tool_call_id = %call.id,
                attempt,
                "executing tool call"
            );

            match self
                .executor
                .execute(
                    cancel.clone(),
                    stream_id,
                    &call.id,
                    &call.name,
                    reasoning,
                    &arguments,
                )
                .await
            {
                Ok(observation) => return Ok(observation),
                Err(PerformError::Cancelled) => return Err(PerformError::Cancelled),
                Err(err) => {
                    warn!(
                        chain_id,
                        func_name = %call.name,
                        error = %err,
                        "failed to exec function"
                    );
                    last_error = err.to_string();

                    let schema = self.executor.tool_schema(&call.name).map_err(|err| {
                        PerformError::SchemaLookup {
                            name: call.name.clone(),
                            message: err.to_string(),
                        }
                    })?;

                    arguments = self
                        .repairer
                        .fix_args(cancel.clone(), &call.name, &arguments, &schema, &last_error)
                        .await
                        .map_err(|err| match err {
                            PerformError::Cancelled => PerformError::Cancelled,
                            err => PerformError::ArgRepair {
                                name: call.name.clone(),
                                message: err.to_string(),
                            },
                        })?;
                }
            }
        }

        Err(PerformError::ToolExhausted {
            name: call.name.clone(),
            message: last_error,
        })
    }
}

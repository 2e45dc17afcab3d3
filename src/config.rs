//! Retry and recursion limits for the performer.
//!
//! Mirrors the recovery budget of the loop: how many times a model call is
//! retried, how many times a failing tool call is repaired and re-run, how
//! deep the reflector may go within one iteration, and how long the loop
//! waits between model call attempts.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Recovery budget for one chain run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformerConfig {
    /// Maximum attempts for a single model call.
    pub max_call_retries: usize,

    /// Maximum attempts for a single tool call, each retry preceded by an
    /// argument-repair pass.
    pub max_tool_retries: usize,

    /// Maximum reflector rounds per loop iteration.
    pub max_reflector_calls: usize,

    /// Delay between model call attempts. The wait aborts early when the
    /// cancellation signal fires.
    pub retry_delay: Duration,
}

impl Default for PerformerConfig {
    fn default() -> Self {
        Self {
            max_call_retries: 3,
            max_tool_retries: 3,
            max_reflector_calls: 3,
            retry_delay: Duration::from_secs(5),
        }
    }
}

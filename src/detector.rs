//! Loop-local guard against the model issuing an identical tool call twice.

use std::collections::VecDeque;

use crate::chain::ToolCall;

/// How many recent calls a detector remembers. Wide enough to cover several
/// multi-call responses without letting stale fingerprints linger forever.
const WINDOW: usize = 8;

/// Remembers the last few (function name, normalized arguments) fingerprints
/// of the current loop and reports when the next call matches one of them.
///
/// The window is never reset during a run; a fingerprint simply ages out once
/// eight newer calls have been observed.
#[derive(Debug, Default)]
pub struct RepetitionDetector {
    seen: VecDeque<(String, String)>,
}

impl RepetitionDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the call and returns true when its fingerprint matches one
    /// observed strictly earlier in the window.
    pub fn observe(&mut self, call: &ToolCall) -> bool {
        let fingerprint = (call.name.clone(), normalize(&call.arguments));
        let repeated = self.seen.iter().any(|seen| *seen == fingerprint);

        if self.seen.len() == WINDOW {
            self.seen.pop_front();
        }
        self.seen.push_back(fingerprint);

        repeated
    }
}

/// Canonicalizes an argument blob so formatting differences don't defeat the
/// comparison. Valid JSON is re-serialized (sorted keys, no whitespace);
/// anything else is compared as trimmed text.
fn normalize(arguments: &str) -> String {
    match serde_json::from_str::<serde_json::Value>(arguments) {
        Ok(value) => value.to_string(),
        Err(_) => arguments.trim().to_string(),
    }
}

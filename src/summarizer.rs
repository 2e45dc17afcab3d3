//! Chain compaction contract.
//!
//! Between iterations the loop may hand the chain to a summarizer that
//! compacts older exchanges to relieve token pressure. Summarization is
//! best-effort: the loop logs a failure and keeps running with the chain it
//! already has.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::chain::{Chain, Message};
use crate::error::Result;

/// Compacts a chain between loop iterations.
#[async_trait]
pub trait Summarizer: Send + Sync {
    /// Returns the compacted chain. Implementations must not mutate the
    /// input and must return an error rather than a partial result; the
    /// caller keeps the original chain on error.
    async fn summarize(&self, cancel: CancellationToken, chain: &[Message]) -> Result<Chain>;
}

//! Request middleware hooks
//!
//! Hooks run around the executor: pre-hooks before the request (header
//! stamping, politeness checks), post-hooks after the response and before the
//! handler (content-type gates, response rewriting). Hooks run in
//! registration order and the first error aborts the attempt, which then goes
//! through the normal retry path.

use crate::crawler::CrawlContext;
use crate::DriftnetError;
use async_trait::async_trait;
use std::sync::Arc;

/// A middleware step with mutable access to the crawl context
#[async_trait]
pub trait Hook: Send + Sync {
    async fn call(&self, ctx: &mut CrawlContext) -> crate::Result<()>;
}

/// Runs hooks in order, stopping at the first error
pub(crate) async fn run_hooks(
    hooks: &[Arc<dyn Hook>],
    ctx: &mut CrawlContext,
) -> crate::Result<()> {
    for hook in hooks {
        hook.call(ctx)
            .await
            .map_err(|e| DriftnetError::Hook(e.to_string()))?;
    }
    Ok(())
}

//! Per-system result collection.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use crate::action::ActionContext;
use crate::error::{ActionError, ExecError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectResult {
    Success,
    Error,
}

/// Evaluates one system an action signalled as done (pass/fail, metrics).
/// Collectors typically record their measurements through
/// `ctx.report_repository()`.
#[async_trait]
pub trait Collector: Send + Sync {
    fn name(&self) -> &str;

    async fn collect(&self, ctx: &ActionContext, system_id: &str) -> Result<CollectResult, ActionError>;
}

/// Run `collectors` in order. The first non-success verdict (or collector
/// error, which is logged) decides; no collectors means success.
pub async fn collect_all(
    collectors: &[Arc<dyn Collector>],
    ctx: &ActionContext,
    system_id: &str,
) -> CollectResult {
    for collector in collectors {
        match collector.collect(ctx, system_id).await {
            Ok(CollectResult::Success) => {}
            Ok(CollectResult::Error) => return CollectResult::Error,
            Err(e) => {
                let err = ExecError::Collection {
                    system: system_id.to_string(),
                    reason: format!("{}: {}", collector.name(), e),
                };
                warn!(action = ctx.action_name(), error = %err, "collector failed");
                return CollectResult::Error;
            }
        }
    }
    CollectResult::Success
}

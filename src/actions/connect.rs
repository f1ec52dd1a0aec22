//! Lazy connection to the compute API.

use crate::context::Context;
use crate::pipeline::{Action, Next, StepFuture};

/// Builds the compute handle for the machine's zone.
#[derive(Clone, Copy, Debug, Default)]
pub struct ConnectCompute;

impl Action for ConnectCompute {
    fn name(&self) -> &'static str {
        "ConnectCompute"
    }

    fn call<'c>(&'c self, ctx: &'c mut Context, next: Next<'c>) -> StepFuture<'c> {
        Box::pin(async move {
            ctx.compute()?;
            tracing::debug!(
                project = %ctx.zone_config().project_id,
                zone = %ctx.zone_config().zone,
                "connected to compute API"
            );
            next.run(ctx).await
        })
    }
}

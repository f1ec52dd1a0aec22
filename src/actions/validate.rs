//! Configuration validation step.

use crate::context::Context;
use crate::pipeline::{Action, Next, StepFuture};

/// Validates the zone configuration unless the run disabled validation.
#[derive(Clone, Copy, Debug, Default)]
pub struct ConfigValidate;

impl Action for ConfigValidate {
    fn name(&self) -> &'static str {
        "ConfigValidate"
    }

    fn call<'c>(&'c self, ctx: &'c mut Context, next: Next<'c>) -> StepFuture<'c> {
        Box::pin(async move {
            if ctx.config_validate {
                ctx.zone_config().validate()?;
            }
            next.run(ctx).await
        })
    }
}

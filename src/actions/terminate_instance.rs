//! Instance deletion and teardown of half-built launches.

use crate::compute::ComputeError;
use crate::context::Context;
use crate::pipeline::{Action, Next, StepFuture};

use super::templates;

/// Deletes the machine's instance and forgets its identity.
///
/// A missing instance is not an error; the identity is cleared either way so
/// a second destroy is a no-op.
#[derive(Clone, Copy, Debug, Default)]
pub struct TerminateInstance;

impl Action for TerminateInstance {
    fn name(&self) -> &'static str {
        "TerminateInstance"
    }

    fn call<'c>(&'c self, ctx: &'c mut Context, next: Next<'c>) -> StepFuture<'c> {
        Box::pin(async move {
            if let Some(id) = ctx.machine.id().map(str::to_owned) {
                let compute = ctx.compute()?;
                let zone = ctx.zone_config().zone.clone();
                ctx.ui.info("Terminating the instance...");
                match compute.get_instance(&id, &zone).await {
                    Ok(_) => {
                        compute.delete_instance(&id, &zone).await?;
                    }
                    Err(ComputeError::NotFound { .. }) => {
                        tracing::info!(instance = %id, "instance already gone");
                    }
                    Err(err) => return Err(err.into()),
                }
            }
            ctx.machine.clear_id()?;
            next.run(ctx).await
        })
    }
}

/// Tears down a half-built instance by running the destroy pipeline on a
/// derived context, then adopts the derived machine identity.
///
/// Failures are logged and reported to the operator but never returned, so
/// they cannot mask the error that triggered the teardown.
pub(super) async fn teardown(ctx: &mut Context) {
    ctx.ui.warn("Terminating the instance after an incomplete launch...");
    let mut derived = ctx.teardown_context();
    let destroy = templates::destroy();
    if let Err(err) = destroy.run(&mut derived).await {
        tracing::warn!(error = %err, "teardown failed");
        ctx.ui
            .error(&format!("Failed to terminate the instance: {err}"));
    }
    ctx.machine = derived.machine;
}

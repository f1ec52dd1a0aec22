//! Stopping a running instance.

use crate::context::Context;
use crate::poll::PollLimit;
use crate::pipeline::{Action, Next, StepFuture};
use crate::state::LifecycleState;

use super::wait::{require_ready, wait_for_operation};

/// Stops the machine's instance and waits for the stop operation to finish.
#[derive(Clone, Copy, Debug, Default)]
pub struct StopInstance;

impl Action for StopInstance {
    fn name(&self) -> &'static str {
        "StopInstance"
    }

    fn call<'c>(&'c self, ctx: &'c mut Context, next: Next<'c>) -> StepFuture<'c> {
        Box::pin(async move {
            let Some(id) = ctx.machine.id().map(str::to_owned) else {
                return next.run(ctx).await;
            };
            let compute = ctx.compute()?;
            let zone = ctx.zone_config().zone.clone();
            let timeout_secs = ctx.zone_config().instance_ready_timeout;

            let instance = compute.get_instance(&id, &zone).await?;
            if LifecycleState::from_status(&instance.status) == Some(LifecycleState::Stopped) {
                ctx.ui.info("Instance is already stopped.");
            } else {
                ctx.ui.info("Stopping the instance...");
                let operation = compute.stop_instance(&id, &zone).await?;
                if operation.is_done() {
                    if let Some(message) = operation.error {
                        return Err(crate::error::ActionError::RemoteApi { message });
                    }
                } else {
                    let outcome = wait_for_operation(
                        ctx,
                        compute.as_ref(),
                        &operation.name,
                        &zone,
                        PollLimit::from_timeout(timeout_secs),
                    )
                    .await?;
                    require_ready(outcome, "stop", timeout_secs)?;
                }
                ctx.machine_state = Some(LifecycleState::Stopped);
            }
            next.run(ctx).await
        })
    }
}

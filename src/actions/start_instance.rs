//! Restarting a stopped instance.

use crate::context::Context;
use crate::error::ActionError;
use crate::pipeline::{Action, Next, StepFuture};
use crate::poll::PollOutcome;
use crate::state::LifecycleState;

use super::read_state::ssh_info_for;
use super::wait::{require_ready, wait_for_guest, wait_for_running};

/// Starts a stopped instance and waits until it and its guest are ready.
///
/// There is no compensation: a start that times out leaves the instance in
/// whatever state the platform reached.
#[derive(Clone, Copy, Debug, Default)]
pub struct StartInstance;

impl Action for StartInstance {
    fn name(&self) -> &'static str {
        "StartInstance"
    }

    fn call<'c>(&'c self, ctx: &'c mut Context, next: Next<'c>) -> StepFuture<'c> {
        Box::pin(async move {
            let Some(id) = ctx.machine.id().map(str::to_owned) else {
                return next.run(ctx).await;
            };
            let compute = ctx.compute()?;
            let config = ctx.zone_config().clone();

            let instance = compute.get_instance(&id, &config.zone).await?;
            if instance.is_ready() {
                ctx.ui.info("Instance is already running.");
                return next.run(ctx).await;
            }

            ctx.ui.info("Starting the instance...");
            compute.start_instance(&id, &config.zone).await?;

            let (outcome, latest) = wait_for_running(ctx, compute.as_ref(), &id).await?;
            require_ready(outcome, "start", config.instance_ready_timeout)?;
            ctx.machine_state = Some(LifecycleState::Running);
            ctx.ssh_info = latest
                .as_ref()
                .and_then(|vm| ssh_info_for(vm, config.use_private_ip, config.ssh_port));

            if wait_for_guest(ctx).await? == PollOutcome::Cancelled {
                return Err(ActionError::Interrupted);
            }
            next.run(ctx).await
        })
    }
}

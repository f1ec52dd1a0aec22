//! Actions that publish the machine state and SSH endpoint.

use crate::compute::ComputeError;
use crate::context::Context;
use crate::error::ActionError;
use crate::guest::SshInfo;
use crate::pipeline::{Action, Next, StepFuture};
use crate::state::{LifecycleState, read_state};

/// Reads the current lifecycle state, connecting only when an identity
/// exists, and stores it in the context.
pub(super) async fn refresh_state(ctx: &mut Context) -> Result<LifecycleState, ActionError> {
    let state = if ctx.machine.id().is_none() {
        LifecycleState::NotCreated
    } else {
        let compute = ctx.compute()?;
        let zone = ctx.zone_config().zone.clone();
        read_state(compute.as_ref(), &mut ctx.machine, &zone).await?
    };
    ctx.machine_state = Some(state);
    Ok(state)
}

/// Publishes the machine's lifecycle state in [`Context::machine_state`].
#[derive(Clone, Copy, Debug, Default)]
pub struct ReadState;

impl Action for ReadState {
    fn name(&self) -> &'static str {
        "ReadState"
    }

    fn call<'c>(&'c self, ctx: &'c mut Context, next: Next<'c>) -> StepFuture<'c> {
        Box::pin(async move {
            refresh_state(ctx).await?;
            next.run(ctx).await
        })
    }
}

/// Publishes the guest's SSH endpoint in [`Context::ssh_info`].
#[derive(Clone, Copy, Debug, Default)]
pub struct ReadSshInfo;

impl Action for ReadSshInfo {
    fn name(&self) -> &'static str {
        "ReadSshInfo"
    }

    fn call<'c>(&'c self, ctx: &'c mut Context, next: Next<'c>) -> StepFuture<'c> {
        Box::pin(async move {
            ctx.ssh_info = read_ssh_info(ctx).await?;
            next.run(ctx).await
        })
    }
}

async fn read_ssh_info(ctx: &mut Context) -> Result<Option<SshInfo>, ActionError> {
    let Some(id) = ctx.machine.id().map(str::to_owned) else {
        return Ok(None);
    };
    let compute = ctx.compute()?;
    let config = ctx.zone_config().clone();

    match compute.get_instance(&id, &config.zone).await {
        Ok(instance) => Ok(ssh_info_for(&instance, config.use_private_ip, config.ssh_port)),
        Err(ComputeError::NotFound { .. }) => {
            tracing::info!(instance = %id, "instance vanished; clearing identity");
            ctx.machine.clear_id()?;
            Ok(None)
        }
        Err(err) => Err(err.into()),
    }
}

/// Picks the address the guest is reached on.
pub(super) fn ssh_info_for(
    instance: &crate::compute::Instance,
    use_private_ip: bool,
    port: u16,
) -> Option<SshInfo> {
    let host = if use_private_ip {
        instance.network_ip.clone()
    } else {
        instance
            .nat_ip
            .clone()
            .or_else(|| instance.network_ip.clone())
    }?;
    Some(SshInfo { host, port })
}

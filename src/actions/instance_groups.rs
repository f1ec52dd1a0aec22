//! Unmanaged instance group membership.

use crate::compute::{ComputeError, InstanceGroupSpec};
use crate::context::Context;
use crate::error::ActionError;
use crate::pipeline::{Action, Next, StepFuture};
use crate::poll::{PollLimit, PollOutcome};

use super::run_instance::{network_ref, subnetwork_ref};
use super::wait::wait_for_operation;

/// Adds the new instance to its configured unmanaged instance group,
/// creating the group when it does not exist yet.
#[derive(Clone, Copy, Debug, Default)]
pub struct AssignInstanceGroups;

impl Action for AssignInstanceGroups {
    fn name(&self) -> &'static str {
        "AssignInstanceGroups"
    }

    fn call<'c>(&'c self, ctx: &'c mut Context, next: Next<'c>) -> StepFuture<'c> {
        Box::pin(async move {
            let config = ctx.zone_config().clone();
            let id = ctx.machine.id().map(str::to_owned);
            let (Some(group), Some(id)) = (config.instance_group.clone(), id) else {
                return next.run(ctx).await;
            };
            let group = group.as_str();
            let members = vec![id];
            let compute = ctx.compute()?;

            match compute.get_instance_group(group, &config.zone).await {
                Ok(_) => {}
                Err(ComputeError::NotFound { .. }) => {
                    ctx.ui
                        .info(&format!("Creating instance group '{group}'..."));
                    let spec = InstanceGroupSpec {
                        name: group.to_owned(),
                        zone: config.zone.clone(),
                        network: network_ref(&config),
                        subnetwork: subnetwork_ref(&config),
                        description: String::from("Created by drydock"),
                    };
                    compute.create_instance_group(&spec).await?;
                }
                Err(err) => return Err(err.into()),
            }

            ctx.ui
                .info(&format!("Adding instance to instance group '{group}'..."));
            let operation = compute
                .add_instances_to_group(group, &config.zone, &members)
                .await?;
            if !operation.is_done() {
                ctx.ui.info(&format!(
                    "Waiting for operation '{}' to finish...",
                    operation.name
                ));
                let outcome = wait_for_operation(
                    ctx,
                    compute.as_ref(),
                    &operation.name,
                    &config.zone,
                    PollLimit::Unbounded,
                )
                .await?;
                if outcome != PollOutcome::Ready {
                    return Err(ActionError::Interrupted);
                }
            } else if let Some(message) = operation.error {
                return Err(ActionError::RemoteApi { message });
            }
            next.run(ctx).await
        })
    }
}

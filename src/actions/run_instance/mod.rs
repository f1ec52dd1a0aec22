//! Creates the machine's instance and waits until its guest is reachable.
//!
//! The workflow resolves every reference before mutating anything, creates
//! or reuses disks, submits the instance, records the identity, and then
//! waits. Failures before the instance exists roll back the disks this run
//! created; failures after it exists tear the instance down through the
//! destroy pipeline.

mod disks;
mod request;
mod resolve;

use std::sync::Arc;

use crate::compute::{ComputeApi, Disk, DiskSpec, Instance};
use crate::config::ZoneConfig;
use crate::context::Context;
use crate::error::ActionError;
use crate::pipeline::{Action, Next, StepFuture};
use crate::poll::PollOutcome;
use crate::state::LifecycleState;

use self::disks::{DiskSet, DiskWait};
use self::resolve::{ResolvedReferences, resolve_references};
use super::read_state::ssh_info_for;
use super::terminate_instance::teardown;
use super::wait::{wait_for_guest, wait_for_running};

pub(super) use self::request::{network_ref, subnetwork_ref};

/// Provisions a new instance for the machine.
#[derive(Clone, Copy, Debug, Default)]
pub struct RunInstance;

impl Action for RunInstance {
    fn name(&self) -> &'static str {
        "RunInstance"
    }

    fn call<'c>(&'c self, ctx: &'c mut Context, next: Next<'c>) -> StepFuture<'c> {
        Box::pin(async move {
            let compute = ctx.compute()?;
            let config = ctx.zone_config().clone();
            announce(ctx, &config);

            let resolved = resolve_references(compute.as_ref(), &config).await?;
            let wait = DiskWait {
                timeout_secs: config.instance_ready_timeout,
                interval: ctx.poll_interval,
                interrupt: ctx.interrupt.clone(),
            };
            let mut disks = DiskSet::default();
            let instance =
                match create_instance(compute.as_ref(), &config, &resolved, &mut disks, &wait)
                    .await
                {
                    Ok(instance) => instance,
                    Err(err) => {
                        tracing::warn!(error = %err, "launch failed; rolling back created disks");
                        disks.rollback(compute.as_ref()).await;
                        return Err(err);
                    }
                };

            if let Err(err) = ctx.machine.set_id(instance.name.clone()) {
                teardown(ctx).await;
                return Err(err.into());
            }

            await_readiness(ctx, &compute, &config, &instance.name).await?;
            next.run(ctx).await
        })
    }
}

fn announce(ctx: &Context, config: &ZoneConfig) {
    ctx.ui.info("Launching an instance with the following settings...");
    let image = config
        .image
        .as_deref()
        .or(config.image_family.as_deref())
        .unwrap_or_default();
    for (label, value) in [
        ("Name", config.name.as_str()),
        ("Type", config.machine_type.as_str()),
        ("Image", image),
        ("Zone", config.zone.as_str()),
        ("Network", config.network.as_str()),
    ] {
        ctx.ui.info(&format!(" -- {label}: {value}"));
    }
    if let Some(external_ip) = config.external_ip.as_deref() {
        ctx.ui.info(&format!(" -- External IP: {external_ip}"));
    }
    if config.preemptible {
        ctx.ui.info(" -- Preemptible: true");
    }
}

async fn create_instance(
    compute: &dyn ComputeApi,
    config: &ZoneConfig,
    resolved: &ResolvedReferences,
    disks: &mut DiskSet,
    wait: &DiskWait,
) -> Result<Instance, ActionError> {
    let boot_spec = DiskSpec {
        name: config.boot_disk_name().to_owned(),
        zone: config.zone.clone(),
        size_gb: config.disk_size,
        disk_type: resolved.boot_disk_type.clone(),
        source_image: Some(resolved.image.clone()),
    };
    let boot = disks.ensure(compute, &boot_spec, wait).await?;

    let mut additional: Vec<(Disk, _)> = Vec::with_capacity(resolved.additional.len());
    for wanted in &resolved.additional {
        let spec = DiskSpec {
            name: wanted.name.clone(),
            zone: config.zone.clone(),
            size_gb: wanted.size_gb,
            disk_type: wanted.disk_type.clone(),
            source_image: wanted.source_image.clone(),
        };
        additional.push((disks.ensure(compute, &spec, wait).await?, wanted));
    }

    let spec = request::instance_spec(config, resolved, &boot, &additional);
    let instance = compute.create_instance(&spec).await?;
    tracing::info!(instance = %instance.name, zone = %instance.zone, "instance requested");
    Ok(instance)
}

/// Waits for the instance and then its guest, tearing the instance down when
/// the wait ends in anything but readiness.
async fn await_readiness(
    ctx: &mut Context,
    compute: &Arc<dyn ComputeApi>,
    config: &ZoneConfig,
    name: &str,
) -> Result<(), ActionError> {
    let (outcome, latest) = match wait_for_running(ctx, compute.as_ref(), name).await {
        Ok(result) => result,
        Err(err) => {
            teardown(ctx).await;
            return Err(err);
        }
    };
    match outcome {
        PollOutcome::Ready => {}
        PollOutcome::TimedOut => {
            teardown(ctx).await;
            return Err(ActionError::ReadyTimeout {
                action: "become ready",
                timeout_secs: config.instance_ready_timeout,
            });
        }
        PollOutcome::Cancelled => {
            teardown(ctx).await;
            return Err(ActionError::Interrupted);
        }
    }
    ctx.machine_state = Some(LifecycleState::Running);
    ctx.ssh_info = latest
        .as_ref()
        .and_then(|instance| ssh_info_for(instance, config.use_private_ip, config.ssh_port));

    match wait_for_guest(ctx).await {
        Ok(PollOutcome::Cancelled) => {
            teardown(ctx).await;
            Err(ActionError::Interrupted)
        }
        Ok(_) => Ok(()),
        Err(err) => {
            teardown(ctx).await;
            Err(err)
        }
    }
}

//! Wait loops shared by the provisioning, start, stop and group actions.

use std::sync::Mutex;
use std::time::Instant;

use crate::compute::{ComputeApi, Instance};
use crate::context::{Context, METRIC_INSTANCE_COMM, METRIC_INSTANCE_READY};
use crate::error::ActionError;
use crate::poll::{PollLimit, PollOutcome, poll_until};

/// Maps a bounded wait outcome onto the action's result.
pub(super) fn require_ready(
    outcome: PollOutcome,
    action: &'static str,
    timeout_secs: i64,
) -> Result<(), ActionError> {
    match outcome {
        PollOutcome::Ready => Ok(()),
        PollOutcome::TimedOut => Err(ActionError::ReadyTimeout {
            action,
            timeout_secs,
        }),
        PollOutcome::Cancelled => Err(ActionError::Interrupted),
    }
}

/// Polls the instance until it reports `RUNNING`, recording the elapsed time.
///
/// Returns the outcome together with the last instance seen.
pub(super) async fn wait_for_running(
    ctx: &mut Context,
    compute: &dyn ComputeApi,
    name: &str,
) -> Result<(PollOutcome, Option<Instance>), ActionError> {
    let zone = ctx.zone_config().zone.clone();
    let limit = PollLimit::from_timeout(ctx.zone_config().instance_ready_timeout);
    let interrupt = ctx.interrupt.clone();
    let latest: Mutex<Option<Instance>> = Mutex::new(None);

    ctx.ui.info("Waiting for instance to become \"ready\"...");
    let started = Instant::now();
    let outcome = poll_until(
        || async {
            let instance = compute.get_instance(name, &zone).await?;
            let ready = instance.is_ready();
            *latest
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner) = Some(instance);
            Ok::<bool, ActionError>(ready)
        },
        limit,
        ctx.poll_interval,
        &interrupt,
    )
    .await?;
    if outcome == PollOutcome::Ready {
        let elapsed = started.elapsed();
        ctx.record_metric(METRIC_INSTANCE_READY, elapsed);
        tracing::info!(instance = name, elapsed = ?elapsed, "instance ready");
    }

    let instance = latest
        .into_inner()
        .unwrap_or_else(std::sync::PoisonError::into_inner);
    Ok((outcome, instance))
}

/// Polls the communicator until the guest accepts connections or the run is
/// interrupted. Without SSH info there is nothing to probe.
pub(super) async fn wait_for_guest(ctx: &mut Context) -> Result<PollOutcome, ActionError> {
    let Some(ssh) = ctx.ssh_info.clone() else {
        tracing::warn!("no guest address known; skipping communicator wait");
        return Ok(PollOutcome::Ready);
    };
    let communicator = std::sync::Arc::clone(&ctx.communicator);
    let interrupt = ctx.interrupt.clone();

    ctx.ui.info("Waiting for SSH to become available...");
    let started = Instant::now();
    let outcome = poll_until(
        || async {
            communicator
                .ready(&ssh)
                .await
                .map_err(|err| ActionError::Guest {
                    message: err.message,
                })
        },
        PollLimit::Unbounded,
        ctx.poll_interval,
        &interrupt,
    )
    .await?;
    if outcome == PollOutcome::Ready {
        let elapsed = started.elapsed();
        ctx.record_metric(METRIC_INSTANCE_COMM, elapsed);
        tracing::info!(host = %ssh.host, elapsed = ?elapsed, "guest reachable");
        ctx.ui.info("Machine is booted and ready for use!");
    }
    Ok(outcome)
}

/// Polls an operation until it reports `DONE`.
///
/// # Errors
///
/// Returns [`ActionError::RemoteApi`] when the finished operation carries an
/// error, plus any polling error.
pub(super) async fn wait_for_operation(
    ctx: &Context,
    compute: &dyn ComputeApi,
    operation: &str,
    zone: &str,
    limit: PollLimit,
) -> Result<PollOutcome, ActionError> {
    let failure: Mutex<Option<String>> = Mutex::new(None);
    let outcome = poll_until(
        || async {
            let op = compute.get_operation(operation, zone).await?;
            if op.is_done() {
                *failure
                    .lock()
                    .unwrap_or_else(std::sync::PoisonError::into_inner) = op.error;
                return Ok::<bool, ActionError>(true);
            }
            Ok(false)
        },
        limit,
        ctx.poll_interval,
        &ctx.interrupt,
    )
    .await?;

    match failure
        .into_inner()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
    {
        Some(message) => Err(ActionError::RemoteApi { message }),
        None => Ok(outcome),
    }
}

//! Actions that leave a boolean in [`Context::result`] for a branch.

use crate::context::Context;
use crate::pipeline::{Action, Next, StepFuture};
use crate::state::LifecycleState;

use super::read_state::refresh_state;

/// Holds when the machine has a live remote instance.
#[derive(Clone, Copy, Debug, Default)]
pub struct IsCreated;

impl Action for IsCreated {
    fn name(&self) -> &'static str {
        "IsCreated"
    }

    fn call<'c>(&'c self, ctx: &'c mut Context, next: Next<'c>) -> StepFuture<'c> {
        Box::pin(async move {
            let state = refresh_state(ctx).await?;
            ctx.result = Some(!state.is_absent());
            next.run(ctx).await
        })
    }
}

/// Holds when the machine's instance is stopped.
#[derive(Clone, Copy, Debug, Default)]
pub struct IsStopped;

impl Action for IsStopped {
    fn name(&self) -> &'static str {
        "IsStopped"
    }

    fn call<'c>(&'c self, ctx: &'c mut Context, next: Next<'c>) -> StepFuture<'c> {
        Box::pin(async move {
            let state = refresh_state(ctx).await?;
            ctx.result = Some(state == LifecycleState::Stopped);
            next.run(ctx).await
        })
    }
}

/// Holds when destruction is forced or the operator confirms it.
#[derive(Clone, Copy, Debug, Default)]
pub struct DestroyConfirm;

impl Action for DestroyConfirm {
    fn name(&self) -> &'static str {
        "DestroyConfirm"
    }

    fn call<'c>(&'c self, ctx: &'c mut Context, next: Next<'c>) -> StepFuture<'c> {
        let confirmed = ctx.force_confirm_destroy || {
            let prompt = format!(
                "Are you sure you want to destroy the '{}' VM?",
                ctx.machine.label()
            );
            ctx.confirmer.confirm(&prompt)
        };
        ctx.result = Some(confirmed);
        next.run(ctx)
    }
}

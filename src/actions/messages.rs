//! Operator notices for verbs that have nothing to do.

use crate::context::Context;
use crate::pipeline::{Action, Next, StepFuture};

/// Tells the operator the machine has no instance yet.
#[derive(Clone, Copy, Debug, Default)]
pub struct MessageNotCreated;

impl Action for MessageNotCreated {
    fn name(&self) -> &'static str {
        "MessageNotCreated"
    }

    fn call<'c>(&'c self, ctx: &'c mut Context, next: Next<'c>) -> StepFuture<'c> {
        ctx.ui.info("Instance is not created. Please run `drydock up` first.");
        next.run(ctx)
    }
}

/// Tells the operator the machine already has a running instance.
#[derive(Clone, Copy, Debug, Default)]
pub struct MessageAlreadyCreated;

impl Action for MessageAlreadyCreated {
    fn name(&self) -> &'static str {
        "MessageAlreadyCreated"
    }

    fn call<'c>(&'c self, ctx: &'c mut Context, next: Next<'c>) -> StepFuture<'c> {
        ctx.ui.info("Instance is already created.");
        next.run(ctx)
    }
}

/// Tells the operator destruction was declined.
#[derive(Clone, Copy, Debug, Default)]
pub struct MessageWillNotDestroy;

impl Action for MessageWillNotDestroy {
    fn name(&self) -> &'static str {
        "MessageWillNotDestroy"
    }

    fn call<'c>(&'c self, ctx: &'c mut Context, next: Next<'c>) -> StepFuture<'c> {
        let message = format!(
            "The instance '{}' will not be destroyed, since the confirmation was declined.",
            ctx.machine.label()
        );
        ctx.ui.info(&message);
        next.run(ctx)
    }
}

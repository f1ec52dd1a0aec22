//! Guest hooks. Both actions continue the chain first and act afterwards,
//! so they only touch the guest once the instance is up.

use crate::context::Context;
use crate::error::ActionError;
use crate::pipeline::{Action, Next, StepFuture};

/// Runs the configured provisioners after the rest of the chain.
#[derive(Clone, Copy, Debug, Default)]
pub struct Provision;

impl Action for Provision {
    fn name(&self) -> &'static str {
        "Provision"
    }

    fn call<'c>(&'c self, ctx: &'c mut Context, next: Next<'c>) -> StepFuture<'c> {
        Box::pin(async move {
            next.run(ctx).await?;
            let hooks = std::sync::Arc::clone(&ctx.hooks);
            hooks
                .provision(ctx.machine.label(), ctx.ssh_info.as_ref())
                .await
                .map_err(|err| ActionError::Guest {
                    message: err.message,
                })
        })
    }
}

/// Synchronises shared folders after the rest of the chain.
#[derive(Clone, Copy, Debug, Default)]
pub struct SyncFolders;

impl Action for SyncFolders {
    fn name(&self) -> &'static str {
        "SyncFolders"
    }

    fn call<'c>(&'c self, ctx: &'c mut Context, next: Next<'c>) -> StepFuture<'c> {
        Box::pin(async move {
            next.run(ctx).await?;
            let hooks = std::sync::Arc::clone(&ctx.hooks);
            hooks
                .sync_folders(ctx.machine.label(), ctx.ssh_info.as_ref())
                .await
                .map_err(|err| ActionError::Guest {
                    message: err.message,
                })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::Pipeline;
    use crate::test_support::Harness;

    #[tokio::test]
    async fn hooks_run_after_downstream_steps_in_reverse_order() {
        let harness = Harness::new();
        let mut ctx = harness.context();
        let pipeline = Pipeline::builder()
            .use_action(Provision)
            .use_action(SyncFolders)
            .build();

        assert_eq!(pipeline.run(&mut ctx).await, Ok(()));
        assert_eq!(harness.hooks.calls(), ["sync_folders default", "provision default"]);
    }

    struct Fail;

    impl Action for Fail {
        fn name(&self) -> &'static str {
            "Fail"
        }

        fn call<'c>(&'c self, _ctx: &'c mut Context, _next: Next<'c>) -> StepFuture<'c> {
            Box::pin(async { Err(ActionError::Interrupted) })
        }
    }

    #[tokio::test]
    async fn downstream_failure_skips_hooks() {
        let harness = Harness::new();
        let mut ctx = harness.context();
        let pipeline = Pipeline::builder()
            .use_action(Provision)
            .use_action(SyncFolders)
            .use_action(Fail)
            .build();

        assert_eq!(pipeline.run(&mut ctx).await, Err(ActionError::Interrupted));
        assert!(harness.hooks.calls().is_empty());
    }
}

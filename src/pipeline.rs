//! Middleware-style action pipeline.
//!
//! Each [`Action`] receives the run's [`Context`] and a [`Next`] handle to
//! the remainder of the chain. An action decides whether, when and how often
//! to continue, so work can happen before or after the downstream steps.
//! Branches run a predicate step on its own, read the boolean it left in
//! [`Context::result`], continue into one of two prebuilt sub-chains, and then
//! resume the outer chain.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::context::Context;
use crate::error::ActionError;

/// Future returned by actions and continuations.
pub type StepFuture<'a> = Pin<Box<dyn Future<Output = Result<(), ActionError>> + Send + 'a>>;

/// One middleware step.
pub trait Action: Send + Sync {
    /// Short name used in logs and pipeline descriptions.
    fn name(&self) -> &'static str;

    /// Performs the step; call `next.run(ctx)` to continue the chain.
    fn call<'c>(&'c self, ctx: &'c mut Context, next: Next<'c>) -> StepFuture<'c>;
}

/// A node of a pipeline.
#[derive(Clone)]
pub enum Step {
    /// A single action.
    Leaf(Arc<dyn Action>),
    /// Steps run in order.
    Sequence(Vec<Step>),
    /// A predicate step selecting one of two sub-chains.
    Branch {
        /// Step that leaves a boolean in [`Context::result`].
        predicate: Box<Step>,
        /// Chain run when the predicate held.
        if_true: Box<Step>,
        /// Chain run otherwise.
        if_false: Box<Step>,
    },
}

impl Step {
    fn describe(&self, out: &mut String) {
        match self {
            Self::Leaf(action) => out.push_str(action.name()),
            Self::Sequence(steps) => {
                out.push('[');
                for (index, step) in steps.iter().enumerate() {
                    if index > 0 {
                        out.push_str(" -> ");
                    }
                    step.describe(out);
                }
                out.push(']');
            }
            Self::Branch {
                predicate,
                if_true,
                if_false,
            } => {
                out.push_str("Branch(");
                predicate.describe(out);
                out.push_str(" ? ");
                if_true.describe(out);
                out.push_str(" : ");
                if_false.describe(out);
                out.push(')');
            }
        }
    }
}

impl fmt::Debug for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = String::new();
        self.describe(&mut out);
        f.write_str(&out)
    }
}

/// The remainder of a chain, handed to each action.
#[derive(Clone, Copy)]
pub struct Next<'a> {
    rest: &'a [Step],
    outer: Option<&'a Next<'a>>,
}

impl<'a> Next<'a> {
    /// A continuation that does nothing.
    #[must_use]
    pub const fn end() -> Self {
        Self {
            rest: &[],
            outer: None,
        }
    }

    /// Runs the remainder of the chain.
    pub fn run<'d>(self, ctx: &'d mut Context) -> StepFuture<'d>
    where
        'a: 'd,
    {
        Box::pin(async move {
            if let Some((first, rest)) = self.rest.split_first() {
                let next = Next {
                    rest,
                    outer: self.outer,
                };
                run_step(first, ctx, next).await
            } else if let Some(outer) = self.outer {
                outer.run(ctx).await
            } else {
                Ok(())
            }
        })
    }
}

fn run_step<'a: 'd, 'd>(step: &'a Step, ctx: &'d mut Context, next: Next<'a>) -> StepFuture<'d> {
    match step {
        Step::Leaf(action) => {
            tracing::trace!(action = action.name(), "calling action");
            action.call(ctx, next)
        }
        Step::Sequence(steps) => Box::pin(async move {
            let inner = Next {
                rest: steps.as_slice(),
                outer: Some(&next),
            };
            inner.run(ctx).await
        }),
        Step::Branch {
            predicate,
            if_true,
            if_false,
        } => Box::pin(async move {
            ctx.result = None;
            run_step(predicate, ctx, Next::end()).await?;
            let chosen = if ctx.take_result() { if_true } else { if_false };
            run_step(chosen, ctx, next).await
        }),
    }
}

/// An ordered chain of steps.
#[derive(Clone, Default)]
pub struct Pipeline {
    steps: Vec<Step>,
}

impl Pipeline {
    /// Starts building a pipeline.
    #[must_use]
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::default()
    }

    /// Runs the chain against `ctx`.
    pub fn run<'a>(&'a self, ctx: &'a mut Context) -> StepFuture<'a> {
        Next {
            rest: &self.steps,
            outer: None,
        }
        .run(ctx)
    }

    /// Converts the pipeline into a single nested step.
    #[must_use]
    pub fn into_step(self) -> Step {
        Step::Sequence(self.steps)
    }

    /// Renders the structure of the chain, for diagnostics and tests.
    #[must_use]
    pub fn describe(&self) -> String {
        let mut out = String::new();
        for (index, step) in self.steps.iter().enumerate() {
            if index > 0 {
                out.push_str(" -> ");
            }
            step.describe(&mut out);
        }
        out
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Pipeline({})", self.describe())
    }
}

/// Assembles a [`Pipeline`]; building performs no I/O.
#[derive(Default)]
pub struct PipelineBuilder {
    steps: Vec<Step>,
}

impl PipelineBuilder {
    /// Appends an action.
    #[must_use]
    pub fn use_action(mut self, action: impl Action + 'static) -> Self {
        self.steps.push(Step::Leaf(Arc::new(action)));
        self
    }

    /// Appends a branch on `predicate`.
    #[must_use]
    pub fn branch(
        mut self,
        predicate: impl Action + 'static,
        if_true: Pipeline,
        if_false: Pipeline,
    ) -> Self {
        self.steps.push(Step::Branch {
            predicate: Box::new(Step::Leaf(Arc::new(predicate))),
            if_true: Box::new(if_true.into_step()),
            if_false: Box::new(if_false.into_step()),
        });
        self
    }

    /// Appends another pipeline as a nested sequence.
    #[must_use]
    pub fn append(mut self, other: Pipeline) -> Self {
        self.steps.push(other.into_step());
        self
    }

    /// Finishes the pipeline.
    #[must_use]
    pub fn build(self) -> Pipeline {
        Pipeline { steps: self.steps }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::test_support::Harness;

    type Log = Arc<Mutex<Vec<String>>>;

    fn entries(log: &Log) -> Vec<String> {
        log.lock()
            .unwrap_or_else(|err| panic!("log lock poisoned: {err}"))
            .clone()
    }

    fn push(log: &Log, entry: String) {
        log.lock()
            .unwrap_or_else(|err| panic!("log lock poisoned: {err}"))
            .push(entry);
    }

    struct Around {
        label: &'static str,
        log: Log,
    }

    impl Action for Around {
        fn name(&self) -> &'static str {
            self.label
        }

        fn call<'c>(&'c self, ctx: &'c mut Context, next: Next<'c>) -> StepFuture<'c> {
            Box::pin(async move {
                push(&self.log, format!("{}:before", self.label));
                next.run(ctx).await?;
                push(&self.log, format!("{}:after", self.label));
                Ok(())
            })
        }
    }

    struct Predicate(bool);

    impl Action for Predicate {
        fn name(&self) -> &'static str {
            "Predicate"
        }

        fn call<'c>(&'c self, ctx: &'c mut Context, next: Next<'c>) -> StepFuture<'c> {
            ctx.result = Some(self.0);
            next.run(ctx)
        }
    }

    struct Halt;

    impl Action for Halt {
        fn name(&self) -> &'static str {
            "Halt"
        }

        fn call<'c>(&'c self, _ctx: &'c mut Context, _next: Next<'c>) -> StepFuture<'c> {
            Box::pin(async { Ok(()) })
        }
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

    fn around(label: &'static str, log: &Log) -> Around {
        Around {
            label,
            log: Arc::clone(log),
        }
    }

    #[tokio::test]
    async fn actions_wrap_the_rest_of_the_chain() {
        let log = Log::default();
        let pipeline = Pipeline::builder()
            .use_action(around("a", &log))
            .use_action(around("b", &log))
            .build();
        let mut ctx = Harness::new().context();

        pipeline
            .run(&mut ctx)
            .await
            .unwrap_or_else(|err| panic!("run: {err}"));

        assert_eq!(entries(&log), ["a:before", "b:before", "b:after", "a:after"]);
    }

    #[tokio::test]
    async fn branch_continues_outer_chain_after_chosen_arm() {
        let log = Log::default();
        let pipeline = Pipeline::builder()
            .branch(
                Predicate(false),
                Pipeline::builder().use_action(around("yes", &log)).build(),
                Pipeline::builder().use_action(around("no", &log)).build(),
            )
            .use_action(around("tail", &log))
            .build();
        let mut ctx = Harness::new().context();

        pipeline
            .run(&mut ctx)
            .await
            .unwrap_or_else(|err| panic!("run: {err}"));

        assert_eq!(
            entries(&log),
            ["no:before", "tail:before", "tail:after", "no:after"]
        );
    }

    #[tokio::test]
    async fn nested_sequences_resume_the_enclosing_chain() {
        let log = Log::default();
        let inner = Pipeline::builder().use_action(around("inner", &log)).build();
        let pipeline = Pipeline::builder()
            .append(inner)
            .use_action(around("outer", &log))
            .build();
        let mut ctx = Harness::new().context();

        pipeline
            .run(&mut ctx)
            .await
            .unwrap_or_else(|err| panic!("run: {err}"));

        assert_eq!(
            entries(&log),
            ["inner:before", "outer:before", "outer:after", "inner:after"]
        );
    }

    #[tokio::test]
    async fn action_that_skips_next_stops_the_chain() {
        let log = Log::default();
        let pipeline = Pipeline::builder()
            .use_action(Halt)
            .use_action(around("never", &log))
            .build();
        let mut ctx = Harness::new().context();

        pipeline
            .run(&mut ctx)
            .await
            .unwrap_or_else(|err| panic!("run: {err}"));

        assert!(entries(&log).is_empty());
    }

    #[tokio::test]
    async fn errors_unwind_without_after_hooks() {
        let log = Log::default();
        let pipeline = Pipeline::builder()
            .use_action(around("a", &log))
            .use_action(Fail)
            .build();
        let mut ctx = Harness::new().context();

        let result = pipeline.run(&mut ctx).await;

        assert_eq!(result, Err(ActionError::Interrupted));
        assert_eq!(entries(&log), ["a:before"]);
    }

    #[test]
    fn describe_renders_structure() {
        let log = Log::default();
        let pipeline = Pipeline::builder()
            .use_action(around("a", &log))
            .branch(
                Predicate(true),
                Pipeline::builder().use_action(Halt).build(),
                Pipeline::default(),
            )
            .build();

        assert_eq!(pipeline.describe(), "a -> Branch(Predicate ? [Halt] : [])");
    }
}

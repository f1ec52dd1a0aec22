//! Runs one verb's pipeline against a freshly built context.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::actions::templates;
use crate::config::FinalizedConfig;
use crate::context::{Collaborators, Context};
use crate::error::ActionError;
use crate::identity::{IdentityStore, Machine};
use crate::interrupt::InterruptFlag;
use crate::pipeline::Pipeline;
use crate::poll::DEFAULT_POLL_INTERVAL;

/// User-facing operations, each backed by one pipeline template.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Verb {
    /// Create or resume the machine.
    Up,
    /// Stop the machine.
    Halt,
    /// Terminate the machine.
    Destroy,
    /// Stop and start the machine.
    Reload,
    /// Re-run guest provisioning.
    Provision,
    /// Read the lifecycle state.
    ReadState,
    /// Read the SSH endpoint.
    ReadSshInfo,
}

impl Verb {
    /// Builds the pipeline for this verb.
    #[must_use]
    pub fn pipeline(self) -> Pipeline {
        match self {
            Self::Up => templates::up(),
            Self::Halt => templates::halt(),
            Self::Destroy => templates::destroy(),
            Self::Reload => templates::reload(),
            Self::Provision => templates::provision(),
            Self::ReadState => templates::read_state(),
            Self::ReadSshInfo => templates::read_ssh_info(),
        }
    }

    /// Stable name used in logs.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Up => "up",
            Self::Halt => "halt",
            Self::Destroy => "destroy",
            Self::Reload => "reload",
            Self::Provision => "provision",
            Self::ReadState => "read_state",
            Self::ReadSshInfo => "read_ssh_info",
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Per-run switches.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct RunOptions {
    /// Skip the destroy confirmation prompt.
    pub force_destroy: bool,
}

/// The context a run finished with, together with its result.
#[derive(Debug)]
pub struct RunOutcome {
    /// Context after the pipeline returned; carries state, SSH info and
    /// metrics.
    pub context: Context,
    /// What the pipeline returned.
    pub result: Result<(), ActionError>,
}

/// Builds a context per run and executes the verb's pipeline.
pub struct ActionRunner {
    collaborators: Collaborators,
    config: Arc<FinalizedConfig>,
    store: Arc<dyn IdentityStore>,
    interrupt: InterruptFlag,
    poll_interval: Duration,
}

impl ActionRunner {
    /// Creates a runner sharing `interrupt` with every run it starts.
    #[must_use]
    pub fn new(
        collaborators: Collaborators,
        config: Arc<FinalizedConfig>,
        store: Arc<dyn IdentityStore>,
        interrupt: InterruptFlag,
    ) -> Self {
        Self {
            collaborators,
            config,
            store,
            interrupt,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Overrides the pause between poll attempts.
    #[must_use]
    pub const fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Runs `verb` for the machine `label`.
    ///
    /// # Errors
    ///
    /// Returns [`ActionError::Identity`] when the machine identity cannot be
    /// loaded. Pipeline failures are reported in [`RunOutcome::result`].
    pub async fn run(
        &self,
        verb: Verb,
        label: &str,
        options: RunOptions,
    ) -> Result<RunOutcome, ActionError> {
        let machine = Machine::load(label, Arc::clone(&self.store))?;
        let mut context = Context::new(
            self.collaborators.clone(),
            Arc::clone(&self.config),
            machine,
            self.interrupt.clone(),
        );
        context.poll_interval = self.poll_interval;
        context.force_confirm_destroy = options.force_destroy;

        let pipeline = verb.pipeline();
        tracing::debug!(verb = %verb, machine = label, pipeline = %pipeline.describe(), "running pipeline");
        let result = pipeline.run(&mut context).await;
        match &result {
            Ok(()) => tracing::info!(verb = %verb, machine = label, "run finished"),
            Err(err) => tracing::warn!(verb = %verb, machine = label, error = %err, "run failed"),
        }
        Ok(RunOutcome { context, result })
    }
}

impl fmt::Debug for ActionRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionRunner")
            .field("zone", &self.config.default_zone())
            .field("store", &self.store)
            .field("interrupted", &self.interrupt.is_set())
            .field("poll_interval", &self.poll_interval)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use rstest::{fixture, rstest};

    use super::*;
    use crate::compute::StaticConnector;
    use crate::config::{MachineSettings, ProviderConfig};
    use crate::identity::MemoryIdentityStore;
    use crate::state::LifecycleState;
    use crate::test_support::{FakeCompute, RecordingHooks, RecordingUi, ScriptedGuest};
    use crate::ui::FixedConfirmer;

    struct Fixture {
        runner: ActionRunner,
        compute: Arc<FakeCompute>,
        store: Arc<MemoryIdentityStore>,
    }

    #[fixture]
    fn fixture() -> Fixture {
        let compute = Arc::new(FakeCompute::with_defaults());
        let store = Arc::new(MemoryIdentityStore::new());
        let config = ProviderConfig {
            settings: MachineSettings {
                project_id: Some(String::from("proj")),
                name: Some(String::from("vm")),
                image: Some(String::from("debian-12")),
                ..MachineSettings::default()
            },
            ..ProviderConfig::default()
        }
        .finalize();
        let collaborators = Collaborators {
            ui: Arc::new(RecordingUi::default()),
            connector: Arc::new(StaticConnector(compute.clone())),
            communicator: Arc::new(ScriptedGuest::new(1)),
            hooks: Arc::new(RecordingHooks::default()),
            confirmer: Arc::new(FixedConfirmer(false)),
        };
        let runner = ActionRunner::new(
            collaborators,
            Arc::new(config),
            store.clone(),
            InterruptFlag::new(),
        )
        .with_poll_interval(Duration::from_millis(1));
        Fixture {
            runner,
            compute,
            store,
        }
    }

    async fn run(fixture: &Fixture, verb: Verb, options: RunOptions) -> RunOutcome {
        fixture
            .runner
            .run(verb, "default", options)
            .await
            .unwrap_or_else(|err| panic!("{verb}: {err}"))
    }

    #[rstest]
    #[tokio::test]
    async fn up_status_and_forced_destroy(fixture: Fixture) {
        let up = run(&fixture, Verb::Up, RunOptions::default()).await;
        assert_eq!(up.result, Ok(()));
        assert_eq!(fixture.store.get("default"), Some(String::from("vm")));

        let status = run(&fixture, Verb::ReadState, RunOptions::default()).await;
        assert_eq!(status.context.machine_state, Some(LifecycleState::Running));

        let ssh = run(&fixture, Verb::ReadSshInfo, RunOptions::default()).await;
        assert!(ssh.context.ssh_info.is_some());

        let destroy = run(
            &fixture,
            Verb::Destroy,
            RunOptions {
                force_destroy: true,
            },
        )
        .await;
        assert_eq!(destroy.result, Ok(()));
        assert!(fixture.compute.instance("vm").is_none());
        assert_eq!(fixture.store.get("default"), None);
    }

    #[rstest]
    #[tokio::test]
    async fn unforced_destroy_asks_and_respects_the_answer(fixture: Fixture) {
        run(&fixture, Verb::Up, RunOptions::default()).await;

        let destroy = run(&fixture, Verb::Destroy, RunOptions::default()).await;

        assert_eq!(destroy.result, Ok(()));
        assert!(fixture.compute.instance("vm").is_some());
    }

    #[rstest]
    #[tokio::test]
    async fn each_run_gets_a_fresh_context(fixture: Fixture) {
        let first = run(&fixture, Verb::ReadState, RunOptions::default()).await;
        let second = run(&fixture, Verb::ReadState, RunOptions::default()).await;

        assert_eq!(first.context.machine_state, Some(LifecycleState::NotCreated));
        assert!(second.context.metrics.is_empty());
        assert_eq!(second.context.result, None);
    }
}

//! Mutable scratchpad shared by the steps of one pipeline run.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::compute::{ComputeApi, Connector};
use crate::config::{FinalizedConfig, ZoneConfig};
use crate::error::ActionError;
use crate::guest::{Communicator, GuestHooks, SshInfo};
use crate::identity::Machine;
use crate::interrupt::InterruptFlag;
use crate::poll::DEFAULT_POLL_INTERVAL;
use crate::state::LifecycleState;
use crate::ui::{Confirmer, Ui};

/// Metric recording how long the instance took to report `RUNNING`.
pub const METRIC_INSTANCE_READY: &str = "instance_ready_time";
/// Metric recording how long the guest took to accept connections.
pub const METRIC_INSTANCE_COMM: &str = "instance_comm_time";

/// External services a run talks to.
#[derive(Clone)]
pub struct Collaborators {
    /// Progress sink.
    pub ui: Arc<dyn Ui>,
    /// Builds the compute handle on first use.
    pub connector: Arc<dyn Connector>,
    /// Guest readiness probe.
    pub communicator: Arc<dyn Communicator>,
    /// Provisioning and folder sync hooks.
    pub hooks: Arc<dyn GuestHooks>,
    /// Destroy confirmation prompt.
    pub confirmer: Arc<dyn Confirmer>,
}

/// Per-run state read and written by actions.
pub struct Context {
    /// Progress sink.
    pub ui: Arc<dyn Ui>,
    connector: Arc<dyn Connector>,
    compute: Option<Arc<dyn ComputeApi>>,
    /// Finalized provider configuration.
    pub config: Arc<FinalizedConfig>,
    /// Identity of the machine being driven.
    pub machine: Machine,
    /// Guest readiness probe.
    pub communicator: Arc<dyn Communicator>,
    /// Provisioning and folder sync hooks.
    pub hooks: Arc<dyn GuestHooks>,
    /// Destroy confirmation prompt.
    pub confirmer: Arc<dyn Confirmer>,
    /// Raised when the user interrupts the run.
    pub interrupt: InterruptFlag,
    /// Pause between poll attempts.
    pub poll_interval: Duration,
    /// Boolean left by the most recent predicate step.
    pub result: Option<bool>,
    /// Lifecycle state reported by the state reader.
    pub machine_state: Option<LifecycleState>,
    /// SSH endpoint of the guest, once known.
    pub ssh_info: Option<SshInfo>,
    /// Durations recorded by the provisioning workflow.
    pub metrics: BTreeMap<String, Duration>,
    /// Whether `ConfigValidate` checks the configuration.
    pub config_validate: bool,
    /// Skip the destroy confirmation prompt.
    pub force_confirm_destroy: bool,
}

impl Context {
    /// Builds a fresh context for one run.
    #[must_use]
    pub fn new(
        collaborators: Collaborators,
        config: Arc<FinalizedConfig>,
        machine: Machine,
        interrupt: InterruptFlag,
    ) -> Self {
        let Collaborators {
            ui,
            connector,
            communicator,
            hooks,
            confirmer,
        } = collaborators;
        Self {
            ui,
            connector,
            compute: None,
            config,
            machine,
            communicator,
            hooks,
            confirmer,
            interrupt,
            poll_interval: DEFAULT_POLL_INTERVAL,
            result: None,
            machine_state: None,
            ssh_info: None,
            metrics: BTreeMap::new(),
            config_validate: true,
            force_confirm_destroy: false,
        }
    }

    /// Configuration of the machine's zone.
    #[must_use]
    pub fn zone_config(&self) -> &ZoneConfig {
        self.config.active()
    }

    /// Reports whether a compute handle has been built.
    #[must_use]
    pub const fn is_connected(&self) -> bool {
        self.compute.is_some()
    }

    /// Returns the compute handle, connecting on first use.
    ///
    /// # Errors
    ///
    /// Returns [`ActionError::Connect`] when the connector fails.
    pub fn compute(&mut self) -> Result<Arc<dyn ComputeApi>, ActionError> {
        if let Some(compute) = &self.compute {
            return Ok(Arc::clone(compute));
        }
        let compute = self
            .connector
            .connect(self.config.active())
            .map_err(|err| ActionError::Connect {
                message: err.to_string(),
            })?;
        self.compute = Some(Arc::clone(&compute));
        Ok(compute)
    }

    /// Takes the boolean left by the last predicate, defaulting to `false`.
    pub fn take_result(&mut self) -> bool {
        self.result.take().unwrap_or(false)
    }

    /// Records a duration metric.
    pub fn record_metric(&mut self, name: &str, value: Duration) {
        self.metrics.insert(name.to_owned(), value);
    }

    /// Derives the context used to tear down a half-built instance.
    ///
    /// The derived run skips validation and confirmation and gets its own
    /// unset interruption flag so teardown is not cut short.
    #[must_use]
    pub fn teardown_context(&self) -> Self {
        Self {
            ui: Arc::clone(&self.ui),
            connector: Arc::clone(&self.connector),
            compute: self.compute.clone(),
            config: Arc::clone(&self.config),
            machine: self.machine.clone(),
            communicator: Arc::clone(&self.communicator),
            hooks: Arc::clone(&self.hooks),
            confirmer: Arc::clone(&self.confirmer),
            interrupt: InterruptFlag::new(),
            poll_interval: self.poll_interval,
            result: None,
            machine_state: None,
            ssh_info: None,
            metrics: BTreeMap::new(),
            config_validate: false,
            force_confirm_destroy: true,
        }
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("machine", &self.machine)
            .field("zone", &self.config.default_zone())
            .field("connected", &self.compute.is_some())
            .field("interrupted", &self.interrupt.is_set())
            .field("result", &self.result)
            .field("machine_state", &self.machine_state)
            .field("ssh_info", &self.ssh_info)
            .field("metrics", &self.metrics)
            .field("config_validate", &self.config_validate)
            .field("force_confirm_destroy", &self.force_confirm_destroy)
            .finish_non_exhaustive()
    }
}

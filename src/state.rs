//! Maps the remote instance status onto the machine lifecycle.
//!
//! The reader is self-healing: whenever the remote instance cannot be
//! found the local identity is cleared, which is what makes the next `up`
//! provision a fresh instance.

use std::fmt;

use crate::compute::ComputeApi;
use crate::error::ActionError;
use crate::identity::Machine;

/// Lifecycle state of a machine.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LifecycleState {
    /// No remote instance exists.
    NotCreated,
    /// Resources are being allocated.
    Provisioning,
    /// The instance is being prepared for its first boot.
    Staging,
    /// The instance is running.
    Running,
    /// The instance is shutting down.
    Stopping,
    /// The instance is stopped and can be started again.
    Stopped,
    /// The instance is being suspended.
    Suspending,
    /// The instance is suspended.
    Suspended,
    /// The platform is repairing the instance.
    Repairing,
    /// The instance was terminated.
    Terminated,
}

impl LifecycleState {
    /// Parses a remote status string.
    #[must_use]
    pub fn from_status(status: &str) -> Option<Self> {
        let state = match status {
            "PROVISIONING" => Self::Provisioning,
            "STAGING" => Self::Staging,
            "RUNNING" => Self::Running,
            "STOPPING" => Self::Stopping,
            "STOPPED" => Self::Stopped,
            "SUSPENDING" => Self::Suspending,
            "SUSPENDED" => Self::Suspended,
            "REPAIRING" => Self::Repairing,
            "TERMINATED" | "SHUTTING_DOWN" => Self::Terminated,
            _ => return None,
        };
        Some(state)
    }

    /// Reports whether the state means no usable instance exists.
    #[must_use]
    pub const fn is_absent(self) -> bool {
        matches!(self, Self::NotCreated | Self::Terminated)
    }

    /// Stable identifier used in status output.
    #[must_use]
    pub const fn id(self) -> &'static str {
        match self {
            Self::NotCreated => "not_created",
            Self::Provisioning => "provisioning",
            Self::Staging => "staging",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
            Self::Suspending => "suspending",
            Self::Suspended => "suspended",
            Self::Repairing => "repairing",
            Self::Terminated => "terminated",
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// Reads the lifecycle state of `machine` in `zone`.
///
/// No identity means [`LifecycleState::NotCreated`] without a remote call.
/// Any lookup failure, and any terminated instance, clears the identity and
/// also yields [`LifecycleState::NotCreated`].
///
/// # Errors
///
/// Returns [`ActionError::UnknownStatus`] for an unrecognised status and
/// [`ActionError::Identity`] when the cleared identity cannot be persisted.
pub async fn read_state(
    compute: &dyn ComputeApi,
    machine: &mut Machine,
    zone: &str,
) -> Result<LifecycleState, ActionError> {
    let Some(id) = machine.id().map(str::to_owned) else {
        return Ok(LifecycleState::NotCreated);
    };

    let instance = match compute.get_instance(&id, zone).await {
        Ok(instance) => instance,
        Err(err) => {
            tracing::info!(instance = %id, error = %err, "instance lookup failed; assuming it is gone");
            machine.clear_id()?;
            return Ok(LifecycleState::NotCreated);
        }
    };

    let state = LifecycleState::from_status(&instance.status).ok_or_else(|| {
        ActionError::UnknownStatus {
            status: instance.status.clone(),
        }
    })?;
    if state.is_absent() {
        tracing::info!(instance = %id, status = %instance.status, "instance terminated; clearing identity");
        machine.clear_id()?;
        return Ok(LifecycleState::NotCreated);
    }
    Ok(state)
}

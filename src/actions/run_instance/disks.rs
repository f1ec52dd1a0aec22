//! Disk resolution with ownership tracking for rollback.

use std::time::Duration;

use crate::compute::{ComputeApi, ComputeError, Disk, DiskSpec};
use crate::error::ActionError;
use crate::interrupt::InterruptFlag;
use crate::poll::{PollLimit, PollOutcome, poll_until};

/// Whether a disk was reused or created by this run.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(super) enum DiskOrigin {
    /// The disk already existed and is never deleted by rollback.
    Found,
    /// The disk was created by this run and is deleted on rollback.
    Created,
}

/// Parameters for the `READY` wait of newly created disks.
#[derive(Clone, Debug)]
pub(super) struct DiskWait {
    pub(super) timeout_secs: i64,
    pub(super) interval: Duration,
    pub(super) interrupt: InterruptFlag,
}

/// Disks touched by one provisioning attempt.
#[derive(Debug, Default)]
pub(super) struct DiskSet {
    disks: Vec<(Disk, DiskOrigin)>,
}

impl DiskSet {
    /// Reuses the disk named in `spec` or creates it.
    ///
    /// A created disk is recorded as owned before its `READY` wait so a
    /// failed wait still rolls it back.
    pub(super) async fn ensure(
        &mut self,
        compute: &dyn ComputeApi,
        spec: &DiskSpec,
        wait: &DiskWait,
    ) -> Result<Disk, ActionError> {
        match compute.get_disk(&spec.name, &spec.zone).await {
            Ok(disk) => {
                tracing::debug!(disk = %disk.name, "reusing existing disk");
                self.disks.push((disk.clone(), DiskOrigin::Found));
                return Ok(disk);
            }
            Err(ComputeError::NotFound { .. }) => {}
            Err(err) => return Err(err.into()),
        }

        let created = compute.create_disk(spec).await?;
        tracing::info!(disk = %created.name, "created disk");
        self.disks.push((created.clone(), DiskOrigin::Created));
        if created.is_ready() {
            return Ok(created);
        }

        let outcome = poll_until(
            || async {
                let disk = compute.get_disk(&spec.name, &spec.zone).await?;
                Ok::<bool, ActionError>(disk.is_ready())
            },
            PollLimit::from_timeout(wait.timeout_secs),
            wait.interval,
            &wait.interrupt,
        )
        .await?;
        match outcome {
            PollOutcome::Ready => Ok(created),
            PollOutcome::TimedOut => Err(ActionError::ReadyTimeout {
                action: "create disk",
                timeout_secs: wait.timeout_secs,
            }),
            PollOutcome::Cancelled => Err(ActionError::Interrupted),
        }
    }

    /// Origin recorded for `name`, if this run touched it.
    #[cfg(test)]
    pub(super) fn origin(&self, name: &str) -> Option<DiskOrigin> {
        self.disks
            .iter()
            .find(|(disk, _)| disk.name == name)
            .map(|(_, origin)| *origin)
    }

    /// Deletes every disk this run created. Failures are logged and skipped.
    pub(super) async fn rollback(self, compute: &dyn ComputeApi) {
        for (disk, origin) in self.disks.into_iter().rev() {
            if origin != DiskOrigin::Created {
                continue;
            }
            match compute.delete_disk(&disk.name, &disk.zone).await {
                Ok(_) => tracing::info!(disk = %disk.name, "deleted disk after failed launch"),
                Err(err) => {
                    tracing::warn!(disk = %disk.name, error = %err, "failed to delete disk during rollback");
                }
            }
        }
    }
}

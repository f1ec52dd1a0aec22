//! Boundary to the remote compute platform.
//!
//! The orchestrator only inspects the subset of each resource listed here.
//! Every call is a boxed future so the trait stays object safe and test
//! doubles can stand in for the HTTP adapter.

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use thiserror::Error;

use crate::config::ZoneConfig;

/// Instance status reported while the instance is serving.
pub const STATUS_RUNNING: &str = "RUNNING";
/// Instance status reported while resources are being allocated.
pub const STATUS_PROVISIONING: &str = "PROVISIONING";
/// Disk status reported once a disk can be attached.
pub const STATUS_READY: &str = "READY";
/// Operation status reported once an operation has finished.
pub const STATUS_DONE: &str = "DONE";
/// Address status reported while an address is attached to a resource.
pub const STATUS_IN_USE: &str = "IN_USE";

/// Future returned by compute operations.
pub type ComputeFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, ComputeError>> + Send + 'a>>;

/// Kinds of remote resources named in errors.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ResourceKind {
    /// A virtual machine instance.
    Instance,
    /// A persistent disk.
    Disk,
    /// A disk type such as `pd-ssd`.
    DiskType,
    /// A boot image or image family.
    Image,
    /// A static external address.
    Address,
    /// An asynchronous operation.
    Operation,
    /// An unmanaged instance group.
    InstanceGroup,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Instance => "instance",
            Self::Disk => "disk",
            Self::DiskType => "disk type",
            Self::Image => "image",
            Self::Address => "external IP address",
            Self::Operation => "operation",
            Self::InstanceGroup => "instance group",
        };
        f.write_str(label)
    }
}

/// Errors raised by the remote compute platform.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ComputeError {
    /// The referenced resource does not exist.
    #[error("{resource} '{name}' not found")]
    NotFound {
        /// Kind of resource that was looked up.
        resource: ResourceKind,
        /// Name used for the lookup.
        name: String,
    },
    /// The platform rejected the call because of a conflicting resource.
    #[error("{resource} '{name}' conflicts with an existing resource: {message}")]
    Conflict {
        /// Kind of resource involved.
        resource: ResourceKind,
        /// Name of the resource.
        name: String,
        /// Message returned by the platform.
        message: String,
    },
    /// Any other platform or transport failure.
    #[error("compute API error: {message}")]
    Api {
        /// Message returned by the platform or HTTP client.
        message: String,
    },
}

impl ComputeError {
    /// Reports whether the error means the resource is absent.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// The inspected subset of a remote instance.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Instance {
    /// Instance name; doubles as the machine identity.
    pub name: String,
    /// Zone hosting the instance.
    pub zone: String,
    /// Platform status string (for example `RUNNING`).
    pub status: String,
    /// Internal network address.
    pub network_ip: Option<String>,
    /// External NAT address.
    pub nat_ip: Option<String>,
}

impl Instance {
    /// Readiness predicate used by the provisioning and start waits.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.status == STATUS_RUNNING
    }
}

/// Handle to an asynchronous remote job.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Operation {
    /// Operation name used for polling.
    pub name: String,
    /// Zone the operation runs in.
    pub zone: String,
    /// Platform status string (`PENDING`, `RUNNING`, `DONE`).
    pub status: String,
    /// Error text reported by a finished operation.
    pub error: Option<String>,
}

impl Operation {
    /// Reports whether the operation reached its terminal status.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.status == STATUS_DONE
    }
}

/// The inspected subset of a persistent disk.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Disk {
    /// Disk name.
    pub name: String,
    /// Zone hosting the disk.
    pub zone: String,
    /// Platform status string (`CREATING`, `READY`, ...).
    pub status: String,
    /// Canonical resource reference used when attaching the disk.
    pub self_link: String,
}

impl Disk {
    /// Reports whether the disk can be attached.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.status == STATUS_READY
    }
}

/// A resolved boot image.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Image {
    /// Image name.
    pub name: String,
    /// Canonical resource reference.
    pub self_link: String,
}

/// A reserved external address.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Address {
    /// Address resource name.
    pub name: String,
    /// Literal IP address.
    pub address: String,
    /// Platform status (`RESERVED`, `IN_USE`).
    pub status: String,
}

impl Address {
    /// Reports whether another resource already holds the address.
    #[must_use]
    pub fn is_in_use(&self) -> bool {
        self.status == STATUS_IN_USE
    }
}

/// A resolved disk type.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct DiskType {
    /// Disk type name (for example `pd-ssd`).
    pub name: String,
    /// Canonical resource reference.
    pub self_link: String,
}

/// An unmanaged instance group.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct InstanceGroup {
    /// Group name.
    pub name: String,
    /// Zone hosting the group.
    pub zone: String,
}

/// Parameters for creating a persistent disk.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct DiskSpec {
    /// Disk name.
    pub name: String,
    /// Target zone.
    pub zone: String,
    /// Size in gigabytes.
    pub size_gb: u64,
    /// Canonical disk type reference.
    pub disk_type: String,
    /// Image to initialise the disk from, if any.
    pub source_image: Option<String>,
}

/// A disk attached to a new instance.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct AttachedDiskSpec {
    /// Canonical reference of the disk to attach.
    pub source: String,
    /// Whether the disk is the boot disk.
    pub boot: bool,
    /// Whether the platform deletes the disk with the instance.
    pub auto_delete: bool,
    /// Whether the disk is attached read-write.
    pub read_write: bool,
}

/// Scheduling policy for a new instance.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct SchedulingSpec {
    /// Whether the instance may be preempted.
    pub preemptible: bool,
    /// Whether the platform restarts the instance after failures.
    pub automatic_restart: bool,
    /// Behaviour during host maintenance (`MIGRATE` or `TERMINATE`).
    pub on_host_maintenance: String,
}

/// Service account binding for a new instance.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ServiceAccountSpec {
    /// Service account email, or `default`.
    pub email: String,
    /// Fully qualified OAuth scopes.
    pub scopes: Vec<String>,
}

/// Accelerator attachment for a new instance.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct AcceleratorSpec {
    /// Canonical accelerator type reference.
    pub accelerator_type: String,
    /// Number of accelerators.
    pub count: u32,
}

/// Shielded VM flags for a new instance.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[expect(
    clippy::struct_excessive_bools,
    reason = "mirrors the three independent shielded VM toggles"
)]
pub struct ShieldedVmSpec {
    /// Enables secure boot.
    pub secure_boot: bool,
    /// Enables the virtual TPM.
    pub vtpm: bool,
    /// Enables integrity monitoring.
    pub integrity_monitoring: bool,
}

/// Parameters for creating an instance.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
#[expect(
    clippy::struct_excessive_bools,
    reason = "request body with independent platform toggles"
)]
pub struct InstanceSpec {
    /// Instance name.
    pub name: String,
    /// Target zone.
    pub zone: String,
    /// Zone-qualified machine type reference.
    pub machine_type: String,
    /// Network reference.
    pub network: String,
    /// Subnetwork reference, when configured.
    pub subnetwork: Option<String>,
    /// Static external address, when configured.
    pub external_ip: Option<String>,
    /// Skip the external access config entirely.
    pub use_private_ip: bool,
    /// Allow the instance to forward packets.
    pub can_ip_forward: bool,
    /// Attached disks, boot disk first.
    pub disks: Vec<AttachedDiskSpec>,
    /// Instance metadata.
    pub metadata: BTreeMap<String, String>,
    /// Instance labels.
    pub labels: BTreeMap<String, String>,
    /// Network tags.
    pub tags: Vec<String>,
    /// Scheduling policy.
    pub scheduling: SchedulingSpec,
    /// Service account binding, when configured.
    pub service_account: Option<ServiceAccountSpec>,
    /// Accelerator attachments.
    pub accelerators: Vec<AcceleratorSpec>,
    /// Shielded VM flags, when any is enabled.
    pub shielded_vm: Option<ShieldedVmSpec>,
}

/// Parameters for creating an unmanaged instance group.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct InstanceGroupSpec {
    /// Group name.
    pub name: String,
    /// Target zone.
    pub zone: String,
    /// Network reference.
    pub network: String,
    /// Subnetwork reference, when configured.
    pub subnetwork: Option<String>,
    /// Human-readable description.
    pub description: String,
}

/// Remote compute API consumed by the workflows.
pub trait ComputeApi: Send + Sync {
    /// Fetches an instance by name.
    fn get_instance<'a>(&'a self, name: &'a str, zone: &'a str) -> ComputeFuture<'a, Instance>;

    /// Submits an instance creation request and returns the new instance.
    fn create_instance<'a>(&'a self, spec: &'a InstanceSpec) -> ComputeFuture<'a, Instance>;

    /// Deletes an instance.
    fn delete_instance<'a>(&'a self, name: &'a str, zone: &'a str)
    -> ComputeFuture<'a, Operation>;

    /// Starts a stopped instance.
    fn start_instance<'a>(&'a self, name: &'a str, zone: &'a str) -> ComputeFuture<'a, Operation>;

    /// Stops a running instance.
    fn stop_instance<'a>(&'a self, name: &'a str, zone: &'a str) -> ComputeFuture<'a, Operation>;

    /// Fetches the current state of an operation.
    fn get_operation<'a>(&'a self, name: &'a str, zone: &'a str) -> ComputeFuture<'a, Operation>;

    /// Fetches a disk by name.
    fn get_disk<'a>(&'a self, name: &'a str, zone: &'a str) -> ComputeFuture<'a, Disk>;

    /// Creates a disk.
    fn create_disk<'a>(&'a self, spec: &'a DiskSpec) -> ComputeFuture<'a, Disk>;

    /// Deletes a disk.
    fn delete_disk<'a>(&'a self, name: &'a str, zone: &'a str) -> ComputeFuture<'a, Operation>;

    /// Fetches an image by name from `project`.
    fn get_image<'a>(&'a self, name: &'a str, project: &'a str) -> ComputeFuture<'a, Image>;

    /// Fetches the latest non-deprecated image of a family from `project`.
    fn get_image_from_family<'a>(
        &'a self,
        family: &'a str,
        project: &'a str,
    ) -> ComputeFuture<'a, Image>;

    /// Finds a regional address by literal IP or by resource name.
    fn get_address<'a>(
        &'a self,
        address_or_name: &'a str,
        region: &'a str,
    ) -> ComputeFuture<'a, Address>;

    /// Fetches a disk type by name.
    fn get_disk_type<'a>(&'a self, name: &'a str, zone: &'a str) -> ComputeFuture<'a, DiskType>;

    /// Fetches an unmanaged instance group.
    fn get_instance_group<'a>(
        &'a self,
        name: &'a str,
        zone: &'a str,
    ) -> ComputeFuture<'a, InstanceGroup>;

    /// Creates an unmanaged instance group.
    fn create_instance_group<'a>(
        &'a self,
        spec: &'a InstanceGroupSpec,
    ) -> ComputeFuture<'a, InstanceGroup>;

    /// Adds instances to an unmanaged instance group.
    fn add_instances_to_group<'a>(
        &'a self,
        group: &'a str,
        zone: &'a str,
        instances: &'a [String],
    ) -> ComputeFuture<'a, Operation>;
}

/// Builds a compute handle for a zone configuration.
pub trait Connector: Send + Sync {
    /// Returns a handle bound to the configuration's project.
    ///
    /// # Errors
    ///
    /// Returns [`ComputeError`] when the handle cannot be built, for example
    /// because credentials are missing.
    fn connect(&self, config: &ZoneConfig) -> Result<Arc<dyn ComputeApi>, ComputeError>;
}

/// Hands out a pre-built compute handle.
#[derive(Clone)]
pub struct StaticConnector(pub Arc<dyn ComputeApi>);

impl Connector for StaticConnector {
    fn connect(&self, _config: &ZoneConfig) -> Result<Arc<dyn ComputeApi>, ComputeError> {
        Ok(Arc::clone(&self.0))
    }
}

/// Derives the region from a zone name (`us-central1-f` → `us-central1`).
#[must_use]
pub fn region_of(zone: &str) -> &str {
    zone.rsplit_once('-').map_or(zone, |(region, _)| region)
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("us-central1-f", "us-central1")]
    #[case("europe-west4-a", "europe-west4")]
    #[case("nozone", "nozone")]
    fn region_strips_zone_suffix(#[case] zone: &str, #[case] region: &str) {
        assert_eq!(region_of(zone), region);
    }

    #[test]
    fn readiness_predicates_follow_status_strings() {
        let instance = Instance {
            status: String::from("RUNNING"),
            ..Instance::default()
        };
        assert!(instance.is_ready());
        assert!(
            !Instance {
                status: String::from("STAGING"),
                ..Instance::default()
            }
            .is_ready()
        );
        assert!(
            Operation {
                status: String::from("DONE"),
                ..Operation::default()
            }
            .is_done()
        );
        assert!(
            Address {
                status: String::from("IN_USE"),
                ..Address::default()
            }
            .is_in_use()
        );
    }
}

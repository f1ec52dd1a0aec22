//! Machine settings, zone overrides and the compiled per-zone view.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use crate::compute::region_of;

/// Zone used when none is configured.
pub const DEFAULT_ZONE: &str = "us-central1-f";
/// Machine type used when none is configured.
pub const DEFAULT_MACHINE_TYPE: &str = "n1-standard-1";
/// Boot disk size in gigabytes used when none is configured.
pub const DEFAULT_DISK_SIZE_GB: u64 = 10;
/// Disk type used when none is configured.
pub const DEFAULT_DISK_TYPE: &str = "pd-standard";
/// Network used when none is configured.
pub const DEFAULT_NETWORK: &str = "default";
/// Seconds to wait for an instance to report `RUNNING`.
pub const DEFAULT_READY_TIMEOUT_SECS: i64 = 20;
/// SSH port probed on the guest.
pub const DEFAULT_SSH_PORT: u16 = 22;

const DEFAULT_ON_HOST_MAINTENANCE: &str = "MIGRATE";

/// An extra disk attached alongside the boot disk.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(default)]
pub struct AdditionalDisk {
    /// Disk name; defaults to `<instance>-additional-disk-<index>`.
    pub disk_name: Option<String>,
    /// Size in gigabytes; defaults to the boot disk default.
    pub disk_size: Option<u64>,
    /// Disk type; defaults to `pd-standard`.
    pub disk_type: Option<String>,
    /// Image to initialise the disk from.
    pub image: Option<String>,
    /// Image family to initialise the disk from.
    pub image_family: Option<String>,
    /// Project hosting `image` or `image_family`.
    pub image_project_id: Option<String>,
    /// Whether the disk is deleted together with the instance.
    pub autodelete_disk: Option<bool>,
}

/// An accelerator attached to the instance.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
pub struct Accelerator {
    /// Accelerator type name (for example `nvidia-tesla-t4`).
    #[serde(rename = "type")]
    pub accelerator_type: String,
    /// Number of accelerators.
    #[serde(default = "default_accelerator_count")]
    pub count: u32,
}

const fn default_accelerator_count() -> u32 {
    1
}

/// Machine settings as written in `drydock.toml`.
///
/// Every field is optional so a zone override only needs to name what it
/// changes.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(default)]
pub struct MachineSettings {
    /// Project that owns the instance.
    pub project_id: Option<String>,
    /// Instance name.
    pub name: Option<String>,
    /// Boot image name.
    pub image: Option<String>,
    /// Boot image family.
    pub image_family: Option<String>,
    /// Project hosting the boot image.
    pub image_project_id: Option<String>,
    /// Unmanaged instance group joined after creation.
    pub instance_group: Option<String>,
    /// Machine type.
    pub machine_type: Option<String>,
    /// Boot disk size in gigabytes.
    pub disk_size: Option<u64>,
    /// Boot disk name; defaults to the instance name.
    pub disk_name: Option<String>,
    /// Boot disk type.
    pub disk_type: Option<String>,
    /// Whether the boot disk is deleted together with the instance.
    pub autodelete_disk: Option<bool>,
    /// Network name.
    pub network: Option<String>,
    /// Project hosting the network.
    pub network_project_id: Option<String>,
    /// Subnetwork name.
    pub subnetwork: Option<String>,
    /// Reserved external address, by literal IP or by name.
    pub external_ip: Option<String>,
    /// Skip the external address and reach the guest on its internal IP.
    pub use_private_ip: Option<bool>,
    /// Allow the instance to forward packets.
    pub can_ip_forward: Option<bool>,
    /// Instance metadata; merged with the base settings.
    pub metadata: BTreeMap<String, String>,
    /// Instance labels; merged with the base settings.
    pub labels: BTreeMap<String, String>,
    /// Network tags; unioned with the base settings.
    pub tags: Vec<String>,
    /// Whether the instance may be preempted.
    pub preemptible: Option<bool>,
    /// Whether the platform restarts the instance after failures.
    pub auto_restart: Option<bool>,
    /// Host maintenance behaviour (`MIGRATE` or `TERMINATE`).
    pub on_host_maintenance: Option<String>,
    /// Service account email.
    pub service_account: Option<String>,
    /// OAuth scopes granted to the service account.
    pub scopes: Option<Vec<String>>,
    /// Extra disks; concatenated with the base settings.
    pub additional_disks: Vec<AdditionalDisk>,
    /// Accelerators attached to the instance.
    pub accelerators: Option<Vec<Accelerator>>,
    /// Enables secure boot.
    pub enable_secure_boot: Option<bool>,
    /// Enables the virtual TPM.
    pub enable_vtpm: Option<bool>,
    /// Enables integrity monitoring.
    pub enable_integrity_monitoring: Option<bool>,
    /// Seconds to wait for the instance to report `RUNNING`.
    pub instance_ready_timeout: Option<i64>,
    /// SSH port on the guest.
    pub ssh_port: Option<u16>,
}

impl MachineSettings {
    /// Layers `over` on top of `self`. Scalars from `over` win, maps merge
    /// with `over` winning, tags union and additional disks concatenate.
    #[must_use]
    pub fn merged_with(&self, over: &Self) -> Self {
        let mut metadata = self.metadata.clone();
        metadata.extend(over.metadata.clone());
        let mut labels = self.labels.clone();
        labels.extend(over.labels.clone());
        let mut tags = self.tags.clone();
        for tag in &over.tags {
            if !tags.contains(tag) {
                tags.push(tag.clone());
            }
        }
        let mut additional_disks = self.additional_disks.clone();
        additional_disks.extend(over.additional_disks.iter().cloned());

        Self {
            project_id: pick(over.project_id.as_ref(), self.project_id.as_ref()),
            name: pick(over.name.as_ref(), self.name.as_ref()),
            image: pick(over.image.as_ref(), self.image.as_ref()),
            image_family: pick(over.image_family.as_ref(), self.image_family.as_ref()),
            image_project_id: pick(over.image_project_id.as_ref(), self.image_project_id.as_ref()),
            instance_group: pick(over.instance_group.as_ref(), self.instance_group.as_ref()),
            machine_type: pick(over.machine_type.as_ref(), self.machine_type.as_ref()),
            disk_size: over.disk_size.or(self.disk_size),
            disk_name: pick(over.disk_name.as_ref(), self.disk_name.as_ref()),
            disk_type: pick(over.disk_type.as_ref(), self.disk_type.as_ref()),
            autodelete_disk: over.autodelete_disk.or(self.autodelete_disk),
            network: pick(over.network.as_ref(), self.network.as_ref()),
            network_project_id: pick(over.network_project_id.as_ref(), self.network_project_id.as_ref()),
            subnetwork: pick(over.subnetwork.as_ref(), self.subnetwork.as_ref()),
            external_ip: pick(over.external_ip.as_ref(), self.external_ip.as_ref()),
            use_private_ip: over.use_private_ip.or(self.use_private_ip),
            can_ip_forward: over.can_ip_forward.or(self.can_ip_forward),
            metadata,
            labels,
            tags,
            preemptible: over.preemptible.or(self.preemptible),
            auto_restart: over.auto_restart.or(self.auto_restart),
            on_host_maintenance: pick(over.on_host_maintenance.as_ref(), self.on_host_maintenance.as_ref()),
            service_account: pick(over.service_account.as_ref(), self.service_account.as_ref()),
            scopes: pick(over.scopes.as_ref(), self.scopes.as_ref()),
            additional_disks,
            accelerators: pick(over.accelerators.as_ref(), self.accelerators.as_ref()),
            enable_secure_boot: over.enable_secure_boot.or(self.enable_secure_boot),
            enable_vtpm: over.enable_vtpm.or(self.enable_vtpm),
            enable_integrity_monitoring: over
                .enable_integrity_monitoring
                .or(self.enable_integrity_monitoring),
            instance_ready_timeout: over.instance_ready_timeout.or(self.instance_ready_timeout),
            ssh_port: over.ssh_port.or(self.ssh_port),
        }
    }
}

fn pick<T: Clone>(over: Option<&T>, base: Option<&T>) -> Option<T> {
    over.or(base).cloned()
}

/// The `[google]` table of `drydock.toml`.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(default)]
pub struct ProviderConfig {
    /// Zone the machine lives in.
    pub zone: Option<String>,
    /// Base machine settings.
    #[serde(flatten)]
    pub settings: MachineSettings,
    /// Per-zone overrides keyed by zone name.
    pub zones: BTreeMap<String, MachineSettings>,
}

impl ProviderConfig {
    /// Fills the project when the file leaves it unset.
    #[must_use]
    pub fn with_default_project(mut self, project_id: &str) -> Self {
        if self.settings.project_id.is_none() && !project_id.trim().is_empty() {
            self.settings.project_id = Some(project_id.to_owned());
        }
        self
    }

    /// Applies defaults and compiles one [`ZoneConfig`] per override.
    #[must_use]
    pub fn finalize(self) -> FinalizedConfig {
        self.finalize_at(Utc::now())
    }

    /// Same as [`Self::finalize`], using `now` for the generated name.
    #[must_use]
    pub fn finalize_at(mut self, now: DateTime<Utc>) -> FinalizedConfig {
        if self.settings.name.is_none() {
            self.settings.name = Some(default_instance_name(now));
        }
        let default_zone = self.zone.unwrap_or_else(|| DEFAULT_ZONE.to_owned());
        let base = ZoneConfig::resolve(&default_zone, &self.settings);
        let zones = self
            .zones
            .iter()
            .map(|(zone, over)| {
                let merged = self.settings.merged_with(over);
                (zone.clone(), ZoneConfig::resolve(zone, &merged))
            })
            .collect();
        FinalizedConfig {
            default_zone,
            base,
            zones,
        }
    }
}

/// Generates `i-<YYYYMMDDHH>-<4 hex>` names.
#[must_use]
pub fn default_instance_name(now: DateTime<Utc>) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    let short = suffix.get(..4).unwrap_or("0000");
    format!("i-{}-{short}", now.format("%Y%m%d%H"))
}

/// Provider configuration after defaults and zone overrides were applied.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FinalizedConfig {
    default_zone: String,
    base: ZoneConfig,
    zones: BTreeMap<String, ZoneConfig>,
}

impl FinalizedConfig {
    /// Zone the machine lives in.
    #[must_use]
    pub fn default_zone(&self) -> &str {
        &self.default_zone
    }

    /// Compiled configuration for `zone`; falls back to the base settings.
    #[must_use]
    pub fn zone_config(&self, zone: &str) -> &ZoneConfig {
        self.zones.get(zone).unwrap_or(&self.base)
    }

    /// Configuration of the machine's zone.
    #[must_use]
    pub fn active(&self) -> &ZoneConfig {
        self.zone_config(&self.default_zone)
    }
}

/// Fully resolved settings for one zone.
#[derive(Clone, Debug, Eq, PartialEq)]
#[expect(
    clippy::struct_excessive_bools,
    reason = "configuration struct with user-facing toggle settings that are naturally expressed as booleans"
)]
pub struct ZoneConfig {
    /// Project that owns the instance.
    pub project_id: String,
    /// Zone name.
    pub zone: String,
    /// Instance name.
    pub name: String,
    /// Boot image name.
    pub image: Option<String>,
    /// Boot image family.
    pub image_family: Option<String>,
    /// Project hosting the boot image.
    pub image_project_id: Option<String>,
    /// Unmanaged instance group joined after creation.
    pub instance_group: Option<String>,
    /// Machine type.
    pub machine_type: String,
    /// Boot disk size in gigabytes.
    pub disk_size: u64,
    /// Boot disk name, when it differs from the instance name.
    pub disk_name: Option<String>,
    /// Boot disk type.
    pub disk_type: String,
    /// Whether the boot disk is deleted together with the instance.
    pub autodelete_disk: bool,
    /// Network name.
    pub network: String,
    /// Project hosting the network.
    pub network_project_id: Option<String>,
    /// Subnetwork name.
    pub subnetwork: Option<String>,
    /// Reserved external address.
    pub external_ip: Option<String>,
    /// Reach the guest on its internal IP and skip the external address.
    pub use_private_ip: bool,
    /// Allow the instance to forward packets.
    pub can_ip_forward: bool,
    /// Instance metadata.
    pub metadata: BTreeMap<String, String>,
    /// Instance labels.
    pub labels: BTreeMap<String, String>,
    /// Network tags.
    pub tags: Vec<String>,
    /// Whether the instance may be preempted.
    pub preemptible: bool,
    /// Whether the platform restarts the instance after failures.
    pub auto_restart: bool,
    /// Host maintenance behaviour.
    pub on_host_maintenance: String,
    /// Service account email.
    pub service_account: Option<String>,
    /// OAuth scopes granted to the service account.
    pub scopes: Vec<String>,
    /// Extra disks.
    pub additional_disks: Vec<AdditionalDisk>,
    /// Accelerators.
    pub accelerators: Vec<Accelerator>,
    /// Enables secure boot.
    pub enable_secure_boot: bool,
    /// Enables the virtual TPM.
    pub enable_vtpm: bool,
    /// Enables integrity monitoring.
    pub enable_integrity_monitoring: bool,
    /// Seconds to wait for the instance to report `RUNNING`.
    pub instance_ready_timeout: i64,
    /// SSH port on the guest.
    pub ssh_port: u16,
}

impl ZoneConfig {
    fn resolve(zone: &str, settings: &MachineSettings) -> Self {
        Self {
            project_id: settings.project_id.clone().unwrap_or_default(),
            zone: zone.to_owned(),
            name: settings.name.clone().unwrap_or_default(),
            image: settings.image.clone(),
            image_family: settings.image_family.clone(),
            image_project_id: settings.image_project_id.clone(),
            instance_group: settings.instance_group.clone(),
            machine_type: settings
                .machine_type
                .clone()
                .unwrap_or_else(|| DEFAULT_MACHINE_TYPE.to_owned()),
            disk_size: settings.disk_size.unwrap_or(DEFAULT_DISK_SIZE_GB),
            disk_name: settings.disk_name.clone(),
            disk_type: settings
                .disk_type
                .clone()
                .unwrap_or_else(|| DEFAULT_DISK_TYPE.to_owned()),
            autodelete_disk: settings.autodelete_disk.unwrap_or(true),
            network: settings
                .network
                .clone()
                .unwrap_or_else(|| DEFAULT_NETWORK.to_owned()),
            network_project_id: settings.network_project_id.clone(),
            subnetwork: settings.subnetwork.clone(),
            external_ip: settings.external_ip.clone(),
            use_private_ip: settings.use_private_ip.unwrap_or(false),
            can_ip_forward: settings.can_ip_forward.unwrap_or(false),
            metadata: settings.metadata.clone(),
            labels: settings.labels.clone(),
            tags: settings.tags.clone(),
            preemptible: settings.preemptible.unwrap_or(false),
            auto_restart: settings.auto_restart.unwrap_or(true),
            on_host_maintenance: settings
                .on_host_maintenance
                .clone()
                .unwrap_or_else(|| DEFAULT_ON_HOST_MAINTENANCE.to_owned()),
            service_account: settings.service_account.clone(),
            scopes: settings.scopes.clone().unwrap_or_default(),
            additional_disks: settings.additional_disks.clone(),
            accelerators: settings.accelerators.clone().unwrap_or_default(),
            enable_secure_boot: settings.enable_secure_boot.unwrap_or(false),
            enable_vtpm: settings.enable_vtpm.unwrap_or(false),
            enable_integrity_monitoring: settings.enable_integrity_monitoring.unwrap_or(false),
            instance_ready_timeout: settings
                .instance_ready_timeout
                .unwrap_or(DEFAULT_READY_TIMEOUT_SECS),
            ssh_port: settings.ssh_port.unwrap_or(DEFAULT_SSH_PORT),
        }
    }

    /// Project hosting the boot image.
    #[must_use]
    pub fn image_project(&self) -> &str {
        self.image_project_id.as_deref().unwrap_or(&self.project_id)
    }

    /// Project hosting the network.
    #[must_use]
    pub fn network_project(&self) -> &str {
        self.network_project_id
            .as_deref()
            .unwrap_or(&self.project_id)
    }

    /// Region containing the zone.
    #[must_use]
    pub fn region(&self) -> &str {
        region_of(&self.zone)
    }

    /// Name of the boot disk.
    #[must_use]
    pub fn boot_disk_name(&self) -> &str {
        self.disk_name.as_deref().unwrap_or(&self.name)
    }
}

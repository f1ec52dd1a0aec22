//! JSON shapes of the Compute Engine v1 REST API and their conversions.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::compute::{
    Address, Disk, DiskSpec, DiskType, Image, Instance, InstanceGroupSpec, InstanceSpec,
    Operation,
};

/// Status the platform reports for a stopped instance.
const PLATFORM_STOPPED: &str = "TERMINATED";

/// Last path segment of a resource URL (`.../zones/us-central1-f` →
/// `us-central1-f`).
pub(super) fn last_segment(url: &str) -> &str {
    url.rsplit('/').next().unwrap_or(url)
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub(super) struct InstanceBody {
    name: String,
    zone: String,
    status: String,
    network_interfaces: Vec<NetworkInterfaceBody>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct NetworkInterfaceBody {
    #[serde(rename = "networkIP")]
    network_ip: Option<String>,
    access_configs: Vec<AccessConfigBody>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct AccessConfigBody {
    #[serde(rename = "natIP")]
    nat_ip: Option<String>,
}

impl From<InstanceBody> for Instance {
    fn from(body: InstanceBody) -> Self {
        let primary = body.network_interfaces.into_iter().next();
        let (network_ip, nat_ip) = primary.map_or((None, None), |nic| {
            let nat_ip = nic
                .access_configs
                .into_iter()
                .find_map(|config| config.nat_ip);
            (nic.network_ip, nat_ip)
        });
        let status = if body.status == PLATFORM_STOPPED {
            String::from("STOPPED")
        } else {
            body.status
        };
        Self {
            name: body.name,
            zone: last_segment(&body.zone).to_owned(),
            status,
            network_ip,
            nat_ip,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub(super) struct OperationBody {
    name: String,
    zone: String,
    status: String,
    error: Option<OperationErrorBody>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct OperationErrorBody {
    errors: Vec<ErrorItem>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ErrorItem {
    code: String,
    message: String,
}

impl From<OperationBody> for Operation {
    fn from(body: OperationBody) -> Self {
        let error = body.error.map(|error| {
            error
                .errors
                .into_iter()
                .map(|item| format!("{}: {}", item.code, item.message))
                .collect::<Vec<_>>()
                .join("; ")
        });
        Self {
            name: body.name,
            zone: last_segment(&body.zone).to_owned(),
            status: body.status,
            error,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub(super) struct DiskBody {
    name: String,
    zone: String,
    status: String,
    self_link: String,
}

impl From<DiskBody> for Disk {
    fn from(body: DiskBody) -> Self {
        Self {
            name: body.name,
            zone: last_segment(&body.zone).to_owned(),
            status: body.status,
            self_link: body.self_link,
        }
    }
}

/// Body shared by images and disk types: a name and a link.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub(super) struct LinkedBody {
    name: String,
    self_link: String,
}

impl LinkedBody {
    pub(super) fn into_name(self) -> String {
        self.name
    }
}

impl From<LinkedBody> for Image {
    fn from(body: LinkedBody) -> Self {
        Self {
            name: body.name,
            self_link: body.self_link,
        }
    }
}

impl From<LinkedBody> for DiskType {
    fn from(body: LinkedBody) -> Self {
        Self {
            name: body.name,
            self_link: body.self_link,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(super) struct AddressBody {
    name: String,
    address: String,
    status: String,
}

impl From<AddressBody> for Address {
    fn from(body: AddressBody) -> Self {
        Self {
            name: body.name,
            address: body.address,
            status: body.status,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(super) struct AddressList {
    pub(super) items: Vec<AddressBody>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(super) struct ErrorEnvelope {
    error: ErrorDetail,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ErrorDetail {
    message: String,
}

/// Extracts the platform's error message, falling back to the raw body.
pub(super) fn error_message(body: &[u8]) -> String {
    serde_json::from_slice::<ErrorEnvelope>(body)
        .ok()
        .map(|envelope| envelope.error.message)
        .filter(|message| !message.is_empty())
        .unwrap_or_else(|| String::from_utf8_lossy(body).trim().to_owned())
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct InstanceInsert {
    name: String,
    machine_type: String,
    can_ip_forward: bool,
    disks: Vec<AttachedDiskInsert>,
    network_interfaces: Vec<NetworkInterfaceInsert>,
    metadata: MetadataInsert,
    labels: BTreeMap<String, String>,
    tags: TagsInsert,
    scheduling: SchedulingInsert,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    service_accounts: Vec<ServiceAccountInsert>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    guest_accelerators: Vec<AcceleratorInsert>,
    #[serde(skip_serializing_if = "Option::is_none")]
    shielded_instance_config: Option<ShieldedInsert>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AttachedDiskInsert {
    boot: bool,
    auto_delete: bool,
    mode: &'static str,
    source: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct NetworkInterfaceInsert {
    network: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    subnetwork: Option<String>,
    access_configs: Vec<AccessConfigInsert>,
}

#[derive(Debug, Serialize)]
struct AccessConfigInsert {
    name: &'static str,
    #[serde(rename = "type")]
    kind: &'static str,
    #[serde(rename = "natIP", skip_serializing_if = "Option::is_none")]
    nat_ip: Option<String>,
}

#[derive(Debug, Serialize)]
struct MetadataInsert {
    items: Vec<MetadataItem>,
}

#[derive(Debug, Serialize)]
struct MetadataItem {
    key: String,
    value: String,
}

#[derive(Debug, Serialize)]
struct TagsInsert {
    items: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SchedulingInsert {
    preemptible: bool,
    automatic_restart: bool,
    on_host_maintenance: String,
}

#[derive(Debug, Serialize)]
struct ServiceAccountInsert {
    email: String,
    scopes: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AcceleratorInsert {
    accelerator_type: String,
    accelerator_count: u32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ShieldedInsert {
    enable_secure_boot: bool,
    enable_vtpm: bool,
    enable_integrity_monitoring: bool,
}

impl From<&InstanceSpec> for InstanceInsert {
    fn from(spec: &InstanceSpec) -> Self {
        let access_configs = if spec.use_private_ip {
            Vec::new()
        } else {
            vec![AccessConfigInsert {
                name: "External NAT",
                kind: "ONE_TO_ONE_NAT",
                nat_ip: spec.external_ip.clone(),
            }]
        };
        Self {
            name: spec.name.clone(),
            machine_type: spec.machine_type.clone(),
            can_ip_forward: spec.can_ip_forward,
            disks: spec
                .disks
                .iter()
                .map(|disk| AttachedDiskInsert {
                    boot: disk.boot,
                    auto_delete: disk.auto_delete,
                    mode: if disk.read_write {
                        "READ_WRITE"
                    } else {
                        "READ_ONLY"
                    },
                    source: disk.source.clone(),
                })
                .collect(),
            network_interfaces: vec![NetworkInterfaceInsert {
                network: spec.network.clone(),
                subnetwork: spec.subnetwork.clone(),
                access_configs,
            }],
            metadata: MetadataInsert {
                items: spec
                    .metadata
                    .iter()
                    .map(|(key, value)| MetadataItem {
                        key: key.clone(),
                        value: value.clone(),
                    })
                    .collect(),
            },
            labels: spec.labels.clone(),
            tags: TagsInsert {
                items: spec.tags.clone(),
            },
            scheduling: SchedulingInsert {
                preemptible: spec.scheduling.preemptible,
                automatic_restart: spec.scheduling.automatic_restart,
                on_host_maintenance: spec.scheduling.on_host_maintenance.clone(),
            },
            service_accounts: spec
                .service_account
                .iter()
                .map(|account| ServiceAccountInsert {
                    email: account.email.clone(),
                    scopes: account.scopes.clone(),
                })
                .collect(),
            guest_accelerators: spec
                .accelerators
                .iter()
                .map(|accelerator| AcceleratorInsert {
                    accelerator_type: accelerator.accelerator_type.clone(),
                    accelerator_count: accelerator.count,
                })
                .collect(),
            shielded_instance_config: spec.shielded_vm.map(|flags| ShieldedInsert {
                enable_secure_boot: flags.secure_boot,
                enable_vtpm: flags.vtpm,
                enable_integrity_monitoring: flags.integrity_monitoring,
            }),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct DiskInsert {
    name: String,
    size_gb: String,
    #[serde(rename = "type")]
    disk_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    source_image: Option<String>,
}

impl From<&DiskSpec> for DiskInsert {
    fn from(spec: &DiskSpec) -> Self {
        Self {
            name: spec.name.clone(),
            size_gb: spec.size_gb.to_string(),
            disk_type: spec.disk_type.clone(),
            source_image: spec.source_image.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct InstanceGroupInsert {
    name: String,
    network: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    subnetwork: Option<String>,
    description: String,
}

impl From<&InstanceGroupSpec> for InstanceGroupInsert {
    fn from(spec: &InstanceGroupSpec) -> Self {
        Self {
            name: spec.name.clone(),
            network: spec.network.clone(),
            subnetwork: spec.subnetwork.clone(),
            description: spec.description.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub(super) struct AddInstancesRequest {
    instances: Vec<InstanceReference>,
}

#[derive(Debug, Serialize)]
struct InstanceReference {
    instance: String,
}

impl AddInstancesRequest {
    pub(super) fn new(zone: &str, instances: &[String]) -> Self {
        Self {
            instances: instances
                .iter()
                .map(|name| InstanceReference {
                    instance: format!("zones/{zone}/instances/{name}"),
                })
                .collect(),
        }
    }
}

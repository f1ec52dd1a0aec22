//! Builds the instance creation request from the zone configuration.

use crate::compute::{
    AcceleratorSpec, AttachedDiskSpec, Disk, InstanceSpec, SchedulingSpec, ServiceAccountSpec,
    ShieldedVmSpec,
};
use crate::config::{DEFAULT_NETWORK, ZoneConfig};

use super::resolve::{ResolvedDisk, ResolvedReferences};

const SCOPE_PREFIX: &str = "https://www.googleapis.com/auth/";

/// Network reference; the `default` network is addressed globally.
#[must_use]
pub(in crate::actions) fn network_ref(config: &ZoneConfig) -> String {
    if config.network == DEFAULT_NETWORK {
        format!("global/networks/{DEFAULT_NETWORK}")
    } else {
        format!(
            "projects/{}/global/networks/{}",
            config.network_project(),
            config.network
        )
    }
}

/// Subnetwork reference qualified by the network project and region.
#[must_use]
pub(in crate::actions) fn subnetwork_ref(config: &ZoneConfig) -> Option<String> {
    config.subnetwork.as_ref().map(|subnetwork| {
        format!(
            "projects/{}/regions/{}/subnetworks/{subnetwork}",
            config.network_project(),
            config.region()
        )
    })
}

fn qualify_scope(scope: &str) -> String {
    if scope.starts_with("https://") {
        scope.to_owned()
    } else {
        format!("{SCOPE_PREFIX}{scope}")
    }
}

pub(super) fn instance_spec(
    config: &ZoneConfig,
    resolved: &ResolvedReferences,
    boot: &Disk,
    additional: &[(Disk, &ResolvedDisk)],
) -> InstanceSpec {
    let mut disks = vec![AttachedDiskSpec {
        source: boot.self_link.clone(),
        boot: true,
        auto_delete: config.autodelete_disk,
        read_write: true,
    }];
    disks.extend(additional.iter().map(|(disk, wanted)| AttachedDiskSpec {
        source: disk.self_link.clone(),
        boot: false,
        auto_delete: wanted.auto_delete,
        read_write: true,
    }));

    let service_account = (config.service_account.is_some() || !config.scopes.is_empty()).then(
        || ServiceAccountSpec {
            email: config
                .service_account
                .clone()
                .unwrap_or_else(|| String::from("default")),
            scopes: config.scopes.iter().map(|scope| qualify_scope(scope)).collect(),
        },
    );

    let shielded = ShieldedVmSpec {
        secure_boot: config.enable_secure_boot,
        vtpm: config.enable_vtpm,
        integrity_monitoring: config.enable_integrity_monitoring,
    };

    InstanceSpec {
        name: config.name.clone(),
        zone: config.zone.clone(),
        machine_type: format!("zones/{}/machineTypes/{}", config.zone, config.machine_type),
        network: network_ref(config),
        subnetwork: subnetwork_ref(config),
        external_ip: resolved.external_ip.clone(),
        use_private_ip: config.use_private_ip,
        can_ip_forward: config.can_ip_forward,
        disks,
        metadata: config.metadata.clone(),
        labels: config.labels.clone(),
        tags: config.tags.clone(),
        scheduling: SchedulingSpec {
            preemptible: config.preemptible,
            automatic_restart: config.auto_restart,
            on_host_maintenance: config.on_host_maintenance.clone(),
        },
        service_account,
        accelerators: config
            .accelerators
            .iter()
            .map(|accelerator| AcceleratorSpec {
                accelerator_type: format!(
                    "projects/{}/zones/{}/acceleratorTypes/{}",
                    config.project_id, config.zone, accelerator.accelerator_type
                ),
                count: accelerator.count,
            })
            .collect(),
        shielded_vm: (shielded != ShieldedVmSpec::default()).then_some(shielded),
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::test_support::{Harness, disk};

    fn resolved() -> ResolvedReferences {
        ResolvedReferences {
            image: String::from("projects/proj/global/images/debian-12"),
            external_ip: None,
            boot_disk_type: String::from("pd-standard"),
            additional: Vec::new(),
        }
    }

    #[rstest]
    #[case::default_network(None, None, "global/networks/default")]
    #[case::shared_vpc(Some("vpc"), Some("host"), "projects/host/global/networks/vpc")]
    #[case::own_project(Some("vpc"), None, "projects/proj/global/networks/vpc")]
    fn network_reference(
        #[case] network: Option<&str>,
        #[case] network_project: Option<&str>,
        #[case] expected: &str,
    ) {
        let config = Harness::builder()
            .configure(|settings| {
                settings.network = network.map(str::to_owned);
                settings.network_project_id = network_project.map(str::to_owned);
            })
            .build()
            .zone_config();

        assert_eq!(network_ref(&config), expected);
    }

    #[test]
    fn subnetwork_is_qualified_by_region() {
        let config = Harness::builder()
            .configure(|settings| settings.subnetwork = Some(String::from("dev")))
            .build()
            .zone_config();

        assert_eq!(
            subnetwork_ref(&config).as_deref(),
            Some("projects/proj/regions/us-central1/subnetworks/dev")
        );
    }

    #[test]
    fn request_carries_boot_disk_first_and_scheduling() {
        let config = Harness::builder()
            .configure(|settings| {
                settings.preemptible = Some(true);
                settings.auto_restart = Some(false);
                settings.on_host_maintenance = Some(String::from("TERMINATE"));
                settings.autodelete_disk = Some(false);
                settings.scopes = Some(vec![String::from("cloud-platform")]);
                settings.enable_vtpm = Some(true);
            })
            .build()
            .zone_config();
        let extra = ResolvedDisk {
            name: String::from("vm-additional-disk-0"),
            size_gb: 10,
            disk_type: String::from("pd-standard"),
            source_image: None,
            auto_delete: true,
        };
        let spec = instance_spec(
            &config,
            &resolved(),
            &disk("vm", "us-central1-f"),
            &[(disk("vm-additional-disk-0", "us-central1-f"), &extra)],
        );

        assert_eq!(spec.machine_type, "zones/us-central1-f/machineTypes/n1-standard-1");
        let [boot, data] = spec.disks.as_slice() else {
            panic!("expected two disks, got {:?}", spec.disks);
        };
        assert!(boot.boot && !boot.auto_delete);
        assert!(!data.boot && data.auto_delete && data.read_write);
        assert!(spec.scheduling.preemptible);
        assert!(!spec.scheduling.automatic_restart);
        assert_eq!(
            spec.service_account.map(|account| account.scopes),
            Some(vec![String::from(
                "https://www.googleapis.com/auth/cloud-platform"
            )])
        );
        assert_eq!(spec.shielded_vm.map(|flags| flags.vtpm), Some(true));
    }
}

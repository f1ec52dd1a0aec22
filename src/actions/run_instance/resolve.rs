//! Reference resolution performed before any mutating call.

use crate::compute::{ComputeApi, ComputeError, ResourceKind};
use crate::config::{
    AdditionalDisk, DEFAULT_DISK_SIZE_GB, DEFAULT_DISK_TYPE, ValidationIssue, ZoneConfig,
};
use crate::error::ActionError;

/// Everything the instance request refers to, resolved to canonical links.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(super) struct ResolvedReferences {
    /// Boot image link.
    pub(super) image: String,
    /// Literal external address, when one is configured.
    pub(super) external_ip: Option<String>,
    /// Boot disk type link.
    pub(super) boot_disk_type: String,
    /// Additional disks with defaults applied.
    pub(super) additional: Vec<ResolvedDisk>,
}

/// An additional disk with its name and type resolved.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(super) struct ResolvedDisk {
    pub(super) name: String,
    pub(super) size_gb: u64,
    pub(super) disk_type: String,
    pub(super) source_image: Option<String>,
    pub(super) auto_delete: bool,
}

pub(super) async fn resolve_references(
    compute: &dyn ComputeApi,
    config: &ZoneConfig,
) -> Result<ResolvedReferences, ActionError> {
    let image = resolve_image(
        compute,
        config.image.as_deref(),
        config.image_family.as_deref(),
        config.image_project(),
    )
    .await?
    .ok_or_else(|| ActionError::validation(ValidationIssue::ImageRequired))?;

    let external_ip = match config.external_ip.as_deref() {
        Some(wanted) if !config.use_private_ip => {
            Some(resolve_address(compute, wanted, config.region()).await?)
        }
        _ => None,
    };

    let boot_disk_type = compute
        .get_disk_type(&config.disk_type, &config.zone)
        .await?
        .self_link;

    let mut additional = Vec::with_capacity(config.additional_disks.len());
    for (index, disk) in config.additional_disks.iter().enumerate() {
        additional.push(resolve_additional(compute, config, index, disk).await?);
    }

    Ok(ResolvedReferences {
        image,
        external_ip,
        boot_disk_type,
        additional,
    })
}

async fn resolve_image(
    compute: &dyn ComputeApi,
    image: Option<&str>,
    family: Option<&str>,
    project: &str,
) -> Result<Option<String>, ActionError> {
    let resolved = match (image, family) {
        (Some(_), Some(_)) => {
            return Err(ActionError::validation(
                ValidationIssue::ImageAndImageFamilySet,
            ));
        }
        (Some(name), None) => compute.get_image(name, project).await?,
        (None, Some(family)) => compute.get_image_from_family(family, project).await?,
        (None, None) => return Ok(None),
    };
    Ok(Some(resolved.self_link))
}

async fn resolve_address(
    compute: &dyn ComputeApi,
    wanted: &str,
    region: &str,
) -> Result<String, ActionError> {
    let address = compute
        .get_address(wanted, region)
        .await
        .map_err(|err| match err {
            ComputeError::NotFound { .. } => ActionError::NotFound {
                resource: ResourceKind::Address,
                name: wanted.to_owned(),
            },
            other => other.into(),
        })?;
    if address.is_in_use() {
        return Err(ActionError::Conflict {
            resource: ResourceKind::Address,
            name: wanted.to_owned(),
            detail: String::from("the address is already in use"),
        });
    }
    Ok(address.address)
}

async fn resolve_additional(
    compute: &dyn ComputeApi,
    config: &ZoneConfig,
    index: usize,
    disk: &AdditionalDisk,
) -> Result<ResolvedDisk, ActionError> {
    let disk_type = disk.disk_type.as_deref().unwrap_or(DEFAULT_DISK_TYPE);
    let disk_type = compute.get_disk_type(disk_type, &config.zone).await?.self_link;
    let project = disk
        .image_project_id
        .as_deref()
        .unwrap_or_else(|| config.image_project());
    let source_image = resolve_image(
        compute,
        disk.image.as_deref(),
        disk.image_family.as_deref(),
        project,
    )
    .await?;

    Ok(ResolvedDisk {
        name: disk
            .disk_name
            .clone()
            .unwrap_or_else(|| format!("{}-additional-disk-{index}", config.name)),
        size_gb: disk.disk_size.unwrap_or(DEFAULT_DISK_SIZE_GB),
        disk_type,
        source_image,
        auto_delete: disk.autodelete_disk.unwrap_or(true),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::{Address, STATUS_IN_USE};
    use crate::test_support::{FakeCompute, Harness};

    fn config_with(adjust: impl FnOnce(&mut crate::config::MachineSettings)) -> ZoneConfig {
        Harness::builder().configure(adjust).build().zone_config()
    }

    #[tokio::test]
    async fn resolves_image_family_and_default_disk_names() {
        let compute = FakeCompute::with_defaults();
        compute.insert_image_family("debian-12", "proj", "debian-12-v2");
        let config = config_with(|settings| {
            settings.image = None;
            settings.image_family = Some(String::from("debian-12"));
            settings.additional_disks = vec![AdditionalDisk::default(), AdditionalDisk::default()];
        });

        let resolved = resolve_references(&compute, &config)
            .await
            .unwrap_or_else(|err| panic!("resolve: {err}"));

        assert!(resolved.image.ends_with("/images/debian-12-v2"), "{}", resolved.image);
        let names: Vec<_> = resolved.additional.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, ["vm-additional-disk-0", "vm-additional-disk-1"]);
    }

    #[tokio::test]
    async fn both_image_and_family_is_a_validation_error() {
        let compute = FakeCompute::new();
        let config = config_with(|settings| {
            settings.image_family = Some(String::from("debian-12"));
        });

        assert_eq!(
            resolve_references(&compute, &config).await,
            Err(ActionError::validation(
                ValidationIssue::ImageAndImageFamilySet
            ))
        );
        assert!(compute.calls().is_empty());
    }

    #[tokio::test]
    async fn missing_image_is_not_found() {
        let compute = FakeCompute::new();
        let config = config_with(|settings| settings.image = Some(String::from("ghost")));

        assert_eq!(
            resolve_references(&compute, &config).await,
            Err(ActionError::NotFound {
                resource: ResourceKind::Image,
                name: String::from("ghost"),
            })
        );
    }

    #[tokio::test]
    async fn missing_external_address_is_not_found() {
        let compute = FakeCompute::with_defaults();
        let config = config_with(|settings| {
            settings.external_ip = Some(String::from("203.0.113.7"));
        });

        assert_eq!(
            resolve_references(&compute, &config).await,
            Err(ActionError::NotFound {
                resource: ResourceKind::Address,
                name: String::from("203.0.113.7"),
            })
        );
    }

    #[tokio::test]
    async fn address_in_use_is_a_conflict() {
        let compute = FakeCompute::with_defaults();
        compute.insert_address(Address {
            name: String::from("static-ip"),
            address: String::from("203.0.113.7"),
            status: String::from(STATUS_IN_USE),
        });
        let config = config_with(|settings| {
            settings.external_ip = Some(String::from("static-ip"));
        });

        assert!(matches!(
            resolve_references(&compute, &config).await,
            Err(ActionError::Conflict {
                resource: ResourceKind::Address,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn unknown_disk_type_is_not_found() {
        let compute = FakeCompute::with_defaults();
        let config = config_with(|settings| settings.disk_type = Some(String::from("pd-gold")));

        assert_eq!(
            resolve_references(&compute, &config).await,
            Err(ActionError::NotFound {
                resource: ResourceKind::DiskType,
                name: String::from("pd-gold"),
            })
        );
    }
}

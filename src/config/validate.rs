//! Semantic checks on a compiled zone configuration.

use std::fmt;

use super::ZoneConfig;

const TERMINATE: &str = "TERMINATE";

/// A single configuration problem.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ValidationIssue {
    /// No project owns the instance.
    ProjectIdRequired,
    /// The zone is empty.
    ZoneRequired,
    /// The instance name is empty.
    NameRequired,
    /// Neither an image nor an image family is configured.
    ImageRequired,
    /// Both an image and an image family are configured.
    ImageAndImageFamilySet,
    /// Preemptible instances cannot restart automatically.
    AutoRestartInvalidOnPreemptible,
    /// Preemptible instances must terminate on host maintenance.
    OnHostMaintenanceInvalidOnPreemptible,
    /// Instances with accelerators must terminate on host maintenance.
    OnHostMaintenanceInvalidWithAccelerators,
    /// A disk size of zero was configured.
    DiskSizeInvalid,
}

impl ValidationIssue {
    /// Stable key identifying the issue.
    #[must_use]
    pub const fn key(self) -> &'static str {
        match self {
            Self::ProjectIdRequired => "project_id_required",
            Self::ZoneRequired => "zone_required",
            Self::NameRequired => "name_required",
            Self::ImageRequired => "image_required",
            Self::ImageAndImageFamilySet => "image_and_image_family_set",
            Self::AutoRestartInvalidOnPreemptible => "auto_restart_invalid_on_preemptible",
            Self::OnHostMaintenanceInvalidOnPreemptible => {
                "on_host_maintenance_invalid_on_preemptible"
            }
            Self::OnHostMaintenanceInvalidWithAccelerators => {
                "on_host_maintenance_invalid_with_accelerators"
            }
            Self::DiskSizeInvalid => "disk_size_invalid",
        }
    }

    const fn message(self) -> &'static str {
        match self {
            Self::ProjectIdRequired => {
                "a project ID is required; set GOOGLE_PROJECT_ID or google.project_id"
            }
            Self::ZoneRequired => "a zone is required",
            Self::NameRequired => "an instance name is required",
            Self::ImageRequired => "an image or image_family is required",
            Self::ImageAndImageFamilySet => "image and image_family cannot both be set",
            Self::AutoRestartInvalidOnPreemptible => {
                "auto_restart must be false for preemptible instances"
            }
            Self::OnHostMaintenanceInvalidOnPreemptible => {
                "on_host_maintenance must be TERMINATE for preemptible instances"
            }
            Self::OnHostMaintenanceInvalidWithAccelerators => {
                "on_host_maintenance must be TERMINATE when accelerators are attached"
            }
            Self::DiskSizeInvalid => "disk sizes must be at least 1 GB",
        }
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message(), self.key())
    }
}

/// Every issue found in one configuration.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ValidationErrors {
    issues: Vec<ValidationIssue>,
}

impl ValidationErrors {
    /// Wraps a single issue.
    #[must_use]
    pub fn single(issue: ValidationIssue) -> Self {
        Self {
            issues: vec![issue],
        }
    }

    /// Issues in the order they were found.
    #[must_use]
    pub fn issues(&self) -> &[ValidationIssue] {
        &self.issues
    }

    /// Reports whether `issue` was found.
    #[must_use]
    pub fn contains(&self, issue: ValidationIssue) -> bool {
        self.issues.contains(&issue)
    }

    /// Keys of every issue, for machine-readable reporting.
    #[must_use]
    pub fn keys(&self) -> Vec<&'static str> {
        self.issues.iter().map(|issue| issue.key()).collect()
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("invalid provider configuration")?;
        for (index, issue) in self.issues.iter().enumerate() {
            let separator = if index == 0 { ": " } else { "; " };
            write!(f, "{separator}{issue}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationErrors {}

impl ZoneConfig {
    /// Collects every semantic problem in the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationErrors`] listing each issue found.
    pub fn validate(&self) -> Result<(), ValidationErrors> {
        let mut issues = Vec::new();
        let mut check = |failed: bool, issue: ValidationIssue| {
            if failed {
                issues.push(issue);
            }
        };

        check(
            self.project_id.trim().is_empty(),
            ValidationIssue::ProjectIdRequired,
        );
        check(self.zone.trim().is_empty(), ValidationIssue::ZoneRequired);
        check(self.name.trim().is_empty(), ValidationIssue::NameRequired);
        check(
            self.image.is_none() && self.image_family.is_none(),
            ValidationIssue::ImageRequired,
        );
        check(
            self.image.is_some() && self.image_family.is_some(),
            ValidationIssue::ImageAndImageFamilySet,
        );
        check(
            self.preemptible && self.auto_restart,
            ValidationIssue::AutoRestartInvalidOnPreemptible,
        );
        check(
            self.preemptible && self.on_host_maintenance != TERMINATE,
            ValidationIssue::OnHostMaintenanceInvalidOnPreemptible,
        );
        check(
            !self.accelerators.is_empty() && self.on_host_maintenance != TERMINATE,
            ValidationIssue::OnHostMaintenanceInvalidWithAccelerators,
        );
        check(
            self.disk_size == 0
                || self
                    .additional_disks
                    .iter()
                    .any(|disk| disk.disk_size == Some(0)),
            ValidationIssue::DiskSizeInvalid,
        );

        if issues.is_empty() {
            Ok(())
        } else {
            Err(ValidationErrors { issues })
        }
    }
}

//! Error type shared by every action and workflow.

use thiserror::Error;

use crate::compute::{ComputeError, ResourceKind};
use crate::config::{ValidationErrors, ValidationIssue};
use crate::identity::IdentityError;

/// Errors surfaced by pipeline runs.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ActionError {
    /// The provider configuration is invalid.
    #[error(transparent)]
    Validation(#[from] ValidationErrors),
    /// A referenced remote resource does not exist.
    #[error("{resource} '{name}' not found")]
    NotFound {
        /// Kind of resource that was looked up.
        resource: ResourceKind,
        /// Name used for the lookup.
        name: String,
    },
    /// A referenced remote resource cannot be used as requested.
    #[error("{resource} '{name}' cannot be used: {detail}")]
    Conflict {
        /// Kind of resource involved.
        resource: ResourceKind,
        /// Name of the resource.
        name: String,
        /// Why the resource cannot be used.
        detail: String,
    },
    /// The remote platform failed a call.
    #[error("remote API error: {message}")]
    RemoteApi {
        /// Message returned by the platform.
        message: String,
    },
    /// A bounded wait ran out of attempts.
    #[error("timed out after {timeout_secs}s waiting for the instance to {action}")]
    ReadyTimeout {
        /// What the wait was for (for example `become ready`).
        action: &'static str,
        /// Configured timeout in seconds.
        timeout_secs: i64,
    },
    /// The run was interrupted by the user.
    #[error("interrupted")]
    Interrupted,
    /// The remote platform reported a status this crate does not know.
    #[error("unknown instance status '{status}'")]
    UnknownStatus {
        /// Status string as reported.
        status: String,
    },
    /// The machine identity could not be persisted.
    #[error(transparent)]
    Identity(#[from] IdentityError),
    /// A guest hook failed.
    #[error("guest error: {message}")]
    Guest {
        /// Message describing the failure.
        message: String,
    },
    /// No compute handle could be built.
    #[error("failed to connect to the compute API: {message}")]
    Connect {
        /// Message describing the failure.
        message: String,
    },
}

impl ActionError {
    /// Builds a validation error carrying one issue.
    #[must_use]
    pub fn validation(issue: ValidationIssue) -> Self {
        Self::Validation(ValidationErrors::single(issue))
    }
}

impl From<ComputeError> for ActionError {
    fn from(value: ComputeError) -> Self {
        match value {
            ComputeError::NotFound { resource, name } => Self::NotFound { resource, name },
            ComputeError::Conflict {
                resource,
                name,
                message,
            } => Self::Conflict {
                resource,
                name,
                detail: message,
            },
            ComputeError::Api { message } => Self::RemoteApi { message },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compute_errors_map_onto_action_errors() {
        let not_found = ActionError::from(ComputeError::NotFound {
            resource: ResourceKind::Image,
            name: String::from("debian"),
        });
        assert_eq!(not_found.to_string(), "image 'debian' not found");

        let api = ActionError::from(ComputeError::Api {
            message: String::from("quota"),
        });
        assert_eq!(
            api,
            ActionError::RemoteApi {
                message: String::from("quota")
            }
        );
    }

    #[test]
    fn validation_errors_render_their_keys() {
        let err = ActionError::validation(ValidationIssue::ImageAndImageFamilySet);
        assert!(err.to_string().contains("image_and_image_family_set"));
    }
}

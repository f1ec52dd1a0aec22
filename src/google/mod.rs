//! Compute Engine adapter speaking the v1 REST API over `reqwest`.
//!
//! Mutating calls only submit the request; waiting is left to the
//! workflows. Stopped instances, which the platform reports as
//! `TERMINATED`, are surfaced as `STOPPED`.

mod wire;

use std::net::IpAddr;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use reqwest::{RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;

use crate::compute::{
    Address, ComputeApi, ComputeError, ComputeFuture, Connector, Disk, DiskSpec, DiskType, Image,
    Instance, InstanceGroup, InstanceGroupSpec, InstanceSpec, Operation, ResourceKind,
    STATUS_PROVISIONING,
};
use crate::config::{ConnectionConfig, ZoneConfig};

use self::wire::{
    AddInstancesRequest, AddressBody, AddressList, DiskBody, DiskInsert, InstanceBody,
    InstanceGroupInsert, InstanceInsert, LinkedBody, OperationBody, error_message,
};

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

static HTTP_CLIENT: LazyLock<reqwest::Client> = LazyLock::new(|| {
    reqwest::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
});

fn transport(err: &reqwest::Error) -> ComputeError {
    ComputeError::Api {
        message: err.to_string(),
    }
}

fn status_error(
    status: StatusCode,
    body: &[u8],
    resource: ResourceKind,
    name: &str,
) -> ComputeError {
    let message = error_message(body);
    match status {
        StatusCode::NOT_FOUND => ComputeError::NotFound {
            resource,
            name: name.to_owned(),
        },
        StatusCode::CONFLICT => ComputeError::Conflict {
            resource,
            name: name.to_owned(),
            message,
        },
        _ => ComputeError::Api {
            message: format!("HTTP {status}: {message}"),
        },
    }
}

/// [`ComputeApi`] backed by the Compute Engine REST API.
#[derive(Clone, Debug)]
pub struct GoogleCompute {
    api_base: String,
    access_token: String,
    project: String,
}

impl GoogleCompute {
    /// Creates an adapter acting on `project` with the given credentials.
    #[must_use]
    pub fn new(connection: &ConnectionConfig, project: impl Into<String>) -> Self {
        Self {
            api_base: connection.api_base.trim_end_matches('/').to_owned(),
            access_token: connection.access_token.clone(),
            project: project.into(),
        }
    }

    fn zonal(&self, zone: &str, path: &str) -> String {
        format!(
            "{}/projects/{}/zones/{zone}/{path}",
            self.api_base, self.project
        )
    }

    fn global(&self, project: &str, path: &str) -> String {
        format!("{}/projects/{project}/global/{path}", self.api_base)
    }

    fn regional(&self, region: &str, path: &str) -> String {
        format!(
            "{}/projects/{}/regions/{region}/{path}",
            self.api_base, self.project
        )
    }

    async fn send<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        resource: ResourceKind,
        name: &str,
    ) -> Result<T, ComputeError> {
        let response = request
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(|err| transport(&err))?;
        let status = response.status();
        let body = response.bytes().await.map_err(|err| transport(&err))?;
        tracing::debug!(%status, resource = %resource, name, "compute API response");

        if !status.is_success() {
            return Err(status_error(status, &body, resource, name));
        }
        serde_json::from_slice(&body).map_err(|err| ComputeError::Api {
            message: format!("unexpected response for {resource} '{name}': {err}"),
        })
    }

    async fn get<T: DeserializeOwned>(
        &self,
        url: &str,
        resource: ResourceKind,
        name: &str,
    ) -> Result<T, ComputeError> {
        self.send(HTTP_CLIENT.get(url), resource, name).await
    }

    async fn operation(
        &self,
        request: RequestBuilder,
        resource: ResourceKind,
        name: &str,
    ) -> Result<Operation, ComputeError> {
        let body: OperationBody = self.send(request, resource, name).await?;
        Ok(body.into())
    }

    /// Submits an insert and fails when the platform rejects it outright.
    async fn submit(
        &self,
        request: RequestBuilder,
        resource: ResourceKind,
        name: &str,
    ) -> Result<(), ComputeError> {
        let operation = self.operation(request, resource, name).await?;
        let done = operation.is_done();
        match operation.error {
            Some(message) if done => Err(ComputeError::Api { message }),
            _ => Ok(()),
        }
    }

    async fn find_address(&self, wanted: &str, region: &str) -> Result<Address, ComputeError> {
        if wanted.parse::<IpAddr>().is_err() {
            let body: AddressBody = self
                .get(
                    &self.regional(region, &format!("addresses/{wanted}")),
                    ResourceKind::Address,
                    wanted,
                )
                .await?;
            return Ok(body.into());
        }

        let request = HTTP_CLIENT
            .get(self.regional(region, "addresses"))
            .query(&[("filter", format!("address=\"{wanted}\""))]);
        let list: AddressList = self.send(request, ResourceKind::Address, wanted).await?;
        list.items
            .into_iter()
            .next()
            .map(Address::from)
            .ok_or_else(|| ComputeError::NotFound {
                resource: ResourceKind::Address,
                name: wanted.to_owned(),
            })
    }
}

impl ComputeApi for GoogleCompute {
    fn get_instance<'a>(&'a self, name: &'a str, zone: &'a str) -> ComputeFuture<'a, Instance> {
        Box::pin(async move {
            let url = self.zonal(zone, &format!("instances/{name}"));
            let body: InstanceBody = self.get(&url, ResourceKind::Instance, name).await?;
            Ok(body.into())
        })
    }

    fn create_instance<'a>(&'a self, spec: &'a InstanceSpec) -> ComputeFuture<'a, Instance> {
        Box::pin(async move {
            let request = HTTP_CLIENT
                .post(self.zonal(&spec.zone, "instances"))
                .json(&InstanceInsert::from(spec));
            self.submit(request, ResourceKind::Instance, &spec.name)
                .await?;
            tracing::info!(instance = %spec.name, zone = %spec.zone, "instance insert accepted");
            // The instance exists once the insert is accepted; readiness
            // waits do the reading.
            Ok(Instance {
                name: spec.name.clone(),
                zone: spec.zone.clone(),
                status: STATUS_PROVISIONING.to_owned(),
                network_ip: None,
                nat_ip: None,
            })
        })
    }

    fn delete_instance<'a>(
        &'a self,
        name: &'a str,
        zone: &'a str,
    ) -> ComputeFuture<'a, Operation> {
        Box::pin(async move {
            let request = HTTP_CLIENT.delete(self.zonal(zone, &format!("instances/{name}")));
            self.operation(request, ResourceKind::Instance, name).await
        })
    }

    fn start_instance<'a>(&'a self, name: &'a str, zone: &'a str) -> ComputeFuture<'a, Operation> {
        Box::pin(async move {
            let request = HTTP_CLIENT.post(self.zonal(zone, &format!("instances/{name}/start")));
            self.operation(request, ResourceKind::Instance, name).await
        })
    }

    fn stop_instance<'a>(&'a self, name: &'a str, zone: &'a str) -> ComputeFuture<'a, Operation> {
        Box::pin(async move {
            let request = HTTP_CLIENT.post(self.zonal(zone, &format!("instances/{name}/stop")));
            self.operation(request, ResourceKind::Instance, name).await
        })
    }

    fn get_operation<'a>(&'a self, name: &'a str, zone: &'a str) -> ComputeFuture<'a, Operation> {
        Box::pin(async move {
            let request = HTTP_CLIENT.get(self.zonal(zone, &format!("operations/{name}")));
            self.operation(request, ResourceKind::Operation, name).await
        })
    }

    fn get_disk<'a>(&'a self, name: &'a str, zone: &'a str) -> ComputeFuture<'a, Disk> {
        Box::pin(async move {
            let url = self.zonal(zone, &format!("disks/{name}"));
            let body: DiskBody = self.get(&url, ResourceKind::Disk, name).await?;
            Ok(body.into())
        })
    }

    fn create_disk<'a>(&'a self, spec: &'a DiskSpec) -> ComputeFuture<'a, Disk> {
        Box::pin(async move {
            let request = HTTP_CLIENT
                .post(self.zonal(&spec.zone, "disks"))
                .json(&DiskInsert::from(spec));
            self.submit(request, ResourceKind::Disk, &spec.name).await?;
            self.get_disk(&spec.name, &spec.zone).await
        })
    }

    fn delete_disk<'a>(&'a self, name: &'a str, zone: &'a str) -> ComputeFuture<'a, Operation> {
        Box::pin(async move {
            let request = HTTP_CLIENT.delete(self.zonal(zone, &format!("disks/{name}")));
            self.operation(request, ResourceKind::Disk, name).await
        })
    }

    fn get_image<'a>(&'a self, name: &'a str, project: &'a str) -> ComputeFuture<'a, Image> {
        Box::pin(async move {
            let url = self.global(project, &format!("images/{name}"));
            let body: LinkedBody = self.get(&url, ResourceKind::Image, name).await?;
            Ok(body.into())
        })
    }

    fn get_image_from_family<'a>(
        &'a self,
        family: &'a str,
        project: &'a str,
    ) -> ComputeFuture<'a, Image> {
        Box::pin(async move {
            let url = self.global(project, &format!("images/family/{family}"));
            let body: LinkedBody = self.get(&url, ResourceKind::Image, family).await?;
            Ok(body.into())
        })
    }

    fn get_address<'a>(
        &'a self,
        address_or_name: &'a str,
        region: &'a str,
    ) -> ComputeFuture<'a, Address> {
        Box::pin(self.find_address(address_or_name, region))
    }

    fn get_disk_type<'a>(&'a self, name: &'a str, zone: &'a str) -> ComputeFuture<'a, DiskType> {
        Box::pin(async move {
            let url = self.zonal(zone, &format!("diskTypes/{name}"));
            let body: LinkedBody = self.get(&url, ResourceKind::DiskType, name).await?;
            Ok(body.into())
        })
    }

    fn get_instance_group<'a>(
        &'a self,
        name: &'a str,
        zone: &'a str,
    ) -> ComputeFuture<'a, InstanceGroup> {
        Box::pin(async move {
            let url = self.zonal(zone, &format!("instanceGroups/{name}"));
            let body: LinkedBody = self.get(&url, ResourceKind::InstanceGroup, name).await?;
            Ok(InstanceGroup {
                name: body.into_name(),
                zone: zone.to_owned(),
            })
        })
    }

    fn create_instance_group<'a>(
        &'a self,
        spec: &'a InstanceGroupSpec,
    ) -> ComputeFuture<'a, InstanceGroup> {
        Box::pin(async move {
            let request = HTTP_CLIENT
                .post(self.zonal(&spec.zone, "instanceGroups"))
                .json(&InstanceGroupInsert::from(spec));
            self.submit(request, ResourceKind::InstanceGroup, &spec.name)
                .await?;
            Ok(InstanceGroup {
                name: spec.name.clone(),
                zone: spec.zone.clone(),
            })
        })
    }

    fn add_instances_to_group<'a>(
        &'a self,
        group: &'a str,
        zone: &'a str,
        instances: &'a [String],
    ) -> ComputeFuture<'a, Operation> {
        Box::pin(async move {
            let request = HTTP_CLIENT
                .post(self.zonal(zone, &format!("instanceGroups/{group}/addInstances")))
                .json(&AddInstancesRequest::new(zone, instances));
            self.operation(request, ResourceKind::InstanceGroup, group)
                .await
        })
    }
}

/// Builds [`GoogleCompute`] handles from the loaded credentials.
#[derive(Clone, Debug)]
pub struct GoogleConnector {
    connection: ConnectionConfig,
}

impl GoogleConnector {
    /// Wraps credentials; they are validated on first connect.
    #[must_use]
    pub const fn new(connection: ConnectionConfig) -> Self {
        Self { connection }
    }
}

impl Connector for GoogleConnector {
    fn connect(&self, config: &ZoneConfig) -> Result<Arc<dyn ComputeApi>, ComputeError> {
        self.connection
            .validate()
            .map_err(|err| ComputeError::Api {
                message: err.to_string(),
            })?;
        tracing::debug!(project = %config.project_id, zone = %config.zone, "connecting to compute API");
        Ok(Arc::new(GoogleCompute::new(
            &self.connection,
            config.project_id.clone(),
        )))
    }
}

#[cfg(test)]
mod tests;

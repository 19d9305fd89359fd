use std::collections::BTreeMap;

use async_trait::async_trait;
use reqwest::Method;
use serde::Deserialize;
use serde_json::json;
use vmwarden_application::{ComputeOperationRequest, ComputeProvider, OperationHandle};
use vmwarden_core::{AppResult, ResourceGroupName};
use vmwarden_domain::VirtualMachineRef;

use crate::ArmClient;

const COMPUTE_API_VERSION: &str = "2024-07-01";
const DISK_API_VERSION: &str = "2024-03-02";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VirtualMachineResource {
    id: String,
    name: String,
    location: String,
    #[serde(default)]
    tags: Option<BTreeMap<String, String>>,
    #[serde(default)]
    properties: Option<VirtualMachineProperties>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VirtualMachineProperties {
    #[serde(default)]
    hardware_profile: Option<HardwareProfile>,
    #[serde(default)]
    storage_profile: Option<StorageProfile>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HardwareProfile {
    #[serde(default)]
    vm_size: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StorageProfile {
    #[serde(default)]
    os_disk: Option<OsDisk>,
}

#[derive(Debug, Deserialize)]
struct OsDisk {
    #[serde(default)]
    name: Option<String>,
    #[serde(default, rename = "diskSizeGB")]
    disk_size_gb: Option<u32>,
}

impl VirtualMachineResource {
    fn into_domain(self, resource_group: &ResourceGroupName) -> VirtualMachineRef {
        let properties = self.properties.unwrap_or_default();
        let os_disk = properties
            .storage_profile
            .and_then(|profile| profile.os_disk);

        VirtualMachineRef {
            id: self.id,
            name: self.name,
            location: self.location,
            resource_group: resource_group.clone(),
            vm_size: properties
                .hardware_profile
                .and_then(|profile| profile.vm_size),
            os_disk_name: os_disk.as_ref().and_then(|disk| disk.name.clone()),
            os_disk_size_gb: os_disk.and_then(|disk| disk.disk_size_gb),
            tags: self.tags.unwrap_or_default(),
        }
    }
}

/// Compute provider backed by `Microsoft.Compute`.
#[derive(Clone)]
pub struct ArmComputeProvider {
    client: ArmClient,
}

impl ArmComputeProvider {
    /// Creates a compute provider over an ARM client.
    #[must_use]
    pub fn new(client: ArmClient) -> Self {
        Self { client }
    }

    fn virtual_machine_url(
        &self,
        resource_group: &ResourceGroupName,
        trailing: &[&str],
    ) -> AppResult<url::Url> {
        let mut segments = vec![
            "resourceGroups",
            resource_group.as_str(),
            "providers",
            "Microsoft.Compute",
            "virtualMachines",
        ];
        segments.extend_from_slice(trailing);
        self.client.subscription_url(&segments, COMPUTE_API_VERSION)
    }
}

#[async_trait]
impl ComputeProvider for ArmComputeProvider {
    async fn list_virtual_machines(
        &self,
        resource_group: &ResourceGroupName,
    ) -> AppResult<Vec<VirtualMachineRef>> {
        let url = self.virtual_machine_url(resource_group, &[])?;
        let resources: Vec<VirtualMachineResource> = self.client.list_all(url).await?;

        Ok(resources
            .into_iter()
            .map(|resource| resource.into_domain(resource_group))
            .collect())
    }

    async fn get_virtual_machine(
        &self,
        resource_group: &ResourceGroupName,
        vm_name: &str,
    ) -> AppResult<Option<VirtualMachineRef>> {
        let url = self.virtual_machine_url(resource_group, &[vm_name])?;
        let resource: Option<VirtualMachineResource> = self.client.get_optional(url).await?;

        Ok(resource.map(|resource| resource.into_domain(resource_group)))
    }

    async fn begin_operation(
        &self,
        resource_group: &ResourceGroupName,
        request: &ComputeOperationRequest,
    ) -> AppResult<OperationHandle> {
        match request {
            ComputeOperationRequest::Start { vm_name } => {
                let url =
                    self.virtual_machine_url(resource_group, &[vm_name.as_str(), "start"])?;
                self.client.begin(Method::POST, url, None).await
            }
            ComputeOperationRequest::Deallocate { vm_name } => {
                let url =
                    self.virtual_machine_url(resource_group, &[vm_name.as_str(), "deallocate"])?;
                self.client.begin(Method::POST, url, None).await
            }
            ComputeOperationRequest::UpdateDiskSku { disk_name, sku } => {
                let url = self.client.subscription_url(
                    &[
                        "resourceGroups",
                        resource_group.as_str(),
                        "providers",
                        "Microsoft.Compute",
                        "disks",
                        disk_name.as_str(),
                    ],
                    DISK_API_VERSION,
                )?;
                let body = json!({ "sku": { "name": sku.as_str() } });
                self.client.begin(Method::PATCH, url, Some(&body)).await
            }
        }
    }

    async fn wait_for_completion(&self, handle: &OperationHandle) -> AppResult<()> {
        self.client.wait(handle).await
    }
}

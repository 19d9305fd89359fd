use std::sync::Arc;

use vmwarden_core::{AppError, AppResult, ResourceGroupName};
use vmwarden_domain::VirtualMachineRef;

use crate::provider_ports::ComputeProvider;

/// Read-only lookup of VMs in a resource group.
#[derive(Clone)]
pub struct ResourceDirectory {
    compute: Arc<dyn ComputeProvider>,
}

impl ResourceDirectory {
    /// Creates a directory over a compute provider.
    #[must_use]
    pub fn new(compute: Arc<dyn ComputeProvider>) -> Self {
        Self { compute }
    }

    /// Lists VMs in a resource group.
    pub async fn list(&self, resource_group: &ResourceGroupName) -> AppResult<Vec<VirtualMachineRef>> {
        self.compute.list_virtual_machines(resource_group).await
    }

    /// Lists the VM names in a resource group, in provider order.
    pub async fn list_names(&self, resource_group: &ResourceGroupName) -> AppResult<Vec<String>> {
        Ok(self
            .list(resource_group)
            .await?
            .into_iter()
            .map(|vm| vm.name)
            .collect())
    }

    /// Fetches one VM by name.
    pub async fn get(
        &self,
        resource_group: &ResourceGroupName,
        vm_name: &str,
    ) -> AppResult<VirtualMachineRef> {
        self.compute
            .get_virtual_machine(resource_group, vm_name)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!(
                    "virtual machine '{vm_name}' does not exist in resource group '{resource_group}'"
                ))
            })
    }
}

use async_trait::async_trait;
use vmwarden_core::{AppResult, ResourceGroupName};
use vmwarden_domain::{DiskSku, OperationStatus, VirtualMachineRef};

/// Long-running compute mutation submitted to the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComputeOperationRequest {
    /// Power on a VM.
    Start {
        /// Target VM name.
        vm_name: String,
    },
    /// Stop a VM and release its compute allocation.
    Deallocate {
        /// Target VM name.
        vm_name: String,
    },
    /// Change the storage tier of a managed disk.
    UpdateDiskSku {
        /// Managed disk name.
        disk_name: String,
        /// Target tier.
        sku: DiskSku,
    },
}

impl ComputeOperationRequest {
    /// Returns the name of the resource the request mutates.
    #[must_use]
    pub fn target_name(&self) -> &str {
        match self {
            Self::Start { vm_name } | Self::Deallocate { vm_name } => vm_name.as_str(),
            Self::UpdateDiskSku { disk_name, .. } => disk_name.as_str(),
        }
    }
}

/// Provider acknowledgement of a submitted long-running operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationHandle {
    /// Status observed when the provider accepted the request.
    pub status: OperationStatus,
    /// Provider-specific URL to poll until the operation settles.
    pub poll_url: Option<String>,
}

impl OperationHandle {
    /// Creates a handle for an operation that settled synchronously.
    #[must_use]
    pub fn completed() -> Self {
        Self {
            status: OperationStatus::Succeeded,
            poll_url: None,
        }
    }
}

/// Port over the cloud compute API.
#[async_trait]
pub trait ComputeProvider: Send + Sync {
    /// Lists VMs in a resource group.
    async fn list_virtual_machines(
        &self,
        resource_group: &ResourceGroupName,
    ) -> AppResult<Vec<VirtualMachineRef>>;

    /// Fetches one VM by name, returning `None` when it does not exist.
    async fn get_virtual_machine(
        &self,
        resource_group: &ResourceGroupName,
        vm_name: &str,
    ) -> AppResult<Option<VirtualMachineRef>>;

    /// Submits a long-running operation and returns without waiting for it.
    async fn begin_operation(
        &self,
        resource_group: &ResourceGroupName,
        request: &ComputeOperationRequest,
    ) -> AppResult<OperationHandle>;

    /// Blocks until the operation reaches a terminal state.
    ///
    /// Returns an error when the operation ends failed or canceled.
    async fn wait_for_completion(&self, handle: &OperationHandle) -> AppResult<()>;
}

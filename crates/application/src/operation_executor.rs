use std::sync::Arc;

use async_trait::async_trait;
use tracing::{error, info};
use vmwarden_core::{AppResult, ResourceGroupName};
use vmwarden_domain::{OperationKind, OperationOutcome};

use crate::ResourceDirectory;
use crate::provider_ports::{ComputeOperationRequest, ComputeProvider};

/// Error text reported when a VM has no resolvable OS disk.
pub const DISK_NOT_FOUND: &str = "Disk not found";

/// Runs one long-running operation against one VM and reports its outcome.
///
/// Implementations never fail: faults are captured in the returned outcome.
#[async_trait]
pub trait VirtualMachineOperation: Send + Sync {
    /// Runs `operation` against `vm_name`, optionally waiting for completion.
    async fn run(
        &self,
        resource_group: &ResourceGroupName,
        vm_name: &str,
        operation: OperationKind,
        wait: bool,
    ) -> OperationOutcome;
}

/// Provider-backed executor for single-VM operations.
#[derive(Clone)]
pub struct OperationExecutor {
    directory: ResourceDirectory,
    compute: Arc<dyn ComputeProvider>,
}

impl OperationExecutor {
    /// Creates an executor over a compute provider.
    #[must_use]
    pub fn new(compute: Arc<dyn ComputeProvider>) -> Self {
        Self {
            directory: ResourceDirectory::new(compute.clone()),
            compute,
        }
    }

    async fn execute(
        &self,
        resource_group: &ResourceGroupName,
        vm_name: &str,
        operation: OperationKind,
        wait: bool,
    ) -> AppResult<OperationOutcome> {
        let request = match operation {
            OperationKind::Start => ComputeOperationRequest::Start {
                vm_name: vm_name.to_owned(),
            },
            OperationKind::Deallocate => ComputeOperationRequest::Deallocate {
                vm_name: vm_name.to_owned(),
            },
            OperationKind::SetOsDiskSku { sku } => {
                let vm = self.directory.get(resource_group, vm_name).await?;
                let Some(disk_name) = vm.os_disk_name() else {
                    return Ok(OperationOutcome::failed(
                        vm_name,
                        resource_group.as_str(),
                        operation,
                        false,
                        DISK_NOT_FOUND,
                    ));
                };

                ComputeOperationRequest::UpdateDiskSku {
                    disk_name: disk_name.to_owned(),
                    sku,
                }
            }
        };

        let handle = self
            .compute
            .begin_operation(resource_group, &request)
            .await?;

        if !wait {
            return Ok(OperationOutcome::observed(
                vm_name,
                resource_group.as_str(),
                operation,
                handle.status,
            ));
        }

        match self.compute.wait_for_completion(&handle).await {
            Ok(()) => Ok(OperationOutcome::succeeded(
                vm_name,
                resource_group.as_str(),
                operation,
            )),
            Err(wait_error) => Ok(OperationOutcome::failed(
                vm_name,
                resource_group.as_str(),
                operation,
                true,
                wait_error.to_string(),
            )),
        }
    }
}

#[async_trait]
impl VirtualMachineOperation for OperationExecutor {
    async fn run(
        &self,
        resource_group: &ResourceGroupName,
        vm_name: &str,
        operation: OperationKind,
        wait: bool,
    ) -> OperationOutcome {
        let outcome = self
            .execute(resource_group, vm_name, operation, wait)
            .await
            .unwrap_or_else(|run_error| {
                OperationOutcome::failed(
                    vm_name,
                    resource_group.as_str(),
                    operation,
                    false,
                    run_error.to_string(),
                )
            });

        if let Some(fault) = outcome.error() {
            error!(
                resource_group = %resource_group,
                vm_name,
                operation = operation.as_str(),
                error = fault,
                "virtual machine operation failed"
            );
        } else {
            info!(
                resource_group = %resource_group,
                vm_name,
                operation = operation.as_str(),
                status = ?outcome.status(),
                waited = outcome.waited_until_completion(),
                "virtual machine operation finished"
            );
        }

        outcome
    }
}

#[cfg(test)]
mod tests;

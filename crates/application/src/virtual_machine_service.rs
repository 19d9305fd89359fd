use tracing::info;
use vmwarden_core::{AppResult, ResourceGroupName};
use vmwarden_domain::{NameSelector, OperationKind, OperationOutcome, VirtualMachineRef};

use crate::{FanOutCoordinator, ResourceDirectory};

/// Application service for VM listing and power operations.
#[derive(Clone)]
pub struct VirtualMachineService {
    directory: ResourceDirectory,
    fan_out: FanOutCoordinator,
}

impl VirtualMachineService {
    /// Creates a new VM service.
    #[must_use]
    pub fn new(directory: ResourceDirectory, fan_out: FanOutCoordinator) -> Self {
        Self { directory, fan_out }
    }

    /// Lists VMs in a resource group.
    pub async fn list(&self, resource_group: &ResourceGroupName) -> AppResult<Vec<VirtualMachineRef>> {
        self.directory.list(resource_group).await
    }

    /// Starts every selected VM.
    pub async fn start(
        &self,
        resource_group: &ResourceGroupName,
        selector: &NameSelector,
        wait: bool,
    ) -> AppResult<Vec<OperationOutcome>> {
        self.run(resource_group, selector, OperationKind::Start, wait)
            .await
    }

    /// Deallocates every selected VM.
    pub async fn deallocate(
        &self,
        resource_group: &ResourceGroupName,
        selector: &NameSelector,
        wait: bool,
    ) -> AppResult<Vec<OperationOutcome>> {
        self.run(resource_group, selector, OperationKind::Deallocate, wait)
            .await
    }

    async fn run(
        &self,
        resource_group: &ResourceGroupName,
        selector: &NameSelector,
        operation: OperationKind,
        wait: bool,
    ) -> AppResult<Vec<OperationOutcome>> {
        let outcomes = self
            .fan_out
            .dispatch(resource_group, selector, operation, wait)
            .await?;

        info!(
            resource_group = %resource_group,
            operation = operation.as_str(),
            total = outcomes.len(),
            failed = outcomes.iter().filter(|outcome| outcome.is_failed()).count(),
            "virtual machine fan-out completed"
        );

        Ok(outcomes)
    }
}

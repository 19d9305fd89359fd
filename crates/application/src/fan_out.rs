use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::{error, info};
use vmwarden_core::{AppResult, ResourceGroupName};
use vmwarden_domain::{NameSelector, OperationKind, OperationOutcome};

use crate::ResourceDirectory;
use crate::operation_executor::VirtualMachineOperation;

/// Default upper bound on concurrently running per-VM operations.
pub const DEFAULT_MAX_PARALLELISM: usize = 16;

/// Runs one operation over a set of VM names concurrently.
///
/// All per-name tasks are spawned before any is awaited. Outcomes come back
/// in input order, one per resolved name.
#[derive(Clone)]
pub struct FanOutCoordinator {
    directory: ResourceDirectory,
    runner: Arc<dyn VirtualMachineOperation>,
    max_parallelism: usize,
}

impl FanOutCoordinator {
    /// Creates a coordinator with [`DEFAULT_MAX_PARALLELISM`].
    #[must_use]
    pub fn new(directory: ResourceDirectory, runner: Arc<dyn VirtualMachineOperation>) -> Self {
        Self {
            directory,
            runner,
            max_parallelism: DEFAULT_MAX_PARALLELISM,
        }
    }

    /// Overrides the concurrency cap. Zero is treated as one.
    #[must_use]
    pub fn with_max_parallelism(mut self, max_parallelism: usize) -> Self {
        self.max_parallelism = max_parallelism.max(1);
        self
    }

    /// Returns the concurrency cap.
    #[must_use]
    pub fn max_parallelism(&self) -> usize {
        self.max_parallelism
    }

    /// Resolves a selector into concrete names.
    ///
    /// Only [`NameSelector::All`] touches the provider.
    pub async fn resolve_names(
        &self,
        resource_group: &ResourceGroupName,
        selector: &NameSelector,
    ) -> AppResult<Vec<String>> {
        match selector {
            NameSelector::All => self.directory.list_names(resource_group).await,
            NameSelector::Names(names) => Ok(names.clone()),
        }
    }

    /// Resolves the selector and runs `operation` against every name.
    ///
    /// Fails only when the selector cannot be resolved.
    pub async fn dispatch(
        &self,
        resource_group: &ResourceGroupName,
        selector: &NameSelector,
        operation: OperationKind,
        wait: bool,
    ) -> AppResult<Vec<OperationOutcome>> {
        let names = self.resolve_names(resource_group, selector).await?;
        Ok(self
            .dispatch_names(resource_group, names, operation, wait)
            .await)
    }

    /// Runs `operation` against already resolved names.
    pub async fn dispatch_names(
        &self,
        resource_group: &ResourceGroupName,
        names: Vec<String>,
        operation: OperationKind,
        wait: bool,
    ) -> Vec<OperationOutcome> {
        info!(
            resource_group = %resource_group,
            operation = operation.as_str(),
            names = ?names,
            max_parallelism = self.max_parallelism,
            "dispatching virtual machine operations"
        );

        let semaphore = Arc::new(Semaphore::new(self.max_parallelism));
        let mut tasks = Vec::with_capacity(names.len());
        for name in names {
            let runner = Arc::clone(&self.runner);
            let semaphore = Arc::clone(&semaphore);
            let task_resource_group = resource_group.clone();
            let task_name = name.clone();
            let handle = tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await;
                runner
                    .run(&task_resource_group, &task_name, operation, wait)
                    .await
            });
            tasks.push((name, handle));
        }

        let mut outcomes = Vec::with_capacity(tasks.len());
        for (name, handle) in tasks {
            match handle.await {
                Ok(outcome) => outcomes.push(outcome),
                Err(join_error) => {
                    error!(
                        resource_group = %resource_group,
                        vm_name = %name,
                        operation = operation.as_str(),
                        error = %join_error,
                        "virtual machine operation task aborted"
                    );
                    outcomes.push(OperationOutcome::failed(
                        name,
                        resource_group.as_str(),
                        operation,
                        false,
                        format!("operation task aborted: {join_error}"),
                    ));
                }
            }
        }

        outcomes
    }
}

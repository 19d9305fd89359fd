use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use vmwarden_application::{
    ComputeOperationRequest, ComputeProvider, JitPolicyProvider, OperationHandle,
    ResourceGroupProvider,
};
use vmwarden_core::{AppError, AppResult, ResourceGroupName};
use vmwarden_domain::{
    DiskSku, JitActivationRequest, JitPolicy, OperationStatus, ResourceGroupRef, TagFilter,
    VirtualMachineRef,
};

/// Power state tracked for in-memory VMs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerState {
    /// VM is running.
    Running,
    /// VM is stopped and deallocated.
    Deallocated,
}

/// Activation recorded by [`InMemoryCloud`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedActivation {
    /// Resource group of the policy.
    pub resource_group: String,
    /// Location the request was addressed to.
    pub location: String,
    /// Policy name.
    pub policy_name: String,
    /// Submitted request.
    pub request: JitActivationRequest,
}

#[derive(Debug, Default)]
struct CloudState {
    resource_groups: Vec<ResourceGroupRef>,
    virtual_machines: Vec<VirtualMachineRef>,
    power_states: HashMap<String, PowerState>,
    disk_skus: HashMap<String, DiskSku>,
    policies: Vec<JitPolicy>,
    activations: Vec<RecordedActivation>,
}

fn resource_key(resource_group: &ResourceGroupName, name: &str) -> String {
    format!(
        "{}/{}",
        resource_group.as_str().to_ascii_lowercase(),
        name.to_ascii_lowercase()
    )
}

fn same_group(left: &ResourceGroupName, right: &ResourceGroupName) -> bool {
    left.as_str().eq_ignore_ascii_case(right.as_str())
}

/// Process-local cloud implementing every provider port.
///
/// Long-running operations settle synchronously.
#[derive(Debug, Default)]
pub struct InMemoryCloud {
    locations: Vec<String>,
    state: RwLock<CloudState>,
}

impl InMemoryCloud {
    /// Creates an empty cloud reporting `locations` as security locations.
    #[must_use]
    pub fn new(locations: Vec<String>) -> Self {
        Self {
            locations,
            state: RwLock::new(CloudState::default()),
        }
    }

    /// Registers a resource group.
    pub async fn add_resource_group(&self, group: ResourceGroupRef) {
        let mut state = self.state.write().await;
        state
            .resource_groups
            .retain(|existing| !same_group(&existing.name, &group.name));
        state.resource_groups.push(group);
    }

    /// Registers a running VM and its OS disk on `Standard_LRS`.
    pub async fn add_virtual_machine(&self, vm: VirtualMachineRef) {
        let mut state = self.state.write().await;
        if let Some(disk_name) = vm.os_disk_name() {
            state
                .disk_skus
                .insert(resource_key(&vm.resource_group, disk_name), DiskSku::StandardLrs);
        }
        state
            .power_states
            .insert(resource_key(&vm.resource_group, &vm.name), PowerState::Running);
        state.virtual_machines.retain(|existing| {
            !(same_group(&existing.resource_group, &vm.resource_group)
                && existing.name.eq_ignore_ascii_case(&vm.name))
        });
        state.virtual_machines.push(vm);
    }

    /// Stores a policy as-is.
    pub async fn add_policy(&self, policy: JitPolicy) {
        let mut state = self.state.write().await;
        state.policies.retain(|existing| {
            !(same_group(&existing.resource_group, &policy.resource_group)
                && existing.name == policy.name)
        });
        state.policies.push(policy);
    }

    /// Returns a VM's power state.
    pub async fn power_state(
        &self,
        resource_group: &ResourceGroupName,
        vm_name: &str,
    ) -> Option<PowerState> {
        self.state
            .read()
            .await
            .power_states
            .get(&resource_key(resource_group, vm_name))
            .copied()
    }

    /// Returns a managed disk's tier.
    pub async fn disk_sku(&self, resource_group: &ResourceGroupName, disk_name: &str) -> Option<DiskSku> {
        self.state
            .read()
            .await
            .disk_skus
            .get(&resource_key(resource_group, disk_name))
            .copied()
    }

    /// Returns every activation submitted so far.
    pub async fn activations(&self) -> Vec<RecordedActivation> {
        self.state.read().await.activations.clone()
    }
}

#[async_trait]
impl ComputeProvider for InMemoryCloud {
    async fn list_virtual_machines(
        &self,
        resource_group: &ResourceGroupName,
    ) -> AppResult<Vec<VirtualMachineRef>> {
        Ok(self
            .state
            .read()
            .await
            .virtual_machines
            .iter()
            .filter(|vm| same_group(&vm.resource_group, resource_group))
            .cloned()
            .collect())
    }

    async fn get_virtual_machine(
        &self,
        resource_group: &ResourceGroupName,
        vm_name: &str,
    ) -> AppResult<Option<VirtualMachineRef>> {
        Ok(self
            .state
            .read()
            .await
            .virtual_machines
            .iter()
            .find(|vm| {
                same_group(&vm.resource_group, resource_group) && vm.name.eq_ignore_ascii_case(vm_name)
            })
            .cloned())
    }

    async fn begin_operation(
        &self,
        resource_group: &ResourceGroupName,
        request: &ComputeOperationRequest,
    ) -> AppResult<OperationHandle> {
        let mut state = self.state.write().await;
        let key = resource_key(resource_group, request.target_name());

        match request {
            ComputeOperationRequest::Start { vm_name }
            | ComputeOperationRequest::Deallocate { vm_name } => {
                let power_state = state.power_states.get_mut(&key).ok_or_else(|| {
                    AppError::NotFound(format!(
                        "virtual machine '{vm_name}' does not exist in resource group '{resource_group}'"
                    ))
                })?;
                *power_state = match request {
                    ComputeOperationRequest::Start { .. } => PowerState::Running,
                    _ => PowerState::Deallocated,
                };
            }
            ComputeOperationRequest::UpdateDiskSku { disk_name, sku } => {
                let current = state.disk_skus.get_mut(&key).ok_or_else(|| {
                    AppError::NotFound(format!(
                        "disk '{disk_name}' does not exist in resource group '{resource_group}'"
                    ))
                })?;
                *current = *sku;
            }
        }

        Ok(OperationHandle::completed())
    }

    async fn wait_for_completion(&self, handle: &OperationHandle) -> AppResult<()> {
        match handle.status {
            OperationStatus::Failed => Err(AppError::Provider(
                "provider reported the operation as failed".to_owned(),
            )),
            OperationStatus::Succeeded | OperationStatus::InProgress => Ok(()),
        }
    }
}

#[async_trait]
impl JitPolicyProvider for InMemoryCloud {
    async fn list_policies(&self, resource_group: &ResourceGroupName) -> AppResult<Vec<JitPolicy>> {
        Ok(self
            .state
            .read()
            .await
            .policies
            .iter()
            .filter(|policy| same_group(&policy.resource_group, resource_group))
            .cloned()
            .collect())
    }

    async fn get_policy(
        &self,
        resource_group: &ResourceGroupName,
        location: &str,
        policy_name: &str,
    ) -> AppResult<Option<JitPolicy>> {
        Ok(self
            .state
            .read()
            .await
            .policies
            .iter()
            .find(|policy| {
                same_group(&policy.resource_group, resource_group)
                    && policy.location.eq_ignore_ascii_case(location)
                    && policy.name == policy_name
            })
            .cloned())
    }

    async fn create_or_update_policy(&self, policy: &JitPolicy) -> AppResult<JitPolicy> {
        if policy.location.trim().is_empty() {
            return Err(AppError::Validation(
                "policy location must not be empty".to_owned(),
            ));
        }

        let mut stored = policy.clone();
        stored.provisioning_state = Some("Succeeded".to_owned());
        self.add_policy(stored.clone()).await;
        Ok(stored)
    }

    async fn initiate(
        &self,
        resource_group: &ResourceGroupName,
        location: &str,
        policy_name: &str,
        request: &JitActivationRequest,
    ) -> AppResult<()> {
        let covered = self
            .get_policy(resource_group, location, policy_name)
            .await?
            .is_some_and(|policy| policy.find_entry(&request.vm_resource_id).is_some());
        if !covered {
            return Err(AppError::NotFound(format!(
                "jit policy '{policy_name}' does not cover '{}'",
                request.vm_resource_id
            )));
        }

        self.state
            .write()
            .await
            .activations
            .push(RecordedActivation {
                resource_group: resource_group.to_string(),
                location: location.to_owned(),
                policy_name: policy_name.to_owned(),
                request: request.clone(),
            });
        Ok(())
    }

    async fn delete_policy(
        &self,
        resource_group: &ResourceGroupName,
        location: &str,
        policy_name: &str,
    ) -> AppResult<()> {
        self.state.write().await.policies.retain(|policy| {
            !(same_group(&policy.resource_group, resource_group)
                && policy.location.eq_ignore_ascii_case(location)
                && policy.name == policy_name)
        });
        Ok(())
    }

    async fn list_locations(&self) -> AppResult<Vec<String>> {
        Ok(self.locations.clone())
    }
}

#[async_trait]
impl ResourceGroupProvider for InMemoryCloud {
    async fn list_resource_groups(
        &self,
        filter: Option<&TagFilter>,
    ) -> AppResult<Vec<ResourceGroupRef>> {
        Ok(self
            .state
            .read()
            .await
            .resource_groups
            .iter()
            .filter(|group| filter.is_none_or(|filter| filter.matches(&group.tags)))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests;

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{info, warn};
use vmwarden_core::{AppError, AppResult, ResourceGroupName};
use vmwarden_domain::{
    EntryChange, JitActivationRequest, JitPolicy, JitPortRule, PrefixPropagation,
    VirtualMachinePolicyEntry, validate_access_hours,
};

use crate::ResourceDirectory;
use crate::policy_locks::PolicyLocks;
use crate::provider_ports::JitPolicyProvider;

/// Input payload for adding or replacing one VM's rules in a policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveVirtualMachinePolicyInput {
    /// Resource group holding the policy.
    pub resource_group: ResourceGroupName,
    /// Policy name.
    pub policy_name: String,
    /// Full resource id of the covered VM.
    pub vm_resource_id: String,
    /// Location to use when the policy does not exist yet.
    pub location: Option<String>,
    /// Complete replacement port list for the VM.
    pub ports: Vec<JitPortRule>,
}

/// Input payload for opening temporary access to one VM.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitiateAccessInput {
    /// Resource group holding both the policy and the VM.
    pub resource_group: ResourceGroupName,
    /// Policy name.
    pub policy_name: String,
    /// VM name.
    pub vm_name: String,
    /// Access window length in hours.
    pub duration_hours: u32,
    /// Optional free-text reason recorded by the provider.
    pub justification: Option<String>,
}

/// Access request that was accepted by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JitActivation {
    /// Policy the request went through.
    pub policy_name: String,
    /// Location the request was addressed to.
    pub location: String,
    /// End of the granted access window.
    pub access_window_end: DateTime<Utc>,
    /// Submitted request.
    pub request: JitActivationRequest,
}

/// Application service for just-in-time access policies.
#[derive(Clone)]
pub struct JitPolicyService {
    directory: ResourceDirectory,
    provider: Arc<dyn JitPolicyProvider>,
    locks: PolicyLocks,
    prefix_propagation: PrefixPropagation,
}

impl JitPolicyService {
    /// Creates a new JIT policy service.
    #[must_use]
    pub fn new(directory: ResourceDirectory, provider: Arc<dyn JitPolicyProvider>) -> Self {
        Self {
            directory,
            provider,
            locks: PolicyLocks::default(),
            prefix_propagation: PrefixPropagation::default(),
        }
    }

    /// Sets how configured source prefixes turn into activation ports.
    #[must_use]
    pub fn with_prefix_propagation(mut self, prefix_propagation: PrefixPropagation) -> Self {
        self.prefix_propagation = prefix_propagation;
        self
    }

    /// Lists policies in a resource group.
    pub async fn list_policies(&self, resource_group: &ResourceGroupName) -> AppResult<Vec<JitPolicy>> {
        self.provider.list_policies(resource_group).await
    }

    /// Finds a policy by exact name among the group's policies.
    pub async fn get_policy(
        &self,
        resource_group: &ResourceGroupName,
        policy_name: &str,
    ) -> AppResult<Option<JitPolicy>> {
        Ok(self
            .provider
            .list_policies(resource_group)
            .await?
            .into_iter()
            .find(|policy| policy.name == policy_name))
    }

    /// Resolves the location a policy lives in.
    ///
    /// Uses the existing policy's location, else the subscription's first
    /// security location.
    pub async fn resolve_location(
        &self,
        resource_group: &ResourceGroupName,
        policy_name: &str,
    ) -> AppResult<String> {
        match self.get_policy(resource_group, policy_name).await? {
            Some(policy) if !policy.location.trim().is_empty() => Ok(policy.location),
            _ => self.default_location().await,
        }
    }

    async fn default_location(&self) -> AppResult<String> {
        self.provider
            .list_locations()
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| {
                AppError::NotFound("subscription has no security center locations".to_owned())
            })
    }

    /// Adds or replaces one VM's entry in a policy, creating the policy when absent.
    pub async fn create_or_update(&self, input: SaveVirtualMachinePolicyInput) -> AppResult<JitPolicy> {
        if input.policy_name.trim().is_empty() {
            return Err(AppError::Validation(
                "policy name must not be empty".to_owned(),
            ));
        }
        if input.ports.is_empty() {
            return Err(AppError::Validation(
                "at least one port rule is required".to_owned(),
            ));
        }

        let _guard = self
            .locks
            .acquire(&input.resource_group, &input.policy_name)
            .await;

        let mut policy = match self
            .get_policy(&input.resource_group, &input.policy_name)
            .await?
        {
            Some(policy) => policy,
            None => {
                let location = match input.location.filter(|value| !value.trim().is_empty()) {
                    Some(location) => location,
                    None => self.default_location().await?,
                };
                JitPolicy::new_basic(
                    input.policy_name.clone(),
                    input.resource_group.clone(),
                    location,
                )
            }
        };

        let change = policy.upsert_entry(VirtualMachinePolicyEntry::new(
            input.vm_resource_id.clone(),
            input.ports,
        ));

        let stored = self.provider.create_or_update_policy(&policy).await?;
        info!(
            resource_group = %input.resource_group,
            policy_name = %input.policy_name,
            vm_resource_id = %input.vm_resource_id,
            replaced = change == EntryChange::Replaced,
            "jit policy entry saved"
        );

        Ok(stored)
    }

    /// Resolves a VM by name and saves its rules in the policy.
    ///
    /// A fresh policy is created at the VM's location.
    pub async fn save_for_virtual_machine(
        &self,
        resource_group: &ResourceGroupName,
        policy_name: &str,
        vm_name: &str,
        ports: Vec<JitPortRule>,
    ) -> AppResult<JitPolicy> {
        let vm = self.directory.get(resource_group, vm_name).await?;

        self.create_or_update(SaveVirtualMachinePolicyInput {
            resource_group: resource_group.clone(),
            policy_name: policy_name.to_owned(),
            vm_resource_id: vm.id,
            location: Some(vm.location),
            ports,
        })
        .await
    }

    /// Opens a time-boxed access window for one VM through a policy.
    ///
    /// Fails with [`AppError::NotFound`] when the policy does not cover the VM,
    /// in which case no activation is submitted.
    pub async fn initiate(&self, input: InitiateAccessInput) -> AppResult<JitActivation> {
        validate_access_hours(input.duration_hours)?;

        let vm = self
            .directory
            .get(&input.resource_group, &input.vm_name)
            .await?;
        let location = self
            .resolve_location(&input.resource_group, &input.policy_name)
            .await?;
        let policy = self
            .provider
            .get_policy(&input.resource_group, &location, &input.policy_name)
            .await?;

        let Some(entry) = policy
            .as_ref()
            .and_then(|policy| policy.find_entry(&vm.id))
        else {
            warn!(
                resource_group = %input.resource_group,
                policy_name = %input.policy_name,
                vm_name = %input.vm_name,
                "no jit policy entry covers the virtual machine"
            );
            return Err(AppError::NotFound(format!(
                "could not find a policy for virtual machine '{}' in jit policy '{}'",
                input.vm_name, input.policy_name
            )));
        };

        let access_window_end = Utc::now() + Duration::hours(i64::from(input.duration_hours));
        let mut request =
            JitActivationRequest::from_entry(entry, access_window_end, self.prefix_propagation)?;
        request.justification = input.justification;

        self.provider
            .initiate(&input.resource_group, &location, &input.policy_name, &request)
            .await?;

        info!(
            resource_group = %input.resource_group,
            policy_name = %input.policy_name,
            vm_name = %input.vm_name,
            ports = request.ports.len(),
            %access_window_end,
            "jit access initiated"
        );

        Ok(JitActivation {
            policy_name: input.policy_name,
            location,
            access_window_end,
            request,
        })
    }

    /// Deletes a policy, returning whether a delete was submitted.
    pub async fn delete(
        &self,
        resource_group: &ResourceGroupName,
        policy_name: &str,
    ) -> AppResult<bool> {
        let _guard = self.locks.acquire(resource_group, policy_name).await;

        let Some(policy) = self.get_policy(resource_group, policy_name).await? else {
            return Ok(false);
        };
        if policy.location.trim().is_empty() {
            return Ok(false);
        }

        self.provider
            .delete_policy(resource_group, &policy.location, policy_name)
            .await?;
        info!(
            resource_group = %resource_group,
            policy_name,
            location = %policy.location,
            "jit policy deleted"
        );

        Ok(true)
    }
}

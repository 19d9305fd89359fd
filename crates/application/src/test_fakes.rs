use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use vmwarden_core::{AppError, AppResult, ResourceGroupName};
use vmwarden_domain::{
    JitActivationRequest, JitPolicy, OperationStatus, ResourceGroupRef, TagFilter,
    VirtualMachineRef,
};

use crate::provider_ports::{
    ComputeOperationRequest, ComputeProvider, JitPolicyProvider, OperationHandle,
    ResourceGroupProvider,
};

pub(crate) fn group(name: &str) -> ResourceGroupName {
    ResourceGroupName::new(name).unwrap_or_else(|_| unreachable!())
}

pub(crate) fn vm(resource_group: &str, name: &str) -> VirtualMachineRef {
    VirtualMachineRef {
        id: format!(
            "/subscriptions/sub/resourceGroups/{resource_group}/providers/Microsoft.Compute/virtualMachines/{name}"
        ),
        name: name.to_owned(),
        location: "westeurope".to_owned(),
        resource_group: group(resource_group),
        vm_size: Some("Standard_B2s".to_owned()),
        os_disk_name: Some(format!("{name}_OsDisk")),
        os_disk_size_gb: Some(64),
        tags: BTreeMap::new(),
    }
}

pub(crate) fn tagged(mut vm: VirtualMachineRef, name: &str, value: &str) -> VirtualMachineRef {
    vm.tags.insert(name.to_owned(), value.to_owned());
    vm
}

#[derive(Default)]
pub(crate) struct FakeCompute {
    pub(crate) vms: Mutex<Vec<VirtualMachineRef>>,
    pub(crate) failing_lists: Mutex<HashSet<String>>,
    pub(crate) failing_targets: Mutex<HashSet<String>>,
    pub(crate) failing_waits: Mutex<HashSet<String>>,
    pub(crate) accepted_status: Mutex<Option<OperationStatus>>,
    pub(crate) operation_delay: Mutex<Option<Duration>>,
    pub(crate) submitted: Mutex<Vec<(String, ComputeOperationRequest)>>,
    pub(crate) waited: Mutex<Vec<String>>,
    pub(crate) in_flight: Mutex<usize>,
    pub(crate) peak_in_flight: Mutex<usize>,
}

impl FakeCompute {
    pub(crate) fn with_vms(vms: Vec<VirtualMachineRef>) -> Arc<Self> {
        Arc::new(Self {
            vms: Mutex::new(vms),
            ..Self::default()
        })
    }

    pub(crate) async fn submitted_targets(&self) -> Vec<String> {
        self.submitted
            .lock()
            .await
            .iter()
            .map(|(_, request)| request.target_name().to_owned())
            .collect()
    }
}

#[async_trait]
impl ComputeProvider for FakeCompute {
    async fn list_virtual_machines(
        &self,
        resource_group: &ResourceGroupName,
    ) -> AppResult<Vec<VirtualMachineRef>> {
        if self
            .failing_lists
            .lock()
            .await
            .contains(resource_group.as_str())
        {
            return Err(AppError::Provider(format!(
                "listing '{resource_group}' failed"
            )));
        }

        Ok(self
            .vms
            .lock()
            .await
            .iter()
            .filter(|vm| vm.resource_group == *resource_group)
            .cloned()
            .collect())
    }

    async fn get_virtual_machine(
        &self,
        resource_group: &ResourceGroupName,
        vm_name: &str,
    ) -> AppResult<Option<VirtualMachineRef>> {
        Ok(self
            .vms
            .lock()
            .await
            .iter()
            .find(|vm| vm.resource_group == *resource_group && vm.name == vm_name)
            .cloned())
    }

    async fn begin_operation(
        &self,
        resource_group: &ResourceGroupName,
        request: &ComputeOperationRequest,
    ) -> AppResult<OperationHandle> {
        {
            let mut in_flight = self.in_flight.lock().await;
            *in_flight += 1;
            let mut peak = self.peak_in_flight.lock().await;
            *peak = (*peak).max(*in_flight);
        }

        let delay = *self.operation_delay.lock().await;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        *self.in_flight.lock().await -= 1;

        self.submitted
            .lock()
            .await
            .push((resource_group.to_string(), request.clone()));

        if self
            .failing_targets
            .lock()
            .await
            .contains(request.target_name())
        {
            return Err(AppError::Provider(format!(
                "operation on '{}' was rejected",
                request.target_name()
            )));
        }

        let status = self
            .accepted_status
            .lock()
            .await
            .unwrap_or(OperationStatus::InProgress);

        Ok(OperationHandle {
            status,
            poll_url: Some(format!("https://poll.test/{}", request.target_name())),
        })
    }

    async fn wait_for_completion(&self, handle: &OperationHandle) -> AppResult<()> {
        let poll_url = handle.poll_url.clone().unwrap_or_default();
        self.waited.lock().await.push(poll_url.clone());

        let target = poll_url.rsplit('/').next().unwrap_or_default().to_owned();
        if self.failing_waits.lock().await.contains(&target) {
            return Err(AppError::Provider(format!(
                "operation on '{target}' ended failed"
            )));
        }

        Ok(())
    }
}

#[derive(Default)]
pub(crate) struct FakeJitProvider {
    pub(crate) policies: Mutex<Vec<JitPolicy>>,
    pub(crate) locations: Vec<String>,
    pub(crate) write_delay: Option<Duration>,
    pub(crate) writes: Mutex<Vec<JitPolicy>>,
    pub(crate) initiated: Mutex<Vec<(String, String, JitActivationRequest)>>,
    pub(crate) deleted: Mutex<Vec<(String, String)>>,
    pub(crate) location_lookups: Mutex<HashMap<String, usize>>,
}

impl FakeJitProvider {
    pub(crate) fn with_locations(locations: &[&str]) -> Self {
        Self {
            locations: locations.iter().map(|value| (*value).to_owned()).collect(),
            ..Self::default()
        }
    }
}

#[async_trait]
impl JitPolicyProvider for FakeJitProvider {
    async fn list_policies(&self, resource_group: &ResourceGroupName) -> AppResult<Vec<JitPolicy>> {
        Ok(self
            .policies
            .lock()
            .await
            .iter()
            .filter(|policy| policy.resource_group == *resource_group)
            .cloned()
            .collect())
    }

    async fn get_policy(
        &self,
        resource_group: &ResourceGroupName,
        location: &str,
        policy_name: &str,
    ) -> AppResult<Option<JitPolicy>> {
        *self
            .location_lookups
            .lock()
            .await
            .entry(location.to_owned())
            .or_default() += 1;

        Ok(self
            .policies
            .lock()
            .await
            .iter()
            .find(|policy| {
                policy.resource_group == *resource_group
                    && policy.location == location
                    && policy.name == policy_name
            })
            .cloned())
    }

    async fn create_or_update_policy(&self, policy: &JitPolicy) -> AppResult<JitPolicy> {
        if let Some(delay) = self.write_delay {
            tokio::time::sleep(delay).await;
        }

        let mut stored = policy.clone();
        stored.provisioning_state = Some("Succeeded".to_owned());

        let mut policies = self.policies.lock().await;
        policies.retain(|existing| {
            !(existing.resource_group == policy.resource_group && existing.name == policy.name)
        });
        policies.push(stored.clone());
        self.writes.lock().await.push(stored.clone());

        Ok(stored)
    }

    async fn initiate(
        &self,
        _resource_group: &ResourceGroupName,
        location: &str,
        policy_name: &str,
        request: &JitActivationRequest,
    ) -> AppResult<()> {
        self.initiated.lock().await.push((
            location.to_owned(),
            policy_name.to_owned(),
            request.clone(),
        ));
        Ok(())
    }

    async fn delete_policy(
        &self,
        resource_group: &ResourceGroupName,
        location: &str,
        policy_name: &str,
    ) -> AppResult<()> {
        self.policies.lock().await.retain(|policy| {
            !(policy.resource_group == *resource_group && policy.name == policy_name)
        });
        self.deleted
            .lock()
            .await
            .push((location.to_owned(), policy_name.to_owned()));
        Ok(())
    }

    async fn list_locations(&self) -> AppResult<Vec<String>> {
        Ok(self.locations.clone())
    }
}

#[derive(Default)]
pub(crate) struct FakeResourceGroups {
    pub(crate) groups: Vec<ResourceGroupRef>,
    pub(crate) filters: Mutex<Vec<Option<TagFilter>>>,
}

impl FakeResourceGroups {
    pub(crate) fn named(names: &[&str]) -> Self {
        Self {
            groups: names
                .iter()
                .map(|name| ResourceGroupRef {
                    name: group(name),
                    location: "westeurope".to_owned(),
                    tags: BTreeMap::new(),
                })
                .collect(),
            filters: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl ResourceGroupProvider for FakeResourceGroups {
    async fn list_resource_groups(
        &self,
        filter: Option<&TagFilter>,
    ) -> AppResult<Vec<ResourceGroupRef>> {
        self.filters.lock().await.push(filter.cloned());
        Ok(self.groups.clone())
    }
}

use std::sync::Arc;

use serde::Serialize;
use tracing::{error, info};
use vmwarden_core::{AppResult, ResourceGroupName};
use vmwarden_domain::{DiskSku, NameSelector, OperationKind, OperationOutcome, TagFilter};

use crate::provider_ports::ResourceGroupProvider;
use crate::{FanOutCoordinator, ResourceDirectory};

/// Tag filters narrowing the fleet-wide disk tier scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiskSkuEnforcementSettings {
    /// Server-side resource group filter.
    pub resource_group_filter: Option<TagFilter>,
    /// Client-side VM filter; groups without a matching VM are skipped.
    pub virtual_machine_filter: Option<TagFilter>,
}

/// How one resource group fared during a fleet scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupEnforcementStatus {
    /// Matching VMs were dispatched.
    Enforced,
    /// No VM matched the filter.
    Skipped,
    /// The group could not be processed.
    Failed,
}

/// Per-group entry of a fleet scan report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupEnforcement {
    /// Resource group name.
    pub resource_group: String,
    /// Group status.
    pub status: GroupEnforcementStatus,
    /// Per-VM outcomes for enforced groups.
    pub outcomes: Vec<OperationOutcome>,
    /// Group-level fault for failed groups.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Summary of a fleet-wide disk tier scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FleetEnforcementReport {
    /// Target tier.
    pub sku: DiskSku,
    /// One entry per listed resource group, in provider order.
    pub groups: Vec<GroupEnforcement>,
}

impl FleetEnforcementReport {
    /// Returns the number of groups that could not be processed.
    #[must_use]
    pub fn failed_groups(&self) -> usize {
        self.groups
            .iter()
            .filter(|group| group.status == GroupEnforcementStatus::Failed)
            .count()
    }

    /// Returns the number of per-VM outcomes that failed.
    #[must_use]
    pub fn failed_operations(&self) -> usize {
        self.groups
            .iter()
            .flat_map(|group| group.outcomes.iter())
            .filter(|outcome| outcome.is_failed())
            .count()
    }
}

/// Application service for OS disk tier changes.
#[derive(Clone)]
pub struct DiskSkuService {
    directory: ResourceDirectory,
    fan_out: FanOutCoordinator,
    resource_groups: Arc<dyn ResourceGroupProvider>,
    settings: DiskSkuEnforcementSettings,
}

impl DiskSkuService {
    /// Creates a new disk tier service.
    #[must_use]
    pub fn new(
        directory: ResourceDirectory,
        fan_out: FanOutCoordinator,
        resource_groups: Arc<dyn ResourceGroupProvider>,
        settings: DiskSkuEnforcementSettings,
    ) -> Self {
        Self {
            directory,
            fan_out,
            resource_groups,
            settings,
        }
    }

    /// Moves the OS disk of every selected VM to `sku`.
    pub async fn enforce(
        &self,
        resource_group: &ResourceGroupName,
        selector: &NameSelector,
        sku: DiskSku,
        wait: bool,
    ) -> AppResult<Vec<OperationOutcome>> {
        self.fan_out
            .dispatch(resource_group, selector, OperationKind::SetOsDiskSku { sku }, wait)
            .await
    }

    /// Scans every resource group and moves matching VMs' OS disks to `sku`.
    ///
    /// A failing group is logged and recorded; the scan continues with the
    /// next group. Fails only when resource groups cannot be listed.
    pub async fn enforce_fleet(&self, sku: DiskSku) -> AppResult<FleetEnforcementReport> {
        let groups = self
            .resource_groups
            .list_resource_groups(self.settings.resource_group_filter.as_ref())
            .await?;

        let mut report = FleetEnforcementReport {
            sku,
            groups: Vec::with_capacity(groups.len()),
        };

        for group in groups {
            let entry = match self.enforce_group(&group.name, sku).await {
                Ok(Some(outcomes)) => GroupEnforcement {
                    resource_group: group.name.to_string(),
                    status: GroupEnforcementStatus::Enforced,
                    outcomes,
                    error: None,
                },
                Ok(None) => GroupEnforcement {
                    resource_group: group.name.to_string(),
                    status: GroupEnforcementStatus::Skipped,
                    outcomes: Vec::new(),
                    error: None,
                },
                Err(group_error) => {
                    error!(
                        resource_group = %group.name,
                        error = %group_error,
                        "disk sku enforcement failed for resource group"
                    );
                    GroupEnforcement {
                        resource_group: group.name.to_string(),
                        status: GroupEnforcementStatus::Failed,
                        outcomes: Vec::new(),
                        error: Some(group_error.to_string()),
                    }
                }
            };
            report.groups.push(entry);
        }

        info!(
            sku = %sku,
            groups = report.groups.len(),
            failed_groups = report.failed_groups(),
            failed_operations = report.failed_operations(),
            "disk sku enforcement scan finished"
        );

        Ok(report)
    }

    async fn enforce_group(
        &self,
        resource_group: &ResourceGroupName,
        sku: DiskSku,
    ) -> AppResult<Option<Vec<OperationOutcome>>> {
        let names: Vec<String> = self
            .directory
            .list(resource_group)
            .await?
            .into_iter()
            .filter(|vm| {
                self.settings
                    .virtual_machine_filter
                    .as_ref()
                    .is_none_or(|filter| vm.has_tag(filter))
            })
            .map(|vm| vm.name)
            .collect();

        if names.is_empty() {
            return Ok(None);
        }

        Ok(Some(
            self.fan_out
                .dispatch_names(resource_group, names, OperationKind::SetOsDiskSku { sku }, true)
                .await,
        ))
    }
}

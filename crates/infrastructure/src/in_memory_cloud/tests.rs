use std::collections::BTreeMap;
use std::sync::Arc;

use vmwarden_application::{
    ComputeOperationRequest, ComputeProvider, DiskSkuEnforcementSettings, DiskSkuService,
    FanOutCoordinator, OperationExecutor, ResourceDirectory, ResourceGroupProvider,
};
use vmwarden_core::{AppError, ResourceGroupName};
use vmwarden_domain::{DiskSku, ResourceGroupRef, TagFilter, VirtualMachineRef};

use super::{InMemoryCloud, PowerState};

fn group(name: &str) -> ResourceGroupName {
    ResourceGroupName::new(name).unwrap_or_else(|_| unreachable!())
}

fn vm(resource_group: &str, name: &str, tags: &[(&str, &str)]) -> VirtualMachineRef {
    VirtualMachineRef {
        id: format!("/rg/{resource_group}/vm/{name}"),
        name: name.to_owned(),
        location: "westeurope".to_owned(),
        resource_group: group(resource_group),
        vm_size: None,
        os_disk_name: Some(format!("{name}-os")),
        os_disk_size_gb: Some(30),
        tags: tags
            .iter()
            .map(|(key, value)| ((*key).to_owned(), (*value).to_owned()))
            .collect(),
    }
}

fn resource_group(name: &str, tags: &[(&str, &str)]) -> ResourceGroupRef {
    ResourceGroupRef {
        name: group(name),
        location: "westeurope".to_owned(),
        tags: tags
            .iter()
            .map(|(key, value)| ((*key).to_owned(), (*value).to_owned()))
            .collect::<BTreeMap<_, _>>(),
    }
}

#[tokio::test]
async fn power_operations_update_state() {
    let cloud = InMemoryCloud::default();
    cloud.add_virtual_machine(vm("rg-a", "vm-1", &[])).await;

    let handle = cloud
        .begin_operation(
            &group("rg-a"),
            &ComputeOperationRequest::Deallocate {
                vm_name: "vm-1".to_owned(),
            },
        )
        .await;

    assert!(handle.is_ok());
    assert_eq!(
        cloud.power_state(&group("RG-A"), "vm-1").await,
        Some(PowerState::Deallocated)
    );
}

#[tokio::test]
async fn unknown_disks_are_not_found() {
    let cloud = InMemoryCloud::default();

    let result = cloud
        .begin_operation(
            &group("rg-a"),
            &ComputeOperationRequest::UpdateDiskSku {
                disk_name: "ghost".to_owned(),
                sku: DiskSku::PremiumLrs,
            },
        )
        .await;

    assert!(matches!(result, Err(AppError::NotFound(_))));
}

#[tokio::test]
async fn resource_groups_are_filtered_by_tag() {
    let cloud = InMemoryCloud::default();
    cloud
        .add_resource_group(resource_group("rg-a", &[("team", "ops")]))
        .await;
    cloud.add_resource_group(resource_group("rg-b", &[])).await;
    let filter = TagFilter::new("Team", "ops").unwrap_or_else(|_| unreachable!());

    let groups = cloud
        .list_resource_groups(Some(&filter))
        .await
        .unwrap_or_default();

    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].name.as_str(), "rg-a");
}

#[tokio::test]
async fn fleet_enforcement_moves_only_tagged_disks() {
    let cloud = Arc::new(InMemoryCloud::default());
    cloud.add_resource_group(resource_group("rg-a", &[])).await;
    cloud.add_resource_group(resource_group("rg-b", &[])).await;
    cloud
        .add_virtual_machine(vm("rg-a", "tagged", &[("Automation", "vm-disk")]))
        .await;
    cloud.add_virtual_machine(vm("rg-a", "plain", &[])).await;
    cloud.add_virtual_machine(vm("rg-b", "other", &[])).await;

    let directory = ResourceDirectory::new(cloud.clone());
    let fan_out = FanOutCoordinator::new(
        directory.clone(),
        Arc::new(OperationExecutor::new(cloud.clone())),
    );
    let service = DiskSkuService::new(
        directory,
        fan_out,
        cloud.clone(),
        DiskSkuEnforcementSettings {
            resource_group_filter: None,
            virtual_machine_filter: Some(
                TagFilter::new("Automation", "vm-disk").unwrap_or_else(|_| unreachable!()),
            ),
        },
    );

    let report = service.enforce_fleet(DiskSku::StandardSsdLrs).await;

    assert!(report.is_ok_and(|report| report.failed_operations() == 0));
    assert_eq!(
        cloud.disk_sku(&group("rg-a"), "tagged-os").await,
        Some(DiskSku::StandardSsdLrs)
    );
    assert_eq!(
        cloud.disk_sku(&group("rg-a"), "plain-os").await,
        Some(DiskSku::StandardLrs)
    );
    assert_eq!(
        cloud.disk_sku(&group("rg-b"), "other-os").await,
        Some(DiskSku::StandardLrs)
    );
}

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::info;
use vmwarden_core::{AppResult, ResourceGroupName};
use vmwarden_domain::{
    ANY_SOURCE_PREFIX, JitPolicy, JitPortRule, PortProtocol, ResourceGroupRef,
    VirtualMachinePolicyEntry, VirtualMachineRef,
};
use vmwarden_infrastructure::InMemoryCloud;

pub const DEMO_RESOURCE_GROUP: &str = "rg-demo";
pub const DEMO_LOCATION: &str = "westeurope";
pub const DEMO_SUBSCRIPTION: &str = "00000000-0000-0000-0000-000000000000";

fn demo_vm(resource_group: &ResourceGroupName, name: &str, tagged: bool) -> VirtualMachineRef {
    let tags = if tagged {
        BTreeMap::from([("Automation".to_owned(), "vm-disk".to_owned())])
    } else {
        BTreeMap::new()
    };

    VirtualMachineRef {
        id: format!(
            "/subscriptions/{DEMO_SUBSCRIPTION}/resourceGroups/{resource_group}/providers/Microsoft.Compute/virtualMachines/{name}"
        ),
        name: name.to_owned(),
        location: DEMO_LOCATION.to_owned(),
        resource_group: resource_group.clone(),
        vm_size: Some("Standard_B2s".to_owned()),
        os_disk_name: Some(format!("{name}_OsDisk_1")),
        os_disk_size_gb: Some(64),
        tags,
    }
}

/// Builds an in-memory cloud with one group, three VMs and a policy covering `vm-web-01`.
pub async fn seed_demo_cloud() -> AppResult<Arc<InMemoryCloud>> {
    let cloud = Arc::new(InMemoryCloud::new(vec![DEMO_LOCATION.to_owned()]));
    let resource_group = ResourceGroupName::new(DEMO_RESOURCE_GROUP)?;

    cloud
        .add_resource_group(ResourceGroupRef {
            name: resource_group.clone(),
            location: DEMO_LOCATION.to_owned(),
            tags: BTreeMap::new(),
        })
        .await;

    let web = demo_vm(&resource_group, "vm-web-01", true);
    for vm in [
        web.clone(),
        demo_vm(&resource_group, "vm-web-02", true),
        demo_vm(&resource_group, "vm-build-01", false),
    ] {
        cloud.add_virtual_machine(vm).await;
    }

    let mut policy = JitPolicy::new_basic("default", resource_group, DEMO_LOCATION);
    policy.upsert_entry(VirtualMachinePolicyEntry::new(
        web.id,
        vec![JitPortRule::new(
            22,
            PortProtocol::Tcp,
            vec![ANY_SOURCE_PREFIX.to_owned()],
            3,
        )?],
    ));
    cloud.add_policy(policy).await;

    info!(resource_group = DEMO_RESOURCE_GROUP, "seeded in-memory demo cloud");

    Ok(cloud)
}

use vmwarden_domain::{DiskSku, OperationKind, OperationStatus};

use crate::provider_ports::ComputeOperationRequest;
use crate::test_fakes::{FakeCompute, group, vm};
use crate::{DISK_NOT_FOUND, OperationExecutor, VirtualMachineOperation};

#[tokio::test]
async fn waiting_start_reports_success() {
    let compute = FakeCompute::with_vms(vec![vm("rg-a", "vm-1")]);
    let executor = OperationExecutor::new(compute.clone());

    let outcome = executor
        .run(&group("rg-a"), "vm-1", OperationKind::Start, true)
        .await;

    assert_eq!(outcome.status(), OperationStatus::Succeeded);
    assert!(outcome.waited_until_completion());
    assert_eq!(outcome.subject_name(), "vm-1");
    assert_eq!(outcome.resource_group(), "rg-a");
    assert_eq!(compute.waited.lock().await.len(), 1);
}

#[tokio::test]
async fn nowait_reports_the_accepted_status_without_polling() {
    let compute = FakeCompute::with_vms(vec![vm("rg-a", "vm-1")]);
    let executor = OperationExecutor::new(compute.clone());

    let outcome = executor
        .run(&group("rg-a"), "vm-1", OperationKind::Deallocate, false)
        .await;

    assert_eq!(outcome.status(), OperationStatus::InProgress);
    assert!(!outcome.waited_until_completion());
    assert!(outcome.error().is_none());
    assert!(compute.waited.lock().await.is_empty());
}

#[tokio::test]
async fn missing_os_disk_fails_without_an_update_call() {
    let mut diskless = vm("rg-a", "vm-1");
    diskless.os_disk_name = Some("  ".to_owned());
    let compute = FakeCompute::with_vms(vec![diskless]);
    let executor = OperationExecutor::new(compute.clone());

    let outcome = executor
        .run(
            &group("rg-a"),
            "vm-1",
            OperationKind::SetOsDiskSku {
                sku: DiskSku::StandardSsdLrs,
            },
            true,
        )
        .await;

    assert!(outcome.is_failed());
    assert_eq!(outcome.error(), Some(DISK_NOT_FOUND));
    assert!(compute.submitted.lock().await.is_empty());
}

#[tokio::test]
async fn disk_sku_change_targets_the_os_disk() {
    let compute = FakeCompute::with_vms(vec![vm("rg-a", "vm-1")]);
    let executor = OperationExecutor::new(compute.clone());

    let outcome = executor
        .run(
            &group("rg-a"),
            "vm-1",
            OperationKind::SetOsDiskSku {
                sku: DiskSku::PremiumLrs,
            },
            true,
        )
        .await;

    assert_eq!(outcome.status(), OperationStatus::Succeeded);
    let submitted = compute.submitted.lock().await;
    assert_eq!(submitted.len(), 1);
    assert_eq!(
        submitted[0].1,
        ComputeOperationRequest::UpdateDiskSku {
            disk_name: "vm-1_OsDisk".to_owned(),
            sku: DiskSku::PremiumLrs,
        }
    );
}

#[tokio::test]
async fn unknown_vm_becomes_a_failed_outcome() {
    let compute = FakeCompute::with_vms(Vec::new());
    let executor = OperationExecutor::new(compute.clone());

    let outcome = executor
        .run(
            &group("rg-a"),
            "ghost",
            OperationKind::SetOsDiskSku {
                sku: DiskSku::StandardLrs,
            },
            false,
        )
        .await;

    assert!(outcome.is_failed());
    assert!(outcome.error().unwrap_or_default().contains("ghost"));
}

#[tokio::test]
async fn provider_rejection_is_captured() {
    let compute = FakeCompute::with_vms(vec![vm("rg-a", "vm-1")]);
    compute
        .failing_targets
        .lock()
        .await
        .insert("vm-1".to_owned());
    let executor = OperationExecutor::new(compute.clone());

    let outcome = executor
        .run(&group("rg-a"), "vm-1", OperationKind::Start, true)
        .await;

    assert!(outcome.is_failed());
    assert!(!outcome.waited_until_completion());
    assert!(outcome.error().unwrap_or_default().contains("rejected"));
}

#[tokio::test]
async fn failed_completion_is_reported_after_waiting() {
    let compute = FakeCompute::with_vms(vec![vm("rg-a", "vm-1")]);
    compute.failing_waits.lock().await.insert("vm-1".to_owned());
    let executor = OperationExecutor::new(compute.clone());

    let outcome = executor
        .run(&group("rg-a"), "vm-1", OperationKind::Deallocate, true)
        .await;

    assert!(outcome.is_failed());
    assert!(outcome.waited_until_completion());
}

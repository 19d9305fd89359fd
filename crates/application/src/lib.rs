//! Application services and ports.

#![forbid(unsafe_code)]

mod disk_sku_service;
mod fan_out;
mod jit_policy_service;
mod operation_executor;
mod policy_locks;
mod provider_ports;
mod resource_directory;
mod virtual_machine_service;

#[cfg(test)]
mod test_fakes;

pub use disk_sku_service::{
    DiskSkuEnforcementSettings, DiskSkuService, FleetEnforcementReport, GroupEnforcement,
    GroupEnforcementStatus,
};
pub use fan_out::{DEFAULT_MAX_PARALLELISM, FanOutCoordinator};
pub use jit_policy_service::{
    InitiateAccessInput, JitActivation, JitPolicyService, SaveVirtualMachinePolicyInput,
};
pub use operation_executor::{DISK_NOT_FOUND, OperationExecutor, VirtualMachineOperation};
pub use policy_locks::PolicyLocks;
pub use provider_ports::{
    ComputeOperationRequest, ComputeProvider, JitPolicyProvider, OperationHandle,
    ResourceGroupProvider,
};
pub use resource_directory::ResourceDirectory;
pub use virtual_machine_service::VirtualMachineService;

//! Domain entities and invariants.

#![forbid(unsafe_code)]

mod disk;
mod jit;
mod operation;
mod selector;
mod virtual_machine;

pub use disk::DiskSku;
pub use jit::{
    ANY_SOURCE_PREFIX, AccessPort, BASIC_POLICY_KIND, EntryChange, JitActivationRequest,
    JitPolicy, JitPortRule, MAX_ACCESS_DURATION_HOURS, PortProtocol, PrefixPropagation,
    VirtualMachinePolicyEntry, validate_access_hours, validate_source_prefix,
};
pub use operation::{OperationKind, OperationOutcome, OperationStatus};
pub use selector::{ALL_VIRTUAL_MACHINES, NameSelector};
pub use virtual_machine::{ResourceGroupRef, TagFilter, VirtualMachineRef};

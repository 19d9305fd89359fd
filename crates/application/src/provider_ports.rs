mod compute;
mod resource_groups;
mod security;

pub use compute::{ComputeOperationRequest, ComputeProvider, OperationHandle};
pub use resource_groups::ResourceGroupProvider;
pub use security::JitPolicyProvider;

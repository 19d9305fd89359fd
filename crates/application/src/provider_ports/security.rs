use async_trait::async_trait;
use vmwarden_core::{AppResult, ResourceGroupName};
use vmwarden_domain::{JitActivationRequest, JitPolicy};

/// Port over the cloud security-center JIT access API.
///
/// Policies are addressed by resource group, location, and name.
#[async_trait]
pub trait JitPolicyProvider: Send + Sync {
    /// Lists policies in a resource group across all locations.
    async fn list_policies(&self, resource_group: &ResourceGroupName) -> AppResult<Vec<JitPolicy>>;

    /// Fetches one policy, returning `None` when it does not exist.
    async fn get_policy(
        &self,
        resource_group: &ResourceGroupName,
        location: &str,
        policy_name: &str,
    ) -> AppResult<Option<JitPolicy>>;

    /// Writes the full policy document and returns the stored result.
    async fn create_or_update_policy(&self, policy: &JitPolicy) -> AppResult<JitPolicy>;

    /// Opens temporary access for one VM covered by the policy.
    async fn initiate(
        &self,
        resource_group: &ResourceGroupName,
        location: &str,
        policy_name: &str,
        request: &JitActivationRequest,
    ) -> AppResult<()>;

    /// Deletes a policy.
    async fn delete_policy(
        &self,
        resource_group: &ResourceGroupName,
        location: &str,
        policy_name: &str,
    ) -> AppResult<()>;

    /// Lists the security-center home locations of the subscription.
    async fn list_locations(&self) -> AppResult<Vec<String>>;
}

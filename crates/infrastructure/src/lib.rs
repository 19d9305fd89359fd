//! Infrastructure adapters for application ports.

#![forbid(unsafe_code)]

mod arm_client;
mod arm_compute_provider;
mod arm_resource_group_provider;
mod arm_security_provider;
mod azure_credential;
mod cloud_providers;
mod in_memory_cloud;

pub use arm_client::{ArmClient, ArmClientConfig, DEFAULT_ARM_ENDPOINT};
pub use arm_compute_provider::ArmComputeProvider;
pub use arm_resource_group_provider::ArmResourceGroupProvider;
pub use arm_security_provider::ArmSecurityProvider;
pub use azure_credential::{
    AccessToken, AzureCliCredential, CachedTokenCredential, ChainedTokenCredential,
    CredentialKind, IMDS_TOKEN_ENDPOINT, ManagedIdentityCredential, ManagedIdentityEndpoint,
    TokenCredential, build_credential,
};
pub use cloud_providers::{ArmConnectionSettings, CloudProviders, ProviderKind};
pub use in_memory_cloud::{InMemoryCloud, PowerState, RecordedActivation};

use async_trait::async_trait;
use vmwarden_core::AppResult;
use vmwarden_domain::{ResourceGroupRef, TagFilter};

/// Port over the subscription's resource group listing.
#[async_trait]
pub trait ResourceGroupProvider: Send + Sync {
    /// Lists resource groups, optionally narrowed server-side by one tag.
    async fn list_resource_groups(
        &self,
        filter: Option<&TagFilter>,
    ) -> AppResult<Vec<ResourceGroupRef>>;
}

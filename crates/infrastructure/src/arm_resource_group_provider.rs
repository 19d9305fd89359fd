use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::warn;
use vmwarden_application::ResourceGroupProvider;
use vmwarden_core::{AppResult, ResourceGroupName};
use vmwarden_domain::{ResourceGroupRef, TagFilter};

use crate::ArmClient;

const RESOURCES_API_VERSION: &str = "2021-04-01";

#[derive(Debug, Deserialize)]
struct ResourceGroupResource {
    name: String,
    location: String,
    #[serde(default)]
    tags: Option<BTreeMap<String, String>>,
}

impl ResourceGroupResource {
    fn into_domain(self) -> AppResult<ResourceGroupRef> {
        Ok(ResourceGroupRef {
            name: ResourceGroupName::new(self.name)?,
            location: self.location,
            tags: self.tags.unwrap_or_default(),
        })
    }
}

/// Resource group listing backed by `Microsoft.Resources`.
#[derive(Clone)]
pub struct ArmResourceGroupProvider {
    client: ArmClient,
}

impl ArmResourceGroupProvider {
    /// Creates a resource group provider over an ARM client.
    #[must_use]
    pub fn new(client: ArmClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ResourceGroupProvider for ArmResourceGroupProvider {
    async fn list_resource_groups(
        &self,
        filter: Option<&TagFilter>,
    ) -> AppResult<Vec<ResourceGroupRef>> {
        let mut url = self
            .client
            .subscription_url(&["resourcegroups"], RESOURCES_API_VERSION)?;
        if let Some(filter) = filter {
            url.query_pairs_mut()
                .append_pair("$filter", &filter.to_odata_filter());
        }

        let resources: Vec<ResourceGroupResource> = self.client.list_all(url).await?;
        let mut groups = Vec::with_capacity(resources.len());
        for resource in resources {
            let name = resource.name.clone();
            match resource.into_domain() {
                Ok(group) => groups.push(group),
                Err(error) => {
                    warn!(name = %name, error = %error, "skipping unparseable resource group");
                }
            }
        }

        Ok(groups)
    }
}

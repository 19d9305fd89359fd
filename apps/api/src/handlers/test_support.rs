use std::sync::Arc;

use vmwarden_core::ResourceGroupName;
use vmwarden_domain::TagFilter;
use vmwarden_infrastructure::{CloudProviders, InMemoryCloud};

use crate::api_config::ServiceSettings;
use crate::api_services::build_app_state;
use crate::dev_seed::{DEMO_RESOURCE_GROUP, seed_demo_cloud};
use crate::state::AppState;

pub(crate) async fn demo_state() -> (AppState, Arc<InMemoryCloud>) {
    let cloud = seed_demo_cloud().await.unwrap_or_else(|_| unreachable!());
    let mut settings = ServiceSettings::default();
    settings.enforcement.virtual_machine_filter =
        TagFilter::new("Automation", "vm-disk").ok();

    let state = build_app_state(CloudProviders::in_memory(cloud.clone()), &settings, None);
    (state, cloud)
}

pub(crate) fn demo_group() -> ResourceGroupName {
    ResourceGroupName::new(DEMO_RESOURCE_GROUP).unwrap_or_else(|_| unreachable!())
}

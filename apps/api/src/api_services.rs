use std::sync::Arc;

use tracing::warn;
use vmwarden_application::{
    DiskSkuService, FanOutCoordinator, JitPolicyService, OperationExecutor, ResourceDirectory,
    VirtualMachineService,
};
use vmwarden_core::AppError;
use vmwarden_infrastructure::{CloudProviders, ProviderKind};

use crate::api_config::{ApiConfig, ServiceSettings};
use crate::dev_seed::seed_demo_cloud;
use crate::state::AppState;

pub async fn build_providers(config: &ApiConfig) -> Result<CloudProviders, AppError> {
    match (config.provider, config.arm.clone()) {
        (ProviderKind::Arm, Some(settings)) => CloudProviders::connect_arm(settings),
        (ProviderKind::Arm, None) => Err(AppError::Validation(
            "ARM provider selected without connection settings".to_owned(),
        )),
        (ProviderKind::InMemory, _) => {
            warn!("serving requests from the in-memory demo cloud");
            Ok(CloudProviders::in_memory(seed_demo_cloud().await?))
        }
    }
}

pub fn build_app_state(
    providers: CloudProviders,
    settings: &ServiceSettings,
    access_key: Option<String>,
) -> AppState {
    let directory = ResourceDirectory::new(providers.compute.clone());
    let executor = Arc::new(OperationExecutor::new(providers.compute));
    let fan_out = FanOutCoordinator::new(directory.clone(), executor)
        .with_max_parallelism(settings.max_parallelism);

    AppState {
        virtual_machine_service: VirtualMachineService::new(directory.clone(), fan_out.clone()),
        disk_sku_service: DiskSkuService::new(
            directory.clone(),
            fan_out,
            providers.resource_groups,
            settings.enforcement.clone(),
        ),
        jit_policy_service: JitPolicyService::new(directory, providers.jit_policies)
            .with_prefix_propagation(settings.prefix_propagation),
        defaults: settings.defaults.clone(),
        access_key,
    }
}

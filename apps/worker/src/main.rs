//! vmwarden recurring disk tier enforcement.

#![forbid(unsafe_code)]

use std::env;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use vmwarden_application::{
    DEFAULT_MAX_PARALLELISM, DiskSkuEnforcementSettings, DiskSkuService, FanOutCoordinator,
    OperationExecutor, ResourceDirectory,
};
use vmwarden_core::{AppError, AppResult};
use vmwarden_domain::{DiskSku, TagFilter};
use vmwarden_infrastructure::{ArmConnectionSettings, CloudProviders, ProviderKind};

#[derive(Debug, Clone)]
struct WorkerConfig {
    enabled: bool,
    run_on_startup: bool,
    interval: Duration,
    sku: DiskSku,
    max_parallelism: usize,
    enforcement: DiskSkuEnforcementSettings,
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = WorkerConfig::load()?;
    if !config.enabled {
        info!("disk sku enforcement is disabled; vmwarden-worker exiting");
        return Ok(());
    }

    let providers = CloudProviders::connect_arm(ArmConnectionSettings::from_env()?)?;
    let service = build_disk_sku_service(providers, &config);

    info!(
        sku = %config.sku,
        interval_seconds = config.interval.as_secs(),
        run_on_startup = config.run_on_startup,
        max_parallelism = config.max_parallelism,
        "vmwarden-worker started"
    );

    let mut ticker = tokio::time::interval(config.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    if !config.run_on_startup {
        ticker.tick().await;
    }

    loop {
        ticker.tick().await;
        run_enforcement(&service, config.sku).await;
    }
}

fn build_disk_sku_service(providers: CloudProviders, config: &WorkerConfig) -> DiskSkuService {
    let directory = ResourceDirectory::new(providers.compute.clone());
    let fan_out = FanOutCoordinator::new(
        directory.clone(),
        Arc::new(OperationExecutor::new(providers.compute)),
    )
    .with_max_parallelism(config.max_parallelism);

    DiskSkuService::new(
        directory,
        fan_out,
        providers.resource_groups,
        config.enforcement.clone(),
    )
}

/// Runs one fleet scan; failures are logged and the schedule continues.
async fn run_enforcement(service: &DiskSkuService, sku: DiskSku) -> bool {
    match service.enforce_fleet(sku).await {
        Ok(report) => {
            info!(
                sku = %report.sku,
                groups = report.groups.len(),
                failed_groups = report.failed_groups(),
                failed_operations = report.failed_operations(),
                "fleet disk sku enforcement finished"
            );
            true
        }
        Err(error) => {
            error!(sku = %sku, error = %error, "fleet disk sku enforcement failed");
            false
        }
    }
}

impl WorkerConfig {
    fn load() -> AppResult<Self> {
        let enabled = parse_env_bool("DISK_SKU_ENFORCEMENT_ENABLED", true);
        let run_on_startup = parse_env_bool("DISK_SKU_ENFORCEMENT_RUN_ON_STARTUP", false);
        let interval_seconds = parse_env_u64("DISK_SKU_ENFORCEMENT_INTERVAL_SECONDS", 86_400)?;
        let max_parallelism = parse_env_usize("FANOUT_MAX_PARALLELISM", DEFAULT_MAX_PARALLELISM)?;

        if interval_seconds == 0 {
            return Err(AppError::Validation(
                "DISK_SKU_ENFORCEMENT_INTERVAL_SECONDS must be greater than zero".to_owned(),
            ));
        }

        if max_parallelism == 0 {
            return Err(AppError::Validation(
                "FANOUT_MAX_PARALLELISM must be greater than zero".to_owned(),
            ));
        }

        let sku = DiskSku::from_str(
            env::var("DISK_SKU_NAME")
                .unwrap_or_else(|_| DiskSku::default().as_str().to_owned())
                .as_str(),
        )?;
        let tag_name = env::var("AUTOMATION_TAG_NAME").unwrap_or_else(|_| "Automation".to_owned());
        let tag_value =
            env::var("AUTOMATION_DISK_TAG_VALUE").unwrap_or_else(|_| "vm-disk".to_owned());
        let resource_group_filter = optional_env("RESOURCE_GROUP_TAG_FILTER")
            .map(|value| TagFilter::parse(value.as_str()))
            .transpose()?;
        require_arm_provider(ProviderKind::from_str(
            env::var("AZURE_PROVIDER")
                .unwrap_or_else(|_| "arm".to_owned())
                .as_str(),
        )?)?;

        Ok(Self {
            enabled,
            run_on_startup,
            interval: Duration::from_secs(interval_seconds),
            sku,
            max_parallelism,
            enforcement: DiskSkuEnforcementSettings {
                resource_group_filter,
                virtual_machine_filter: Some(TagFilter::new(tag_name, tag_value)?),
            },
        })
    }
}

/// An in-memory cloud is private to its process; the worker would only scan an empty fleet.
fn require_arm_provider(provider: ProviderKind) -> AppResult<()> {
    match provider {
        ProviderKind::Arm => Ok(()),
        ProviderKind::InMemory => Err(AppError::Validation(
            "vmwarden-worker requires AZURE_PROVIDER=arm; in_memory is only served by vmwarden-api"
                .to_owned(),
        )),
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}

fn optional_env(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}

fn parse_env_bool(name: &str, default: bool) -> bool {
    env::var(name)
        .map(|value| value.trim().eq_ignore_ascii_case("true"))
        .unwrap_or(default)
}

fn parse_env_usize(name: &str, default: usize) -> AppResult<usize> {
    match env::var(name) {
        Ok(value) => value.parse::<usize>().map_err(|error| {
            AppError::Validation(format!("invalid {name} value '{value}': {error}"))
        }),
        Err(_) => Ok(default),
    }
}

fn parse_env_u64(name: &str, default: u64) -> AppResult<u64> {
    match env::var(name) {
        Ok(value) => value.parse::<u64>().map_err(|error| {
            AppError::Validation(format!("invalid {name} value '{value}': {error}"))
        }),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Arc;
    use std::time::Duration;

    use vmwarden_application::DiskSkuEnforcementSettings;
    use vmwarden_core::ResourceGroupName;
    use vmwarden_domain::{DiskSku, ResourceGroupRef, TagFilter, VirtualMachineRef};
    use vmwarden_core::AppError;
    use vmwarden_infrastructure::{CloudProviders, InMemoryCloud, ProviderKind};

    use super::{WorkerConfig, build_disk_sku_service, require_arm_provider, run_enforcement};

    fn config() -> WorkerConfig {
        WorkerConfig {
            enabled: true,
            run_on_startup: true,
            interval: Duration::from_secs(60),
            sku: DiskSku::PremiumLrs,
            max_parallelism: 4,
            enforcement: DiskSkuEnforcementSettings {
                resource_group_filter: None,
                virtual_machine_filter: TagFilter::new("Automation", "vm-disk").ok(),
            },
        }
    }

    #[test]
    fn only_the_arm_provider_is_accepted() {
        assert!(require_arm_provider(ProviderKind::Arm).is_ok());
        assert!(matches!(
            require_arm_provider(ProviderKind::InMemory),
            Err(AppError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn scheduled_run_moves_tagged_disks() {
        let cloud = Arc::new(InMemoryCloud::new(vec!["westeurope".to_owned()]));
        let group = ResourceGroupName::new("rg-batch").unwrap_or_else(|_| unreachable!());
        cloud
            .add_resource_group(ResourceGroupRef {
                name: group.clone(),
                location: "westeurope".to_owned(),
                tags: BTreeMap::new(),
            })
            .await;
        cloud
            .add_virtual_machine(VirtualMachineRef {
                id: "/subscriptions/sub/resourceGroups/rg-batch/providers/Microsoft.Compute/virtualMachines/vm-1".to_owned(),
                name: "vm-1".to_owned(),
                location: "westeurope".to_owned(),
                resource_group: group.clone(),
                vm_size: None,
                os_disk_name: Some("vm-1-os".to_owned()),
                os_disk_size_gb: None,
                tags: BTreeMap::from([("Automation".to_owned(), "vm-disk".to_owned())]),
            })
            .await;

        let config = config();
        let service = build_disk_sku_service(CloudProviders::in_memory(cloud.clone()), &config);

        assert!(run_enforcement(&service, config.sku).await);
        assert_eq!(
            cloud.disk_sku(&group, "vm-1-os").await,
            Some(DiskSku::PremiumLrs)
        );
    }

    #[tokio::test]
    async fn empty_fleet_is_a_successful_run() {
        let config = config();
        let service = build_disk_sku_service(
            CloudProviders::in_memory(Arc::new(InMemoryCloud::default())),
            &config,
        );

        assert!(run_enforcement(&service, config.sku).await);
    }
}

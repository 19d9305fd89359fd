use std::env;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;

use tracing_subscriber::EnvFilter;
use vmwarden_application::{DEFAULT_MAX_PARALLELISM, DiskSkuEnforcementSettings};
use vmwarden_core::AppError;
use vmwarden_domain::{
    ANY_SOURCE_PREFIX, DiskSku, PrefixPropagation, TagFilter, validate_access_hours,
    validate_source_prefix,
};
use vmwarden_infrastructure::{ArmConnectionSettings, ProviderKind};

use crate::state::RequestDefaults;

/// Settings shared by every application service.
#[derive(Debug, Clone)]
pub struct ServiceSettings {
    pub max_parallelism: usize,
    pub prefix_propagation: PrefixPropagation,
    pub enforcement: DiskSkuEnforcementSettings,
    pub defaults: RequestDefaults,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            max_parallelism: DEFAULT_MAX_PARALLELISM,
            prefix_propagation: PrefixPropagation::default(),
            enforcement: DiskSkuEnforcementSettings::default(),
            defaults: RequestDefaults::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub api_host: String,
    pub api_port: u16,
    pub access_key: Option<String>,
    pub cors_origin: Option<String>,
    pub provider: ProviderKind,
    pub arm: Option<ArmConnectionSettings>,
    pub services: ServiceSettings,
}

impl ApiConfig {
    pub fn load() -> Result<Self, AppError> {
        let api_host = env::var("API_HOST").unwrap_or_else(|_| "127.0.0.1".to_owned());
        let api_port = env::var("API_PORT")
            .ok()
            .and_then(|value| value.parse::<u16>().ok())
            .unwrap_or(3001);

        let access_key = optional_env("API_ACCESS_KEY");
        let cors_origin = optional_env("API_CORS_ORIGIN");

        let provider = ProviderKind::from_str(
            env::var("AZURE_PROVIDER")
                .unwrap_or_else(|_| "arm".to_owned())
                .as_str(),
        )?;
        let arm = match provider {
            ProviderKind::Arm => Some(ArmConnectionSettings::from_env()?),
            ProviderKind::InMemory => None,
        };

        Ok(Self {
            api_host,
            api_port,
            access_key,
            cors_origin,
            provider,
            arm,
            services: load_service_settings()?,
        })
    }

    pub fn socket_address(&self) -> Result<SocketAddr, AppError> {
        let ip = IpAddr::from_str(self.api_host.as_str())
            .map_err(|error| AppError::Validation(format!("invalid API_HOST: {error}")))?;
        Ok(SocketAddr::from((ip, self.api_port)))
    }
}

fn load_service_settings() -> Result<ServiceSettings, AppError> {
    let max_parallelism = parse_env_usize("FANOUT_MAX_PARALLELISM", DEFAULT_MAX_PARALLELISM)?;
    if max_parallelism == 0 {
        return Err(AppError::Validation(
            "FANOUT_MAX_PARALLELISM must be greater than zero".to_owned(),
        ));
    }

    let prefix_propagation = PrefixPropagation::from_str(
        env::var("JIT_PREFIX_PROPAGATION")
            .unwrap_or_else(|_| "all".to_owned())
            .as_str(),
    )?;

    let allowed_source_prefixes: Vec<String> = env::var("ALLOWED_IP_ADDRESS_PREFIXES")
        .unwrap_or_else(|_| ANY_SOURCE_PREFIX.to_owned())
        .split(',')
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
        .collect();
    for prefix in &allowed_source_prefixes {
        validate_source_prefix(prefix)?;
    }

    let duration_hours = parse_env_u32("JIT_DEFAULT_DURATION_HOURS", 3)?;
    validate_access_hours(duration_hours)?;

    let disk_sku = DiskSku::from_str(
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

    Ok(ServiceSettings {
        max_parallelism,
        prefix_propagation,
        enforcement: DiskSkuEnforcementSettings {
            resource_group_filter,
            virtual_machine_filter: Some(TagFilter::new(tag_name, tag_value)?),
        },
        defaults: RequestDefaults {
            disk_sku,
            policy_name: env::var("JIT_DEFAULT_POLICY_NAME")
                .unwrap_or_else(|_| "default".to_owned()),
            duration_hours,
            allowed_source_prefixes,
        },
    })
}

pub fn init_tracing() {
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

fn parse_env_usize(name: &str, default: usize) -> Result<usize, AppError> {
    match env::var(name) {
        Ok(value) => value.parse::<usize>().map_err(|error| {
            AppError::Validation(format!("invalid {name} value '{value}': {error}"))
        }),
        Err(_) => Ok(default),
    }
}

fn parse_env_u32(name: &str, default: u32) -> Result<u32, AppError> {
    match env::var(name) {
        Ok(value) => value.parse::<u32>().map_err(|error| {
            AppError::Validation(format!("invalid {name} value '{value}': {error}"))
        }),
        Err(_) => Ok(default),
    }
}

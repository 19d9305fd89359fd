use std::env;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use vmwarden_application::{ComputeProvider, JitPolicyProvider, ResourceGroupProvider};
use vmwarden_core::{AppError, AppResult};

use crate::{
    ArmClient, ArmClientConfig, ArmComputeProvider, ArmResourceGroupProvider, ArmSecurityProvider,
    CredentialKind, DEFAULT_ARM_ENDPOINT, IMDS_TOKEN_ENDPOINT, InMemoryCloud,
    ManagedIdentityEndpoint, build_credential,
};

/// Backend serving the provider ports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    /// Azure Resource Manager.
    Arm,
    /// Process-local [`InMemoryCloud`].
    InMemory,
}

impl FromStr for ProviderKind {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "arm" => Ok(Self::Arm),
            "in_memory" => Ok(Self::InMemory),
            other => Err(AppError::Validation(format!(
                "provider must be 'arm' or 'in_memory', got '{other}'"
            ))),
        }
    }
}

/// Connection settings for the ARM-backed providers.
#[derive(Debug, Clone)]
pub struct ArmConnectionSettings {
    /// Resource Manager base URL.
    pub endpoint: String,
    /// Subscription all calls are scoped to.
    pub subscription_id: String,
    /// Credential chain to authenticate with.
    pub credential: CredentialKind,
    /// Managed identity token endpoint.
    pub managed_identity_endpoint: ManagedIdentityEndpoint,
    /// User-assigned identity client id.
    pub client_id: Option<String>,
    /// Retries for throttled or failed requests.
    pub max_retries: u32,
    /// Poll interval used when the provider sends no `Retry-After`.
    pub poll_interval: Duration,
    /// Timeout applied to each HTTP request.
    pub request_timeout: Duration,
}

impl ArmConnectionSettings {
    /// Reads the settings from process environment variables.
    pub fn from_env() -> AppResult<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Reads the settings through `lookup`, which returns a variable's raw value.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> AppResult<Self> {
        let optional = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_owned())
                .filter(|value| !value.is_empty())
        };
        let number = |name: &str, default: u64| -> AppResult<u64> {
            match optional(name) {
                Some(value) => value.parse::<u64>().map_err(|error| {
                    AppError::Validation(format!("invalid {name} value '{value}': {error}"))
                }),
                None => Ok(default),
            }
        };

        let subscription_id = optional("AZURE_SUBSCRIPTION_ID").ok_or_else(|| {
            AppError::Validation("AZURE_SUBSCRIPTION_ID must be set and non-empty".to_owned())
        })?;
        let credential = CredentialKind::from_str(
            optional("AZURE_CREDENTIAL")
                .unwrap_or_else(|| "auto".to_owned())
                .as_str(),
        )?;

        let managed_identity_endpoint =
            match (optional("IDENTITY_ENDPOINT"), optional("IDENTITY_HEADER")) {
                (Some(url), Some(header)) => ManagedIdentityEndpoint::AppService { url, header },
                _ => ManagedIdentityEndpoint::Imds {
                    url: IMDS_TOKEN_ENDPOINT.to_owned(),
                },
            };

        let poll_interval_ms = number("ARM_POLL_INTERVAL_MS", 2000)?;
        if poll_interval_ms == 0 {
            return Err(AppError::Validation(
                "ARM_POLL_INTERVAL_MS must be greater than zero".to_owned(),
            ));
        }

        let max_retries = u32::try_from(number("ARM_MAX_RETRIES", 3)?)
            .map_err(|_| AppError::Validation("ARM_MAX_RETRIES is out of range".to_owned()))?;

        Ok(Self {
            endpoint: optional("ARM_ENDPOINT").unwrap_or_else(|| DEFAULT_ARM_ENDPOINT.to_owned()),
            subscription_id,
            credential,
            managed_identity_endpoint,
            client_id: optional("AZURE_CLIENT_ID"),
            max_retries,
            poll_interval: Duration::from_millis(poll_interval_ms),
            request_timeout: Duration::from_secs(number("ARM_REQUEST_TIMEOUT_SECONDS", 60)?),
        })
    }
}

/// The three provider ports behind one backend.
#[derive(Clone)]
pub struct CloudProviders {
    /// Compute port.
    pub compute: Arc<dyn ComputeProvider>,
    /// JIT policy port.
    pub jit_policies: Arc<dyn JitPolicyProvider>,
    /// Resource group port.
    pub resource_groups: Arc<dyn ResourceGroupProvider>,
}

impl CloudProviders {
    /// Builds ARM-backed providers sharing one client and credential cache.
    pub fn connect_arm(settings: ArmConnectionSettings) -> AppResult<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(settings.request_timeout)
            .build()
            .map_err(|error| AppError::Internal(format!("failed to build HTTP client: {error}")))?;

        let credential = build_credential(
            settings.credential,
            http_client.clone(),
            settings.managed_identity_endpoint,
            settings.client_id,
        );

        let mut config =
            ArmClientConfig::new(settings.endpoint.as_str(), settings.subscription_id)?;
        config.max_retries = settings.max_retries;
        config.poll_interval = settings.poll_interval;

        let client = ArmClient::new(http_client, credential, config);

        Ok(Self {
            compute: Arc::new(ArmComputeProvider::new(client.clone())),
            jit_policies: Arc::new(ArmSecurityProvider::new(client.clone())),
            resource_groups: Arc::new(ArmResourceGroupProvider::new(client)),
        })
    }

    /// Serves every port from one in-memory cloud.
    #[must_use]
    pub fn in_memory(cloud: Arc<InMemoryCloud>) -> Self {
        Self {
            compute: cloud.clone(),
            jit_policies: cloud.clone(),
            resource_groups: cloud,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::str::FromStr;
    use std::sync::Arc;
    use std::time::Duration;

    use vmwarden_core::ResourceGroupName;

    use super::{ArmConnectionSettings, CloudProviders, ProviderKind};
    use crate::{CredentialKind, InMemoryCloud, ManagedIdentityEndpoint};

    #[test]
    fn provider_kind_parses_known_values() {
        assert_eq!(ProviderKind::from_str("arm").ok(), Some(ProviderKind::Arm));
        assert_eq!(
            ProviderKind::from_str("in_memory").ok(),
            Some(ProviderKind::InMemory)
        );
        assert!(ProviderKind::from_str("aws").is_err());
    }

    #[test]
    fn arm_connection_rejects_blank_subscription() {
        let result = CloudProviders::connect_arm(ArmConnectionSettings {
            endpoint: "https://management.azure.com".to_owned(),
            subscription_id: "  ".to_owned(),
            credential: CredentialKind::Cli,
            managed_identity_endpoint: ManagedIdentityEndpoint::default(),
            client_id: None,
            max_retries: 0,
            poll_interval: Duration::from_millis(10),
            request_timeout: Duration::from_secs(5),
        });

        assert!(result.is_err());
    }

    fn settings_from(vars: &[(&str, &str)]) -> vmwarden_core::AppResult<ArmConnectionSettings> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(name, value)| ((*name).to_owned(), (*value).to_owned()))
            .collect();
        ArmConnectionSettings::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn settings_default_everything_but_the_subscription() {
        let settings = settings_from(&[("AZURE_SUBSCRIPTION_ID", "sub-1")])
            .unwrap_or_else(|_| unreachable!());

        assert_eq!(settings.subscription_id, "sub-1");
        assert_eq!(settings.endpoint, crate::DEFAULT_ARM_ENDPOINT);
        assert_eq!(settings.max_retries, 3);
        assert_eq!(settings.poll_interval, Duration::from_millis(2000));
        assert!(matches!(
            settings.managed_identity_endpoint,
            ManagedIdentityEndpoint::Imds { .. }
        ));
    }

    #[test]
    fn settings_reject_missing_or_blank_subscription() {
        assert!(settings_from(&[]).is_err());
        assert!(settings_from(&[("AZURE_SUBSCRIPTION_ID", "   ")]).is_err());
    }

    #[test]
    fn settings_reject_zero_poll_interval() {
        let result = settings_from(&[
            ("AZURE_SUBSCRIPTION_ID", "sub-1"),
            ("ARM_POLL_INTERVAL_MS", "0"),
        ]);

        assert!(matches!(result, Err(vmwarden_core::AppError::Validation(_))));
    }

    #[test]
    fn settings_pick_the_app_service_identity_endpoint() {
        let settings = settings_from(&[
            ("AZURE_SUBSCRIPTION_ID", "sub-1"),
            ("IDENTITY_ENDPOINT", "http://localhost:8081/msi/token"),
            ("IDENTITY_HEADER", "secret"),
        ])
        .unwrap_or_else(|_| unreachable!());

        assert!(matches!(
            settings.managed_identity_endpoint,
            ManagedIdentityEndpoint::AppService { .. }
        ));
    }

    #[tokio::test]
    async fn in_memory_ports_share_state() {
        let cloud = Arc::new(InMemoryCloud::new(vec!["westeurope".to_owned()]));
        let providers = CloudProviders::in_memory(cloud);

        let locations = providers.jit_policies.list_locations().await;
        let resource_group = ResourceGroupName::new("rg-empty").unwrap_or_else(|_| unreachable!());
        let machines = providers
            .compute
            .list_virtual_machines(&resource_group)
            .await;

        assert_eq!(locations.unwrap_or_default(), vec!["westeurope".to_owned()]);
        assert!(machines.unwrap_or_default().is_empty());
    }
}

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use vmwarden_application::JitPolicyProvider;
use vmwarden_core::{AppError, AppResult, ResourceGroupName};
use vmwarden_domain::{
    JitActivationRequest, JitPolicy, JitPortRule, PortProtocol, VirtualMachinePolicyEntry,
};

use crate::ArmClient;

const JIT_API_VERSION: &str = "2020-01-01";
const LOCATIONS_API_VERSION: &str = "2015-06-01-preview";

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
struct JitPolicyResource {
    #[serde(default, skip_serializing)]
    id: Option<String>,
    #[serde(default, skip_serializing)]
    name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    kind: Option<String>,
    #[serde(default)]
    properties: JitPolicyProperties,
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
struct JitPolicyProperties {
    #[serde(default)]
    virtual_machines: Vec<JitVirtualMachine>,
    #[serde(default, skip_serializing)]
    provisioning_state: Option<String>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
struct JitVirtualMachine {
    id: String,
    #[serde(default)]
    ports: Vec<JitPort>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
struct JitPort {
    number: u16,
    protocol: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    allowed_source_address_prefix: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    allowed_source_address_prefixes: Option<Vec<String>>,
    max_request_access_duration: String,
}

impl JitPort {
    fn into_domain(self) -> AppResult<JitPortRule> {
        let protocol: PortProtocol = self.protocol.parse().map_err(|_| {
            AppError::Provider(format!(
                "port {} has unknown protocol '{}'",
                self.number, self.protocol
            ))
        })?;

        let mut prefixes: Vec<String> = Vec::new();
        for prefix in self
            .allowed_source_address_prefix
            .into_iter()
            .chain(self.allowed_source_address_prefixes.unwrap_or_default())
        {
            if !prefixes.contains(&prefix) {
                prefixes.push(prefix);
            }
        }

        Ok(JitPortRule {
            number: self.number,
            protocol,
            allowed_source_prefixes: prefixes,
            max_request_access_duration: self.max_request_access_duration,
        })
    }

    fn from_domain(rule: &JitPortRule) -> Self {
        let (single, many) = match rule.allowed_source_prefixes.as_slice() {
            [only] => (Some(only.clone()), None),
            prefixes => (None, Some(prefixes.to_vec())),
        };

        Self {
            number: rule.number,
            protocol: rule.protocol.as_str().to_owned(),
            allowed_source_address_prefix: single,
            allowed_source_address_prefixes: many,
            max_request_access_duration: rule.max_request_access_duration.clone(),
        }
    }
}

fn location_from_id(id: &str) -> Option<String> {
    let mut segments = id.split('/');
    while let Some(segment) = segments.next() {
        if segment.eq_ignore_ascii_case("locations") {
            return segments.next().map(ToOwned::to_owned);
        }
    }
    None
}

impl JitPolicyResource {
    fn into_domain(self, resource_group: &ResourceGroupName) -> AppResult<JitPolicy> {
        let location = self
            .location
            .filter(|location| !location.is_empty())
            .or_else(|| self.id.as_deref().and_then(location_from_id))
            .unwrap_or_default();

        let mut entries = Vec::with_capacity(self.properties.virtual_machines.len());
        for virtual_machine in self.properties.virtual_machines {
            let ports = virtual_machine
                .ports
                .into_iter()
                .map(JitPort::into_domain)
                .collect::<AppResult<Vec<_>>>()?;
            entries.push(VirtualMachinePolicyEntry {
                vm_resource_id: virtual_machine.id,
                ports,
                provider_properties: virtual_machine.extra,
            });
        }

        Ok(JitPolicy {
            name: self.name.unwrap_or_default(),
            resource_group: resource_group.clone(),
            location,
            kind: self.kind,
            provisioning_state: self.properties.provisioning_state,
            virtual_machine_entries: entries,
            provider_properties: self.properties.extra,
        })
    }

    fn from_domain(policy: &JitPolicy) -> Self {
        Self {
            id: None,
            name: None,
            location: None,
            kind: policy.kind.clone(),
            properties: JitPolicyProperties {
                virtual_machines: policy
                    .virtual_machine_entries
                    .iter()
                    .map(|entry| JitVirtualMachine {
                        id: entry.vm_resource_id.clone(),
                        ports: entry.ports.iter().map(JitPort::from_domain).collect(),
                        extra: entry.provider_properties.clone(),
                    })
                    .collect(),
                provisioning_state: None,
                extra: policy.provider_properties.clone(),
            },
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InitiateBody {
    virtual_machines: Vec<InitiateVirtualMachine>,
    #[serde(skip_serializing_if = "Option::is_none")]
    justification: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InitiateVirtualMachine {
    id: String,
    ports: Vec<InitiatePort>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InitiatePort {
    number: u16,
    allowed_source_address_prefix: String,
    end_time_utc: DateTime<Utc>,
}

impl InitiateBody {
    fn from_request(request: &JitActivationRequest) -> Self {
        Self {
            virtual_machines: vec![InitiateVirtualMachine {
                id: request.vm_resource_id.clone(),
                ports: request
                    .ports
                    .iter()
                    .map(|port| InitiatePort {
                        number: port.number,
                        allowed_source_address_prefix: port.allowed_source_prefix.clone(),
                        end_time_utc: port.access_window_end,
                    })
                    .collect(),
            }],
            justification: request.justification.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SecurityLocation {
    name: String,
}

fn to_body<T: Serialize>(value: &T) -> AppResult<Value> {
    serde_json::to_value(value)
        .map_err(|error| AppError::Internal(format!("failed to encode ARM request: {error}")))
}

/// JIT access provider backed by `Microsoft.Security`.
#[derive(Clone)]
pub struct ArmSecurityProvider {
    client: ArmClient,
}

impl ArmSecurityProvider {
    /// Creates a security provider over an ARM client.
    #[must_use]
    pub fn new(client: ArmClient) -> Self {
        Self { client }
    }

    fn policy_url(
        &self,
        resource_group: &ResourceGroupName,
        location: &str,
        policy_name: &str,
        trailing: &[&str],
    ) -> AppResult<url::Url> {
        let mut segments = vec![
            "resourceGroups",
            resource_group.as_str(),
            "providers",
            "Microsoft.Security",
            "locations",
            location,
            "jitNetworkAccessPolicies",
            policy_name,
        ];
        segments.extend_from_slice(trailing);
        self.client.subscription_url(&segments, JIT_API_VERSION)
    }
}

#[async_trait]
impl JitPolicyProvider for ArmSecurityProvider {
    async fn list_policies(&self, resource_group: &ResourceGroupName) -> AppResult<Vec<JitPolicy>> {
        let url = self.client.subscription_url(
            &[
                "resourceGroups",
                resource_group.as_str(),
                "providers",
                "Microsoft.Security",
                "jitNetworkAccessPolicies",
            ],
            JIT_API_VERSION,
        )?;
        let resources: Vec<JitPolicyResource> = self.client.list_all(url).await?;

        resources
            .into_iter()
            .map(|resource| resource.into_domain(resource_group))
            .collect()
    }

    async fn get_policy(
        &self,
        resource_group: &ResourceGroupName,
        location: &str,
        policy_name: &str,
    ) -> AppResult<Option<JitPolicy>> {
        let url = self.policy_url(resource_group, location, policy_name, &[])?;
        let resource: Option<JitPolicyResource> = self.client.get_optional(url).await?;

        resource
            .map(|resource| resource.into_domain(resource_group))
            .transpose()
    }

    async fn create_or_update_policy(&self, policy: &JitPolicy) -> AppResult<JitPolicy> {
        let url = self.policy_url(&policy.resource_group, &policy.location, &policy.name, &[])?;
        let body = to_body(&JitPolicyResource::from_domain(policy))?;
        let stored: JitPolicyResource = self
            .client
            .execute_json(Method::PUT, url, Some(&body))
            .await?;

        let mut stored = stored.into_domain(&policy.resource_group)?;
        if stored.name.is_empty() {
            stored.name.clone_from(&policy.name);
        }
        if stored.location.is_empty() {
            stored.location.clone_from(&policy.location);
        }
        Ok(stored)
    }

    async fn initiate(
        &self,
        resource_group: &ResourceGroupName,
        location: &str,
        policy_name: &str,
        request: &JitActivationRequest,
    ) -> AppResult<()> {
        let url = self.policy_url(resource_group, location, policy_name, &["initiate"])?;
        let body = to_body(&InitiateBody::from_request(request))?;
        self.client.execute(Method::POST, url, Some(&body)).await
    }

    async fn delete_policy(
        &self,
        resource_group: &ResourceGroupName,
        location: &str,
        policy_name: &str,
    ) -> AppResult<()> {
        let url = self.policy_url(resource_group, location, policy_name, &[])?;
        self.client.execute(Method::DELETE, url, None).await
    }

    async fn list_locations(&self) -> AppResult<Vec<String>> {
        let url = self.client.subscription_url(
            &["providers", "Microsoft.Security", "locations"],
            LOCATIONS_API_VERSION,
        )?;
        let locations: Vec<SecurityLocation> = self.client.list_all(url).await?;

        Ok(locations.into_iter().map(|location| location.name).collect())
    }
}

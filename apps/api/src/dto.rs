use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use vmwarden_application::{
    FleetEnforcementReport, GroupEnforcement, GroupEnforcementStatus, JitActivation,
};
use vmwarden_core::{AppError, AppResult, ResourceGroupName};
use vmwarden_domain::{
    AccessPort, JitPolicy, NameSelector, OperationOutcome, OperationStatus,
    VirtualMachinePolicyEntry, VirtualMachineRef,
};

/// `?g=` query.
#[derive(Debug, Default, Deserialize)]
pub struct ResourceGroupQuery {
    pub g: Option<String>,
}

/// Query of the VM fan-out endpoints.
#[derive(Debug, Default, Deserialize)]
pub struct FanOutQuery {
    pub g: Option<String>,
    pub vms: Option<String>,
    pub nowait: Option<String>,
}

/// Query of the per-group disk tier endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct DiskSkuQuery {
    pub g: Option<String>,
    pub vms: Option<String>,
    pub sku: Option<String>,
    pub nowait: Option<String>,
}

/// Query of the fleet-wide disk tier endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct FleetDiskSkuQuery {
    pub sku: Option<String>,
}

/// Query naming one policy.
#[derive(Debug, Default, Deserialize)]
pub struct PolicyQuery {
    pub g: Option<String>,
    #[serde(rename = "policyName", alias = "jitPolicy")]
    pub policy_name: Option<String>,
}

/// Query of the activation endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct InitiateAccessQuery {
    pub g: Option<String>,
    pub vm: Option<String>,
    #[serde(rename = "policyName", alias = "jitPolicy")]
    pub policy_name: Option<String>,
    pub duration: Option<String>,
    pub justification: Option<String>,
}

/// Query of the create-or-update endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct SavePolicyQuery {
    pub g: Option<String>,
    pub vm: Option<String>,
    #[serde(rename = "policyName", alias = "jitPolicy")]
    pub policy_name: Option<String>,
    pub ports: Option<String>,
    #[serde(rename = "maxDuration")]
    pub max_duration: Option<String>,
    pub sources: Option<String>,
    pub protocol: Option<String>,
}

/// Parses the mandatory `g` parameter.
pub fn resource_group_param(value: Option<&str>) -> AppResult<ResourceGroupName> {
    match value.map(str::trim) {
        Some(value) if !value.is_empty() => ResourceGroupName::new(value),
        _ => Err(AppError::Validation(
            "query parameter 'g' (resource group) is required".to_owned(),
        )),
    }
}

/// Parses a mandatory, non-empty string parameter.
pub fn required_param(value: Option<&str>, name: &str) -> AppResult<String> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToOwned::to_owned)
        .ok_or_else(|| AppError::Validation(format!("query parameter '{name}' is required")))
}

/// Turns `vms` into a selector; absence selects every VM.
#[must_use]
pub fn selector_param(value: Option<&str>) -> NameSelector {
    NameSelector::parse(value)
}

/// `nowait` only needs to be present.
#[must_use]
pub fn wait_param(nowait: Option<&str>) -> bool {
    nowait.is_none()
}

/// Parses a comma list of port numbers.
pub fn ports_param(value: &str) -> AppResult<Vec<u16>> {
    value
        .split(',')
        .map(str::trim)
        .filter(|port| !port.is_empty())
        .map(|port| {
            port.parse::<u16>()
                .map_err(|_| AppError::Validation(format!("invalid port number '{port}'")))
        })
        .collect()
}

/// Parses an hour count, falling back to `default` when absent or blank.
pub fn hours_param(value: Option<&str>, name: &str, default: u32) -> AppResult<u32> {
    match value.map(str::trim).filter(|value| !value.is_empty()) {
        Some(value) => value.parse::<u32>().map_err(|_| {
            AppError::Validation(format!(
                "query parameter '{name}' must be a whole number of hours, got '{value}'"
            ))
        }),
        None => Ok(default),
    }
}

/// Parses a comma list of source prefixes.
#[must_use]
pub fn sources_param(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|prefix| !prefix.is_empty())
        .map(ToOwned::to_owned)
        .collect()
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// VM listing projection.
#[derive(Debug, Serialize)]
pub struct VirtualMachineResponse {
    pub id: String,
    pub name: String,
    pub vm_size: Option<String>,
    pub os_disk_size_gb: Option<u32>,
    pub location: String,
}

impl From<VirtualMachineRef> for VirtualMachineResponse {
    fn from(value: VirtualMachineRef) -> Self {
        Self {
            id: value.id,
            name: value.name,
            vm_size: value.vm_size,
            os_disk_size_gb: value.os_disk_size_gb,
            location: value.location,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct OperationOutcomeResponse {
    pub vm_name: String,
    pub resource_group: String,
    pub operation: &'static str,
    pub status: OperationStatus,
    pub waited_until_completion: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<OperationOutcome> for OperationOutcomeResponse {
    fn from(value: OperationOutcome) -> Self {
        Self {
            vm_name: value.subject_name().to_owned(),
            resource_group: value.resource_group().to_owned(),
            operation: value.operation().as_str(),
            status: value.status(),
            waited_until_completion: value.waited_until_completion(),
            error: value.error().map(ToOwned::to_owned),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct GroupEnforcementResponse {
    pub resource_group: String,
    pub status: GroupEnforcementStatus,
    pub outcomes: Vec<OperationOutcomeResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<GroupEnforcement> for GroupEnforcementResponse {
    fn from(value: GroupEnforcement) -> Self {
        Self {
            resource_group: value.resource_group,
            status: value.status,
            outcomes: value.outcomes.into_iter().map(Into::into).collect(),
            error: value.error,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct FleetEnforcementResponse {
    pub sku: String,
    pub failed_groups: usize,
    pub failed_operations: usize,
    pub groups: Vec<GroupEnforcementResponse>,
}

impl From<FleetEnforcementReport> for FleetEnforcementResponse {
    fn from(value: FleetEnforcementReport) -> Self {
        Self {
            sku: value.sku.to_string(),
            failed_groups: value.failed_groups(),
            failed_operations: value.failed_operations(),
            groups: value.groups.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct JitPolicyResponse {
    pub name: String,
    pub resource_group: String,
    pub location: String,
    pub kind: Option<String>,
    pub provisioning_state: Option<String>,
    pub virtual_machines: Vec<VirtualMachinePolicyEntry>,
}

impl From<JitPolicy> for JitPolicyResponse {
    fn from(value: JitPolicy) -> Self {
        Self {
            name: value.name,
            resource_group: value.resource_group.to_string(),
            location: value.location,
            kind: value.kind,
            provisioning_state: value.provisioning_state,
            virtual_machines: value.virtual_machine_entries,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct JitActivationResponse {
    pub policy_name: String,
    pub location: String,
    pub vm_resource_id: String,
    pub access_window_end: DateTime<Utc>,
    pub ports: Vec<AccessPort>,
}

impl From<JitActivation> for JitActivationResponse {
    fn from(value: JitActivation) -> Self {
        Self {
            policy_name: value.policy_name,
            location: value.location,
            vm_resource_id: value.request.vm_resource_id,
            access_window_end: value.access_window_end,
            ports: value.request.ports,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DeletePolicyResponse {
    pub deleted: bool,
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use vmwarden_core::AppError;

    use super::{hours_param, ports_param, resource_group_param, sources_param, wait_param};

    #[test]
    fn missing_resource_group_is_a_validation_error() {
        assert!(matches!(
            resource_group_param(None),
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            resource_group_param(Some("  ")),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn nowait_presence_disables_waiting() {
        assert!(wait_param(None));
        assert!(!wait_param(Some("")));
    }

    #[test]
    fn hours_fall_back_to_the_default_and_reject_text() {
        assert_eq!(hours_param(None, "duration", 3).unwrap_or_default(), 3);
        assert_eq!(hours_param(Some(" "), "duration", 3).unwrap_or_default(), 3);
        assert_eq!(hours_param(Some("5"), "duration", 3).unwrap_or_default(), 5);
        assert!(matches!(
            hours_param(Some("abc"), "duration", 3),
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            hours_param(Some("-1"), "maxDuration", 3),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn invalid_ports_are_rejected() {
        assert!(ports_param("22,ssh").is_err());
        assert!(ports_param("70000").is_err());
    }

    #[test]
    fn sources_skip_blank_items() {
        assert_eq!(
            sources_param("10.0.0.0/8, ,*"),
            vec!["10.0.0.0/8".to_owned(), "*".to_owned()]
        );
    }

    proptest! {
        #[test]
        fn port_lists_parse_in_order(ports in proptest::collection::vec(1_u16.., 1..6)) {
            let raw = ports
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(",");
            prop_assert_eq!(ports_param(raw.as_str()).unwrap_or_default(), ports);
        }
    }
}

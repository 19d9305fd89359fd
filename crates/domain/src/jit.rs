use std::net::IpAddr;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use ipnet::IpNet;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use vmwarden_core::{AppError, AppResult, ResourceGroupName};

/// Source prefix that allows traffic from any address.
pub const ANY_SOURCE_PREFIX: &str = "*";

/// Policy kind assigned to policies created by this service.
pub const BASIC_POLICY_KIND: &str = "Basic";

/// Longest access window a port rule or activation may request.
pub const MAX_ACCESS_DURATION_HOURS: u32 = 24;

/// Transport protocol a port rule applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum PortProtocol {
    /// TCP only.
    Tcp,
    /// UDP only.
    Udp,
    /// Any protocol.
    Any,
}

impl PortProtocol {
    /// Returns the provider wire value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tcp => "TCP",
            Self::Udp => "UDP",
            Self::Any => "*",
        }
    }
}

impl FromStr for PortProtocol {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "*" => Ok(Self::Any),
            other if other.eq_ignore_ascii_case("tcp") => Ok(Self::Tcp),
            other if other.eq_ignore_ascii_case("udp") => Ok(Self::Udp),
            other => Err(AppError::Validation(format!(
                "unknown port protocol '{other}'"
            ))),
        }
    }
}

impl TryFrom<String> for PortProtocol {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_str(value.as_str())
    }
}

impl From<PortProtocol> for String {
    fn from(value: PortProtocol) -> Self {
        value.as_str().to_owned()
    }
}

/// Validates one allowed source prefix: `*`, a CIDR block, or a bare IP address.
pub fn validate_source_prefix(value: &str) -> AppResult<()> {
    let value = value.trim();
    if value == ANY_SOURCE_PREFIX
        || value.parse::<IpNet>().is_ok()
        || value.parse::<IpAddr>().is_ok()
    {
        return Ok(());
    }

    Err(AppError::Validation(format!(
        "allowed source prefix '{value}' must be '*', a CIDR block, or an IP address"
    )))
}

/// Steady-state port rule inside one VM's policy entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JitPortRule {
    /// Port number.
    pub number: u16,
    /// Transport protocol.
    pub protocol: PortProtocol,
    /// Ordered, de-duplicated allowed source prefixes.
    pub allowed_source_prefixes: Vec<String>,
    /// Longest window an activation may open, as an ISO-8601 duration.
    pub max_request_access_duration: String,
}

impl JitPortRule {
    /// Creates a validated port rule.
    pub fn new(
        number: u16,
        protocol: PortProtocol,
        allowed_source_prefixes: Vec<String>,
        max_access_hours: u32,
    ) -> AppResult<Self> {
        if number == 0 {
            return Err(AppError::Validation(
                "port number must be greater than zero".to_owned(),
            ));
        }

        validate_access_hours(max_access_hours)?;

        let mut prefixes: Vec<String> = Vec::with_capacity(allowed_source_prefixes.len());
        for prefix in allowed_source_prefixes {
            let prefix = prefix.trim().to_owned();
            validate_source_prefix(prefix.as_str())?;
            if !prefixes.contains(&prefix) {
                prefixes.push(prefix);
            }
        }

        if prefixes.is_empty() {
            return Err(AppError::Validation(format!(
                "port {number} requires at least one allowed source prefix"
            )));
        }

        Ok(Self {
            number,
            protocol,
            allowed_source_prefixes: prefixes,
            max_request_access_duration: format!("PT{max_access_hours}H"),
        })
    }
}

/// Validates an access duration expressed in whole hours.
pub fn validate_access_hours(hours: u32) -> AppResult<()> {
    if hours == 0 || hours > MAX_ACCESS_DURATION_HOURS {
        return Err(AppError::Validation(format!(
            "access duration must be between 1 and {MAX_ACCESS_DURATION_HOURS} hours, got {hours}"
        )));
    }

    Ok(())
}

/// One VM's membership in a JIT policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VirtualMachinePolicyEntry {
    /// Provider resource id of the VM.
    pub vm_resource_id: String,
    /// Port rules for the VM.
    pub ports: Vec<JitPortRule>,
    /// Provider fields this service does not interpret, such as `publicIpAddress`.
    ///
    /// Carried through read-modify-write so a save never drops them.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub provider_properties: Map<String, Value>,
}

impl VirtualMachinePolicyEntry {
    /// Creates an entry with no provider-owned fields.
    #[must_use]
    pub fn new(vm_resource_id: impl Into<String>, ports: Vec<JitPortRule>) -> Self {
        Self {
            vm_resource_id: vm_resource_id.into(),
            ports,
            provider_properties: Map::new(),
        }
    }

    /// Returns whether this entry belongs to the given VM resource id.
    #[must_use]
    pub fn matches_vm(&self, vm_resource_id: &str) -> bool {
        self.vm_resource_id.eq_ignore_ascii_case(vm_resource_id)
    }
}

/// How an existing entry changed during an upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryChange {
    /// The VM had no entry and one was appended.
    Added,
    /// The VM's port list was replaced.
    Replaced,
}

/// Just-in-time network access policy document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JitPolicy {
    /// Policy name, unique per resource group.
    pub name: String,
    /// Owning resource group.
    pub resource_group: ResourceGroupName,
    /// Region the policy lives in; must equal every referenced VM's location.
    pub location: String,
    /// Provider policy kind.
    pub kind: Option<String>,
    /// Provider provisioning state, when reported.
    pub provisioning_state: Option<String>,
    /// VM entries, at most one per VM.
    pub virtual_machine_entries: Vec<VirtualMachinePolicyEntry>,
    /// Provider policy properties this service does not interpret, such as `requests`.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub provider_properties: Map<String, Value>,
}

impl JitPolicy {
    /// Starts an empty in-memory policy that has not been persisted yet.
    #[must_use]
    pub fn new_basic(
        name: impl Into<String>,
        resource_group: ResourceGroupName,
        location: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            resource_group,
            location: location.into(),
            kind: Some(BASIC_POLICY_KIND.to_owned()),
            provisioning_state: None,
            virtual_machine_entries: Vec::new(),
            provider_properties: Map::new(),
        }
    }

    /// Finds the entry of a VM by case-insensitive resource id.
    #[must_use]
    pub fn find_entry(&self, vm_resource_id: &str) -> Option<&VirtualMachinePolicyEntry> {
        self.virtual_machine_entries
            .iter()
            .find(|entry| entry.matches_vm(vm_resource_id))
    }

    /// Appends the entry, or replaces the existing entry's whole port list.
    ///
    /// Other VMs' entries are left untouched and ports are never merged. A
    /// replaced entry keeps its provider-owned fields.
    pub fn upsert_entry(&mut self, entry: VirtualMachinePolicyEntry) -> EntryChange {
        match self
            .virtual_machine_entries
            .iter_mut()
            .find(|existing| existing.matches_vm(entry.vm_resource_id.as_str()))
        {
            Some(existing) => {
                existing.ports = entry.ports;
                EntryChange::Replaced
            }
            None => {
                self.virtual_machine_entries.push(entry);
                EntryChange::Added
            }
        }
    }
}

/// How steady-state source prefixes are carried into an activation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrefixPropagation {
    /// One activation port per configured prefix.
    #[default]
    All,
    /// Only the first configured prefix per port (legacy behaviour).
    FirstOnly,
}

impl FromStr for PrefixPropagation {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "all" => Ok(Self::All),
            "first" | "first_only" => Ok(Self::FirstOnly),
            other => Err(AppError::Validation(format!(
                "prefix propagation must be 'all' or 'first', got '{other}'"
            ))),
        }
    }
}

/// Port opened by one activation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessPort {
    /// Port number.
    pub number: u16,
    /// Source prefix allowed during the window.
    pub allowed_source_prefix: String,
    /// Instant the window closes.
    pub access_window_end: DateTime<Utc>,
}

/// Time-boxed access request for one VM.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JitActivationRequest {
    /// Provider resource id of the VM.
    pub vm_resource_id: String,
    /// Ports to open.
    pub ports: Vec<AccessPort>,
    /// Optional justification recorded by the provider.
    pub justification: Option<String>,
}

impl JitActivationRequest {
    /// Builds an activation from a steady-state entry with a fresh window end.
    ///
    /// Windows are never extended from a previous activation.
    pub fn from_entry(
        entry: &VirtualMachinePolicyEntry,
        access_window_end: DateTime<Utc>,
        propagation: PrefixPropagation,
    ) -> AppResult<Self> {
        let mut ports = Vec::new();
        for rule in &entry.ports {
            let prefixes: Vec<&String> = match propagation {
                PrefixPropagation::All => rule.allowed_source_prefixes.iter().collect(),
                PrefixPropagation::FirstOnly => {
                    rule.allowed_source_prefixes.iter().take(1).collect()
                }
            };

            if prefixes.is_empty() {
                return Err(AppError::Validation(format!(
                    "port {} of '{}' has no allowed source prefix",
                    rule.number, entry.vm_resource_id
                )));
            }

            ports.extend(prefixes.into_iter().map(|prefix| AccessPort {
                number: rule.number,
                allowed_source_prefix: prefix.clone(),
                access_window_end,
            }));
        }

        Ok(Self {
            vm_resource_id: entry.vm_resource_id.clone(),
            ports,
            justification: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use vmwarden_core::ResourceGroupName;

    use super::{
        EntryChange, JitActivationRequest, JitPolicy, JitPortRule, PortProtocol,
        PrefixPropagation, VirtualMachinePolicyEntry, validate_source_prefix,
    };

    fn rule(number: u16, prefixes: &[&str]) -> JitPortRule {
        JitPortRule {
            number,
            protocol: PortProtocol::Any,
            allowed_source_prefixes: prefixes.iter().map(|value| (*value).to_owned()).collect(),
            max_request_access_duration: "PT3H".to_owned(),
        }
    }

    fn policy() -> Option<JitPolicy> {
        let resource_group = ResourceGroupName::new("rg").ok()?;
        Some(JitPolicy::new_basic("default", resource_group, "westeurope"))
    }

    #[test]
    fn source_prefix_accepts_wildcard_cidr_and_address() {
        assert!(validate_source_prefix("*").is_ok());
        assert!(validate_source_prefix("10.0.0.0/24").is_ok());
        assert!(validate_source_prefix("203.0.113.7").is_ok());
        assert!(validate_source_prefix("2001:db8::/32").is_ok());
        assert!(validate_source_prefix("office").is_err());
    }

    #[test]
    fn port_rule_deduplicates_prefixes_in_order() {
        let rule = JitPortRule::new(
            22,
            PortProtocol::Tcp,
            vec![
                "10.0.0.1".to_owned(),
                "*".to_owned(),
                " 10.0.0.1 ".to_owned(),
            ],
            3,
        );

        let Ok(rule) = rule else {
            panic!("expected a valid port rule");
        };
        assert_eq!(rule.allowed_source_prefixes, vec!["10.0.0.1", "*"]);
        assert_eq!(rule.max_request_access_duration, "PT3H");
    }

    #[test]
    fn port_rule_rejects_out_of_range_duration() {
        assert!(JitPortRule::new(22, PortProtocol::Tcp, vec!["*".to_owned()], 0).is_err());
        assert!(JitPortRule::new(22, PortProtocol::Tcp, vec!["*".to_owned()], 25).is_err());
    }

    #[test]
    fn upsert_replaces_ports_of_matching_vm_case_insensitively() {
        let Some(mut policy) = policy() else {
            panic!("expected a valid policy");
        };
        policy.upsert_entry(VirtualMachinePolicyEntry::new(
            "/subscriptions/s/vm-x",
            vec![rule(80, &["*"])],
        ));
        policy.upsert_entry(VirtualMachinePolicyEntry::new(
            "/subscriptions/s/vm-y",
            vec![rule(22, &["*"])],
        ));

        let change = policy.upsert_entry(VirtualMachinePolicyEntry::new(
            "/SUBSCRIPTIONS/S/VM-X",
            vec![rule(443, &["10.0.0.0/8"])],
        ));

        assert_eq!(change, EntryChange::Replaced);
        assert_eq!(policy.virtual_machine_entries.len(), 2);
        assert_eq!(
            policy
                .find_entry("/subscriptions/s/vm-x")
                .map(|entry| entry.ports.clone()),
            Some(vec![rule(443, &["10.0.0.0/8"])])
        );
        assert_eq!(
            policy
                .find_entry("/subscriptions/s/vm-y")
                .map(|entry| entry.ports.clone()),
            Some(vec![rule(22, &["*"])])
        );
    }

    #[test]
    fn replaced_entry_keeps_provider_properties() {
        let Some(mut policy) = policy() else {
            panic!("expected a valid policy");
        };
        let mut existing = VirtualMachinePolicyEntry::new("vm-x", vec![rule(22, &["*"])]);
        existing.provider_properties.insert(
            "publicIpAddress".to_owned(),
            serde_json::Value::String("ip-x".to_owned()),
        );
        policy.upsert_entry(existing);

        policy.upsert_entry(VirtualMachinePolicyEntry::new("VM-X", vec![rule(443, &["*"])]));

        let entry = policy.find_entry("vm-x");
        assert_eq!(
            entry.and_then(|entry| entry.provider_properties.get("publicIpAddress")),
            Some(&serde_json::Value::String("ip-x".to_owned()))
        );
        assert_eq!(entry.map(|entry| entry.ports.len()), Some(1));
    }

    #[test]
    fn activation_propagates_every_prefix_by_default() {
        let entry = VirtualMachinePolicyEntry::new(
            "vm-x",
            vec![rule(22, &["10.0.0.1", "10.0.0.2"]), rule(3389, &["*"])],
        );
        let window_end = Utc::now() + Duration::hours(2);

        let request =
            JitActivationRequest::from_entry(&entry, window_end, PrefixPropagation::default());

        let Ok(request) = request else {
            panic!("expected an activation request");
        };
        let opened: Vec<(u16, &str)> = request
            .ports
            .iter()
            .map(|port| (port.number, port.allowed_source_prefix.as_str()))
            .collect();
        assert_eq!(
            opened,
            vec![(22, "10.0.0.1"), (22, "10.0.0.2"), (3389, "*")]
        );
        assert!(request.ports.iter().all(|port| port.access_window_end == window_end));
    }

    #[test]
    fn legacy_activation_keeps_first_prefix_only() {
        let entry =
            VirtualMachinePolicyEntry::new("vm-x", vec![rule(22, &["10.0.0.1", "10.0.0.2"])]);

        let request = JitActivationRequest::from_entry(
            &entry,
            Utc::now(),
            PrefixPropagation::FirstOnly,
        );

        assert_eq!(request.map(|request| request.ports.len()).unwrap_or(0), 1);
    }

    #[test]
    fn activation_rejects_port_without_prefix() {
        let entry = VirtualMachinePolicyEntry::new("vm-x", vec![rule(22, &[])]);

        let request =
            JitActivationRequest::from_entry(&entry, Utc::now(), PrefixPropagation::All);

        assert!(request.is_err());
    }
}

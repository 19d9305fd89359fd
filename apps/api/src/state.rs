use vmwarden_application::{DiskSkuService, JitPolicyService, VirtualMachineService};
use vmwarden_domain::{ANY_SOURCE_PREFIX, DiskSku};

/// Values applied when a request omits the matching query parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestDefaults {
    pub disk_sku: DiskSku,
    pub policy_name: String,
    pub duration_hours: u32,
    pub allowed_source_prefixes: Vec<String>,
}

impl Default for RequestDefaults {
    fn default() -> Self {
        Self {
            disk_sku: DiskSku::default(),
            policy_name: "default".to_owned(),
            duration_hours: 3,
            allowed_source_prefixes: vec![ANY_SOURCE_PREFIX.to_owned()],
        }
    }
}

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub virtual_machine_service: VirtualMachineService,
    pub disk_sku_service: DiskSkuService,
    pub jit_policy_service: JitPolicyService,
    pub defaults: RequestDefaults,
    pub access_key: Option<String>,
}

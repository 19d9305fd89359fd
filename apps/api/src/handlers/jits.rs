use std::str::FromStr;

use axum::Json;
use axum::extract::{Query, State};
use vmwarden_application::InitiateAccessInput;
use vmwarden_core::AppError;
use vmwarden_domain::{JitPortRule, PortProtocol};

use crate::dto::{
    DeletePolicyResponse, InitiateAccessQuery, JitActivationResponse, JitPolicyResponse,
    PolicyQuery, ResourceGroupQuery, SavePolicyQuery, hours_param, ports_param, required_param,
    resource_group_param, sources_param,
};
use crate::error::ApiResult;
use crate::state::AppState;

pub async fn list_policies_handler(
    State(state): State<AppState>,
    Query(query): Query<ResourceGroupQuery>,
) -> ApiResult<Json<Vec<JitPolicyResponse>>> {
    let resource_group = resource_group_param(query.g.as_deref())?;

    let policies = state
        .jit_policy_service
        .list_policies(&resource_group)
        .await?
        .into_iter()
        .map(JitPolicyResponse::from)
        .collect();

    Ok(Json(policies))
}

pub async fn get_policy_handler(
    State(state): State<AppState>,
    Query(query): Query<PolicyQuery>,
) -> ApiResult<Json<JitPolicyResponse>> {
    let resource_group = resource_group_param(query.g.as_deref())?;
    let policy_name = policy_name_param(&state, query.policy_name);

    let policy = state
        .jit_policy_service
        .get_policy(&resource_group, policy_name.as_str())
        .await?
        .ok_or_else(|| {
            AppError::NotFound(format!(
                "jit policy '{policy_name}' does not exist in resource group '{resource_group}'"
            ))
        })?;

    Ok(Json(JitPolicyResponse::from(policy)))
}

pub async fn initiate_access_handler(
    State(state): State<AppState>,
    Query(query): Query<InitiateAccessQuery>,
) -> ApiResult<Json<JitActivationResponse>> {
    let resource_group = resource_group_param(query.g.as_deref())?;
    let vm_name = required_param(query.vm.as_deref(), "vm")?;
    let policy_name = policy_name_param(&state, query.policy_name);
    let duration_hours = hours_param(
        query.duration.as_deref(),
        "duration",
        state.defaults.duration_hours,
    )?;

    let activation = state
        .jit_policy_service
        .initiate(InitiateAccessInput {
            resource_group,
            policy_name,
            vm_name,
            duration_hours,
            justification: query.justification.filter(|value| !value.trim().is_empty()),
        })
        .await?;

    Ok(Json(JitActivationResponse::from(activation)))
}

pub async fn save_policy_handler(
    State(state): State<AppState>,
    Query(query): Query<SavePolicyQuery>,
) -> ApiResult<Json<JitPolicyResponse>> {
    let resource_group = resource_group_param(query.g.as_deref())?;
    let vm_name = required_param(query.vm.as_deref(), "vm")?;
    let ports = ports_param(required_param(query.ports.as_deref(), "ports")?.as_str())?;
    let protocol = match query.protocol.as_deref() {
        Some(value) => PortProtocol::from_str(value)?,
        None => PortProtocol::Any,
    };
    let sources = query
        .sources
        .as_deref()
        .map(sources_param)
        .filter(|sources| !sources.is_empty())
        .unwrap_or_else(|| state.defaults.allowed_source_prefixes.clone());
    let max_duration = hours_param(
        query.max_duration.as_deref(),
        "maxDuration",
        state.defaults.duration_hours,
    )?;

    let rules = ports
        .into_iter()
        .map(|number| JitPortRule::new(number, protocol, sources.clone(), max_duration))
        .collect::<Result<Vec<_>, _>>()?;

    let policy_name = policy_name_param(&state, query.policy_name);
    let policy = state
        .jit_policy_service
        .save_for_virtual_machine(&resource_group, policy_name.as_str(), &vm_name, rules)
        .await?;

    Ok(Json(JitPolicyResponse::from(policy)))
}

pub async fn delete_policy_handler(
    State(state): State<AppState>,
    Query(query): Query<PolicyQuery>,
) -> ApiResult<Json<DeletePolicyResponse>> {
    let resource_group = resource_group_param(query.g.as_deref())?;
    let policy_name = policy_name_param(&state, query.policy_name);

    let deleted = state
        .jit_policy_service
        .delete(&resource_group, policy_name.as_str())
        .await?;

    Ok(Json(DeletePolicyResponse { deleted }))
}

fn policy_name_param(state: &AppState, value: Option<String>) -> String {
    value
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| state.defaults.policy_name.clone())
}

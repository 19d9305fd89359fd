use std::str::FromStr;

use axum::Json;
use axum::extract::{Query, State};
use vmwarden_domain::DiskSku;

use crate::dto::{
    DiskSkuQuery, FanOutQuery, FleetDiskSkuQuery, FleetEnforcementResponse,
    OperationOutcomeResponse, ResourceGroupQuery, VirtualMachineResponse, resource_group_param,
    selector_param, wait_param,
};
use crate::error::ApiResult;
use crate::state::AppState;

pub async fn list_virtual_machines_handler(
    State(state): State<AppState>,
    Query(query): Query<ResourceGroupQuery>,
) -> ApiResult<Json<Vec<VirtualMachineResponse>>> {
    let resource_group = resource_group_param(query.g.as_deref())?;

    let machines = state
        .virtual_machine_service
        .list(&resource_group)
        .await?
        .into_iter()
        .map(VirtualMachineResponse::from)
        .collect();

    Ok(Json(machines))
}

pub async fn start_virtual_machines_handler(
    State(state): State<AppState>,
    Query(query): Query<FanOutQuery>,
) -> ApiResult<Json<Vec<OperationOutcomeResponse>>> {
    let resource_group = resource_group_param(query.g.as_deref())?;

    let outcomes = state
        .virtual_machine_service
        .start(
            &resource_group,
            &selector_param(query.vms.as_deref()),
            wait_param(query.nowait.as_deref()),
        )
        .await?;

    Ok(Json(outcomes.into_iter().map(Into::into).collect()))
}

pub async fn deallocate_virtual_machines_handler(
    State(state): State<AppState>,
    Query(query): Query<FanOutQuery>,
) -> ApiResult<Json<Vec<OperationOutcomeResponse>>> {
    let resource_group = resource_group_param(query.g.as_deref())?;

    let outcomes = state
        .virtual_machine_service
        .deallocate(
            &resource_group,
            &selector_param(query.vms.as_deref()),
            wait_param(query.nowait.as_deref()),
        )
        .await?;

    Ok(Json(outcomes.into_iter().map(Into::into).collect()))
}

pub async fn set_disk_sku_handler(
    State(state): State<AppState>,
    Query(query): Query<DiskSkuQuery>,
) -> ApiResult<Json<Vec<OperationOutcomeResponse>>> {
    let resource_group = resource_group_param(query.g.as_deref())?;
    let sku = sku_param(query.sku.as_deref(), state.defaults.disk_sku)?;

    let outcomes = state
        .disk_sku_service
        .enforce(
            &resource_group,
            &selector_param(query.vms.as_deref()),
            sku,
            wait_param(query.nowait.as_deref()),
        )
        .await?;

    Ok(Json(outcomes.into_iter().map(Into::into).collect()))
}

pub async fn ensure_disk_sku_handler(
    State(state): State<AppState>,
    Query(query): Query<FleetDiskSkuQuery>,
) -> ApiResult<Json<FleetEnforcementResponse>> {
    let sku = sku_param(query.sku.as_deref(), state.defaults.disk_sku)?;

    let report = state.disk_sku_service.enforce_fleet(sku).await?;

    Ok(Json(FleetEnforcementResponse::from(report)))
}

fn sku_param(value: Option<&str>, default: DiskSku) -> ApiResult<DiskSku> {
    match value.map(str::trim).filter(|value| !value.is_empty()) {
        Some(value) => Ok(DiskSku::from_str(value)?),
        None => Ok(default),
    }
}

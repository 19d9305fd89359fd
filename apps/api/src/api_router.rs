use axum::Router;
use axum::middleware::from_fn_with_state;
use axum::routing::{delete, get, post, put};
use tower_http::trace::TraceLayer;
use vmwarden_core::AppError;

use crate::state::AppState;
use crate::{handlers, middleware};

mod cors;

pub fn build_router(app_state: AppState, cors_origin: Option<&str>) -> Result<Router, AppError> {
    let protected_routes = Router::new()
        .route(
            "/api/vms/list",
            get(handlers::vms::list_virtual_machines_handler),
        )
        .route(
            "/api/vms/start",
            post(handlers::vms::start_virtual_machines_handler),
        )
        .route(
            "/api/vms/deallocate",
            post(handlers::vms::deallocate_virtual_machines_handler),
        )
        .route(
            "/api/vms/setDiskSku",
            post(handlers::vms::set_disk_sku_handler),
        )
        .route(
            "/api/vms/ensureDiskSku",
            post(handlers::vms::ensure_disk_sku_handler),
        )
        .route("/api/jits/list", get(handlers::jits::list_policies_handler))
        .route("/api/jits/get", get(handlers::jits::get_policy_handler))
        .route(
            "/api/jits/initiate",
            post(handlers::jits::initiate_access_handler),
        )
        .route(
            "/api/jits/createOrUpdate",
            put(handlers::jits::save_policy_handler),
        )
        .route(
            "/api/jits/delete",
            delete(handlers::jits::delete_policy_handler),
        )
        .route_layer(from_fn_with_state(
            app_state.clone(),
            middleware::require_access_key,
        ));

    let router = Router::new()
        .route("/health", get(handlers::health::health_handler))
        .merge(protected_routes)
        .layer(TraceLayer::new_for_http());

    let router = match cors_origin {
        Some(origin) => router.layer(cors::build_cors_layer(origin)?),
        None => router,
    };

    Ok(router.with_state(app_state))
}

//! Route configuration for the provisioning API.

use std::sync::Arc;

use axum::routing::{get, post, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use wgmesh_provision::ProvisionService;
use wgmesh_runtime::RuntimeAdapter;

use crate::handlers::{
    apply_peers, audit, deploy, generate, health, interface_details, list_interfaces, reconcile,
    toggle_interface,
};

/// Shared application state.
pub struct AppState<R> {
    /// The provisioning service.
    pub service: ProvisionService<R>,
}

impl<R> AppState<R> {
    /// Wraps a service for the router.
    pub fn new(service: ProvisionService<R>) -> Self {
        Self { service }
    }
}

/// Create the provisioning API router.
pub fn create_router<R>(state: Arc<AppState<R>>) -> Router
where
    R: RuntimeAdapter + 'static,
{
    let api_routes = Router::new()
        .route("/health", get(health::<R>))
        .route("/interfaces", get(list_interfaces::<R>))
        .route("/interface/{name}", get(interface_details::<R>))
        .route("/interface/{name}/peers/apply", post(apply_peers::<R>))
        .route("/interface/{name}/toggle", post(toggle_interface::<R>))
        .route("/interface/{name}/reconcile", post(reconcile::<R>))
        .route("/interface/{name}/audit", get(audit::<R>))
        .route("/generate", post(generate::<R>))
        .route("/deploy", post(deploy::<R>));

    Router::new()
        .nest("/api", api_routes)
        .with_state(state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

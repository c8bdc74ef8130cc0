//! HTTP request handlers.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;
use wgmesh_provision::{
    ApplyRequest, Deployment, ReconcileRequest, ToggleRequest,
};
use wgmesh_runtime::RuntimeAdapter;
use wgmesh_state::Peer;
use wgmesh_topology::{
    archive, node_deployment, psk_book_for, resolve, synthesize, MeshSpec,
};

use crate::error::ApiResult;
use crate::routes::AppState;

/// Success envelope.
#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    /// Always true here; failures go through [`ApiError`].
    pub ok: bool,
    /// The payload.
    pub data: T,
}

fn envelope<T: Serialize>(data: T) -> Json<Envelope<T>> {
    Json(Envelope { ok: true, data })
}

/// Query parameters for audit paging.
#[derive(Debug, Deserialize)]
pub struct AuditQuery {
    /// Page size (default 50).
    pub limit: Option<usize>,
    /// Resume after this entry id.
    pub cursor: Option<u64>,
}

/// `POST /api/deploy` body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployBody {
    /// The mesh to resolve.
    pub payload: MeshSpec,
    /// Which node of the mesh this host is.
    pub node_name: String,
}

/// Handle `GET /api/health`.
pub async fn health<R: RuntimeAdapter>(
    State(state): State<Arc<AppState<R>>>,
) -> impl IntoResponse {
    let host = state.service.runtime().host_info().await;
    envelope(json!({"status": "ok", "host": host}))
}

/// Handle `GET /api/interfaces`.
pub async fn list_interfaces<R: RuntimeAdapter>(
    State(state): State<Arc<AppState<R>>>,
) -> ApiResult<Response> {
    let interfaces = state.service.list_interfaces().await?;
    Ok(envelope(json!({ "interfaces": interfaces })).into_response())
}

/// Handle `GET /api/interface/{name}`.
pub async fn interface_details<R: RuntimeAdapter>(
    State(state): State<Arc<AppState<R>>>,
    Path(name): Path<String>,
) -> ApiResult<Response> {
    let details = state.service.interface_details(&name).await?;
    Ok(envelope(details).into_response())
}

/// Handle `POST /api/interface/{name}/peers/apply`.
pub async fn apply_peers<R: RuntimeAdapter>(
    State(state): State<Arc<AppState<R>>>,
    Path(name): Path<String>,
    Json(request): Json<ApplyRequest>,
) -> ApiResult<Response> {
    let response = state.service.apply_peer_operations(&name, request).await?;
    Ok(envelope(response).into_response())
}

/// Handle `POST /api/interface/{name}/toggle`.
pub async fn toggle_interface<R: RuntimeAdapter>(
    State(state): State<Arc<AppState<R>>>,
    Path(name): Path<String>,
    Json(request): Json<ToggleRequest>,
) -> ApiResult<Response> {
    let details = state.service.toggle_interface(&name, request).await?;
    Ok(envelope(details).into_response())
}

/// Handle `POST /api/interface/{name}/reconcile`.
pub async fn reconcile<R: RuntimeAdapter>(
    State(state): State<Arc<AppState<R>>>,
    Path(name): Path<String>,
    Json(request): Json<ReconcileRequest>,
) -> ApiResult<Response> {
    let result = state.service.reconcile(&name, request).await?;
    Ok(envelope(result).into_response())
}

/// Handle `GET /api/interface/{name}/audit`.
pub async fn audit<R: RuntimeAdapter>(
    State(state): State<Arc<AppState<R>>>,
    Path(name): Path<String>,
    Query(query): Query<AuditQuery>,
) -> ApiResult<Response> {
    let page = state
        .service
        .audit_page(&name, query.limit.unwrap_or(50), query.cursor);
    Ok(envelope(page).into_response())
}

/// Handle `POST /api/generate`, the export path.
///
/// Resolves and synthesizes the mesh, then streams the zip bundle back as
/// an attachment.
pub async fn generate<R: RuntimeAdapter>(
    State(_state): State<Arc<AppState<R>>>,
    Json(spec): Json<MeshSpec>,
) -> ApiResult<Response> {
    let mesh = resolve(&spec)?;
    let mut psks = psk_book_for(&spec);
    let bundle = synthesize(&spec, &mesh, &mut psks)?;
    let bytes = archive::bundle_zip(&bundle)?;

    Ok((
        [
            (header::CONTENT_TYPE, "application/zip"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"wg-mesh-config.zip\"",
            ),
        ],
        bytes,
    )
        .into_response())
}

/// Handle `POST /api/deploy`, the push path for one node.
pub async fn deploy<R: RuntimeAdapter>(
    State(state): State<Arc<AppState<R>>>,
    Json(body): Json<DeployBody>,
) -> ApiResult<Response> {
    let mesh = resolve(&body.payload)?;
    let projection = node_deployment(&body.payload, &mesh, &body.node_name)?;

    let interface = projection.interface_name.clone();
    let peers: Vec<Peer> = projection
        .peers
        .iter()
        .map(|p| Peer {
            peer_id: Uuid::new_v4().to_string(),
            name: p.name.clone(),
            public_key: p.public_key.clone(),
            private_key: None,
            allowed_ips: p.allowed_ips.clone(),
            endpoint: p.endpoint.clone(),
            persistent_keepalive: p.persistent_keepalive,
            is_active: true,
            interface: interface.clone(),
        })
        .collect();

    let result = state
        .service
        .deploy(Deployment {
            interface_name: projection.interface_name,
            address_cidr: projection.address_cidr,
            listen_port: projection.listen_port,
            private_key: Some(projection.private_key),
            peers,
        })
        .await?;

    Ok(envelope(result).into_response())
}

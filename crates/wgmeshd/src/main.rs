//! wgmeshd entry point.

use std::sync::Arc;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;
use wgmesh_provision::ProvisionService;
use wgmesh_runtime::WgCli;
use wgmeshd::{create_router, AppState, ServerConfig};

#[tokio::main]
async fn main() -> std::io::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = ServerConfig::parse();
    info!(
        bind = %config.bind_addr,
        state = %config.state_file.display(),
        "starting wgmeshd"
    );

    let service = ProvisionService::new(config.store(), WgCli::new());
    let app = create_router(Arc::new(AppState::new(service)));

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

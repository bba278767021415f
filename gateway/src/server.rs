//! Wires a [`SessionOrchestrator`] to a concrete downstream transport, per
//! `config.server.transport`.

use std::sync::Arc;

use config::TransportMode;
use gateway_core::SessionOrchestrator;
use rmcp::transport::{
    stdio,
    streamable_http_server::{StreamableHttpService, session::local::LocalSessionManager},
};

/// Runs the gateway until the process receives a shutdown signal (Ctrl-C).
pub async fn run(orchestrator: SessionOrchestrator, transport: TransportMode) -> anyhow::Result<()> {
    match transport {
        TransportMode::Stdio => run_stdio(orchestrator).await,
        TransportMode::Http { listen_address, path } => run_http(orchestrator, listen_address, &path).await,
    }
}

/// Exactly one session exists for the process's lifetime, scoped under the
/// literal session id `"default"`.
async fn run_stdio(orchestrator: SessionOrchestrator) -> anyhow::Result<()> {
    let server = orchestrator.new_session("default".to_owned());
    let running = rmcp::service::serve_server(server, stdio()).await?;

    tokio::signal::ctrl_c().await?;
    let _ = running.cancel().await;

    Ok(())
}

/// Every `initialize` request allocates a fresh session id; `rmcp` has no
/// stable hook to learn that id ahead of time, so the factory mints its own.
/// Session teardown is handled by `GatewayServer`'s `Drop` impl once
/// `LocalSessionManager` drops the handler for an ended session.
async fn run_http(orchestrator: SessionOrchestrator, listen_address: std::net::SocketAddr, path: &str) -> anyhow::Result<()> {
    let orchestrator = Arc::new(orchestrator);

    let factory = {
        let orchestrator = orchestrator.clone();
        move || {
            let session_id = uuid::Uuid::new_v4().to_string();
            Ok(orchestrator.new_session(session_id))
        }
    };

    let service = StreamableHttpService::new(factory, Arc::new(LocalSessionManager::default()), Default::default());

    let router = axum::Router::new().route_service(path, service);
    let listener = tokio::net::TcpListener::bind(listen_address).await?;

    log::info!("listening on http://{listen_address}{path}");

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    Ok(())
}

use workforce_gateway::modules;
use workforce_gateway::proxy;

#[tokio::main]
async fn main() -> Result<(), String> {
    let config = modules::config::load_gateway_config()
        .map_err(|e| format!("failed to load gateway config: {}", e))?;

    modules::logger::init_logger(&config.log);

    let state = proxy::AppState::from_config(config)
        .map_err(|e| format!("failed to initialize gateway: {}", e))?;

    let (server, handle) = proxy::GatewayServer::start(state)
        .await
        .map_err(|e| format!("failed to start gateway server: {}", e))?;

    tokio::signal::ctrl_c()
        .await
        .map_err(|e| format!("failed to listen for shutdown signal: {}", e))?;

    tracing::info!("shutdown requested, stopping server...");
    server.stop();
    let _ = handle.await;

    Ok(())
}

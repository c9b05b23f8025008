//! `smore serve`: Start the HTTP/WebSocket gateway.

use anyhow::Result;
use tracing::debug;

pub async fn run(port_override: Option<u16>) -> Result<()> {
    let mut config = super::load_config()?;

    if let Some(port) = port_override {
        config.gateway.port = port;
    }

    println!("{}", config.assistant_name);
    println!("   Listening: http://{}:{}", config.gateway.host, config.gateway.port);
    println!("   Chat:      ws://{}:{}/ws/chat", config.gateway.host, config.gateway.port);
    println!("   Model:     {}", config.provider.model);

    let provider = smore_providers::router::build_from_config(&config);
    super::check_backend(provider.as_ref()).await;

    debug!(gateway = ?config.gateway, "Gateway config");
    smore_gateway::start(config)
        .await
        .map_err(|e| anyhow::anyhow!("gateway: {e}"))
}

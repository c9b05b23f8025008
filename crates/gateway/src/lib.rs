//! HTTP gateway for Smore.
//!
//! - `GET /health`: liveness plus the assistant's name
//! - `GET /ws/chat`: WebSocket chat, see [`ws`]
//!
//! Built on Axum. Every connection gets its own [`smore_agent::Session`];
//! the agent, its tools and the memory store are shared.

pub mod ws;

use std::sync::Arc;

use axum::{response::Json, routing::get, Router};
use axum::extract::State;
use serde::Serialize;
use smore_agent::AgentLoop;
use smore_config::AppConfig;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

/// Shared application state for the gateway.
pub struct GatewayState {
    pub assistant_name: String,
    pub agent: Arc<AgentLoop>,
}

pub type SharedState = Arc<GatewayState>;

/// Build the Axum router with all gateway routes.
pub fn build_router(state: SharedState) -> Router {
    // Browser UIs are served from elsewhere; both routes are read-only GETs.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([axum::http::Method::GET])
        .max_age(std::time::Duration::from_secs(3600));

    Router::new()
        .route("/health", get(health_handler))
        .route("/ws/chat", get(ws::ws_handler))
        .layer(cors)
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}

/// Shared state for a configured agent.
pub fn build_state(config: &AppConfig) -> Result<SharedState, Box<dyn std::error::Error>> {
    let agent = smore_agent::build_agent(config)?;

    Ok(Arc::new(GatewayState {
        assistant_name: config.assistant_name.clone(),
        agent: Arc::new(agent),
    }))
}

/// Start the gateway HTTP server.
pub async fn start(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);
    let state = build_state(&config)?;
    let app = build_router(state);

    info!(addr = %addr, assistant = %config.assistant_name, "Gateway starting");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// --- Handlers ---

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    assistant: String,
}

async fn health_handler(State(state): State<SharedState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        assistant: state.assistant_name.clone(),
    })
}

//! Health check handlers

use axum::{extract::State, Json};
use serde::Serialize;

use crate::AppState;

#[derive(Serialize)]
pub struct RootResponse {
    pub message: String,
    pub status: String,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub port: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
}

/// Service banner
pub async fn root() -> Json<RootResponse> {
    Json(RootResponse {
        message: "Personalized Learning Platform API".to_string(),
        status: "running".to_string(),
    })
}

/// Liveness probe with a database ping; degraded when the pool is down
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let (status, database) = match state.db.ping().await {
        Ok(_) => ("healthy", "connected"),
        Err(_) => ("degraded", "unavailable"),
    };

    Json(HealthResponse {
        status: status.to_string(),
        service: "backend".to_string(),
        port: state.config.server.port,
        database: Some(database.to_string()),
    })
}

/// Health probe on the /api surface (no dependency checks)
pub async fn api_health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: "backend".to_string(),
        port: state.config.server.port,
        database: None,
    })
}

//! Health endpoint

use crate::state::AppState;
use actix_web::{web, HttpResponse};
use serde::Serialize;

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    database: &'static str,
    uptime_seconds: i64,
    version: &'static str,
}

pub async fn health_check(state: web::Data<AppState>) -> HttpResponse {
    let database_healthy = state.db.ping().await.is_ok();

    let response = HealthResponse {
        status: if database_healthy { "ok" } else { "degraded" },
        database: if database_healthy { "up" } else { "down" },
        uptime_seconds: state.uptime_seconds(),
        version: env!("CARGO_PKG_VERSION"),
    };

    if database_healthy {
        HttpResponse::Ok().json(response)
    } else {
        HttpResponse::ServiceUnavailable().json(response)
    }
}

use actix_web::{web, HttpResponse};

use crate::handlers::{events, health, webhook};

/// Configure all application routes
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg
        // Provider webhook endpoints
        .route("/webhook", web::get().to(webhook::verify_webhook))
        .route("/webhook", web::post().to(webhook::receive_webhook))
        // Operator live event stream
        .route("/api/events", web::get().to(events::stream_events))
        // Load balancer health probe
        .route("/health", web::get().to(health::health_check))
        .route("/", web::get().to(root_handler));
}

async fn root_handler() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "name": "wacast",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

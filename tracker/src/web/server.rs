use crate::web::{handlers, AppState};
use anyhow::Result;
use axum::{
    routing::{delete, get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub async fn start_web_server(state: AppState) -> Result<()> {
    let app = create_router(state.clone());
    let addr = format!("{}:{}", state.config.host, state.config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server running on http://{}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        // === BACKUP ROUTES ===
        .route(
            "/api/backups",
            post(handlers::create_backup).get(handlers::list_backups),
        )
        .route("/api/backups/{id}", delete(handlers::delete_backup))
        .route(
            "/api/backups/{id}/restore",
            post(handlers::restore_backup),
        )
        // === OPERATION MANAGEMENT ROUTES ===
        .route(
            "/api/operations/active",
            get(handlers::get_active_operations),
        )
        .route(
            "/api/operations/emergency-cleanup",
            post(handlers::emergency_cleanup_operations),
        )
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

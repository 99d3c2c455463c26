//! Web server module.

mod handlers;

pub use handlers::*;

use crate::config::DashboardConfig;
use crate::view::Dashboard;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, put},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: DashboardConfig,
    pub dashboard: Arc<Dashboard>,
}

/// Web server for datapulse.
pub struct Server {
    state: AppState,
}

impl Server {
    /// Create a new server with the given dependencies.
    pub fn new(config: DashboardConfig, dashboard: Arc<Dashboard>) -> Self {
        Self {
            state: AppState { config, dashboard },
        }
    }

    /// Build the router with all routes.
    fn routes(&self) -> Router {
        let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any);

        Router::new()
            // Pages
            .route("/", get(handlers::handle_dashboard))
            .route("/dataset", get(handlers::handle_drill_down))
            // API endpoints
            .route("/api/datasets", get(handlers::handle_get_datasets))
            .route(
                "/api/views/{id}",
                get(handlers::handle_get_view)
                    .post(handlers::handle_open_view)
                    .delete(handlers::handle_close_view),
            )
            .route("/api/views/{id}/updates", get(handlers::handle_view_updates))
            .route("/api/views/{id}/filters", put(handlers::handle_set_filters))
            .route("/api/views/{id}/chart-kind", put(handlers::handle_set_chart_kind))
            // Static assets
            .route("/favicon.ico", get(handlers::handle_favicon))
            .layer(TraceLayer::new_for_http())
            .layer(cors)
            .layer(DefaultBodyLimit::max(64 * 1024))
            .with_state(self.state.clone())
    }

    /// Start the server on the configured port.
    pub async fn start(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.state.config.http_port));
        let router = self.routes();

        tracing::info!("Web server listening on {}", addr);

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, router).await?;

        Ok(())
    }
}

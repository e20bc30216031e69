use crate::estimation::geometry::VesselGeometry;
use crate::monitor::MonitorHandle;
use crate::state::AppState;
use axum::Router;
use axum::routing::{get, post, put};
use std::sync::{Arc, RwLock};

pub mod handlers;
pub mod responses;

/// Shared by every handler.
#[derive(Clone)]
pub struct ApiState {
    pub state: Arc<RwLock<AppState>>,
    pub monitor: MonitorHandle,
    pub geometry: Arc<VesselGeometry>,
}

pub fn router(api: ApiState) -> Router {
    Router::new()
        .route("/api/level", get(handlers::get_level))
        .route("/api/chart", get(handlers::get_chart))
        .route("/api/health", get(handlers::get_health))
        .route("/api/interval", put(handlers::put_interval))
        .route("/api/fill-mode", post(handlers::post_fill_mode))
        .route("/api/measure", post(handlers::post_measure))
        .with_state(api)
}

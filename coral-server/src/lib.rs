//! coral-server library - HTTP front end of the cohort service

use std::sync::Arc;

use axum::Router;
use coral_cohort::CohortService;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod api;

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<CohortService>,
}

impl AppState {
    pub fn new(service: CohortService) -> Self {
        Self {
            service: Arc::new(service),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use api::cohorts;
    use axum::routing::get;

    let cohort_routes = Router::new()
        .route("/api/cohorts/create", get(cohorts::create_root))
        .route("/api/cohorts/derive/:filter", get(cohorts::derive))
        .route("/api/cohorts/preview/:filter/data", get(cohorts::preview_data))
        .route("/api/cohorts/preview/:filter/size", get(cohorts::preview_size))
        .route("/api/cohorts/by-ids", get(cohorts::list_by_ids))
        .route("/api/cohorts/rename", get(cohorts::rename))
        .route("/api/cohorts/data", get(cohorts::data))
        .route("/api/cohorts/size", get(cohorts::size))
        .route("/api/cohorts/gene-score", get(cohorts::gene_score))
        .route("/api/cohorts/depletion-score", get(cohorts::depletion_score))
        .route("/api/cohorts/panel-annotation", get(cohorts::panel_annotation))
        .route("/api/cohorts/hist", get(cohorts::histogram))
        .route("/api/cohorts/recommend-split", get(cohorts::recommend_split))
        .route(
            "/api/cohorts/create-automatically",
            get(cohorts::create_automatically),
        );

    Router::new()
        .merge(cohort_routes)
        .route("/api/buildinfo", get(api::get_build_info))
        .merge(api::health_routes())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

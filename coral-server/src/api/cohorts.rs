//! Cohort endpoints
//!
//! Every endpoint takes its inputs as query-string parameters and hands them to
//! [`CohortService`](coral_cohort::CohortService) unchanged. Filter kinds in the path use
//! the names `equals`, `num`, `gene-equals`, `gene-num`, `depletion`, `treatment` and
//! `panel`.

use std::collections::HashMap;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use coral_cohort::executor::JsonRow;
use coral_cohort::{FilterKind, Histogram, Params, SplitRecommendation};
use coral_common::db::CohortSummary;
use serde::Serialize;

use super::ApiError;
use crate::AppState;

type QueryParams = Query<HashMap<String, String>>;

/// Identifier of a stored cohort
#[derive(Debug, Serialize)]
pub struct CreatedResponse {
    pub id: i64,
}

/// Row count of a cohort or preview
#[derive(Debug, Serialize)]
pub struct SizeResponse {
    pub size: i64,
}

/// GET /api/cohorts/create
pub async fn create_root(
    State(state): State<AppState>,
    Query(params): QueryParams,
) -> Result<Json<CohortSummary>, ApiError> {
    let cohort = state.service.create_root(&Params::new(params)).await?;
    Ok(Json(CohortSummary::from(&cohort)))
}

/// GET /api/cohorts/derive/:filter
pub async fn derive(
    State(state): State<AppState>,
    Path(filter): Path<String>,
    Query(params): QueryParams,
) -> Result<Json<CreatedResponse>, ApiError> {
    let kind = FilterKind::parse(&filter)?;
    let id = state.service.derive(kind, &Params::new(params)).await?;
    Ok(Json(CreatedResponse { id }))
}

/// GET /api/cohorts/preview/:filter/data
pub async fn preview_data(
    State(state): State<AppState>,
    Path(filter): Path<String>,
    Query(params): QueryParams,
) -> Result<Json<Vec<JsonRow>>, ApiError> {
    let kind = FilterKind::parse(&filter)?;
    Ok(Json(state.service.preview_data(kind, &Params::new(params)).await?))
}

/// GET /api/cohorts/preview/:filter/size
pub async fn preview_size(
    State(state): State<AppState>,
    Path(filter): Path<String>,
    Query(params): QueryParams,
) -> Result<Json<SizeResponse>, ApiError> {
    let kind = FilterKind::parse(&filter)?;
    let size = state.service.preview_size(kind, &Params::new(params)).await?;
    Ok(Json(SizeResponse { size }))
}

/// GET /api/cohorts/by-ids
pub async fn list_by_ids(
    State(state): State<AppState>,
    Query(params): QueryParams,
) -> Result<Json<Vec<CohortSummary>>, ApiError> {
    Ok(Json(state.service.list_by_ids(&Params::new(params)).await?))
}

/// GET /api/cohorts/rename
pub async fn rename(
    State(state): State<AppState>,
    Query(params): QueryParams,
) -> Result<Json<CohortSummary>, ApiError> {
    let cohort = state.service.rename(&Params::new(params)).await?;
    Ok(Json(CohortSummary::from(&cohort)))
}

/// GET /api/cohorts/data
pub async fn data(
    State(state): State<AppState>,
    Query(params): QueryParams,
) -> Result<Json<Vec<JsonRow>>, ApiError> {
    Ok(Json(state.service.data(&Params::new(params)).await?))
}

/// GET /api/cohorts/size
pub async fn size(
    State(state): State<AppState>,
    Query(params): QueryParams,
) -> Result<Json<SizeResponse>, ApiError> {
    let size = state.service.size(&Params::new(params)).await?;
    Ok(Json(SizeResponse { size }))
}

/// GET /api/cohorts/gene-score
pub async fn gene_score(
    State(state): State<AppState>,
    Query(params): QueryParams,
) -> Result<Json<Vec<JsonRow>>, ApiError> {
    Ok(Json(state.service.gene_score(&Params::new(params)).await?))
}

/// GET /api/cohorts/depletion-score
pub async fn depletion_score(
    State(state): State<AppState>,
    Query(params): QueryParams,
) -> Result<Json<Vec<JsonRow>>, ApiError> {
    Ok(Json(state.service.depletion_score(&Params::new(params)).await?))
}

/// GET /api/cohorts/panel-annotation
pub async fn panel_annotation(
    State(state): State<AppState>,
    Query(params): QueryParams,
) -> Result<Json<Vec<JsonRow>>, ApiError> {
    Ok(Json(state.service.panel_annotation(&Params::new(params)).await?))
}

/// GET /api/cohorts/hist
pub async fn histogram(
    State(state): State<AppState>,
    Query(params): QueryParams,
) -> Result<Json<Histogram>, ApiError> {
    Ok(Json(state.service.histogram(&Params::new(params)).await?))
}

/// GET /api/cohorts/recommend-split
pub async fn recommend_split(
    State(state): State<AppState>,
    Query(params): QueryParams,
) -> Result<Json<SplitRecommendation>, ApiError> {
    Ok(Json(state.service.recommend_split(&Params::new(params)).await?))
}

/// GET /api/cohorts/create-automatically
pub async fn create_automatically(
    State(state): State<AppState>,
    Query(params): QueryParams,
) -> Result<Json<Vec<i64>>, ApiError> {
    Ok(Json(
        state
            .service
            .create_automatically(&Params::new(params))
            .await?,
    ))
}

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    Json,
};
use ns_core::{Error, PlotView, SortOrder};
use ns_inference::AggregationService;
use ns_scrapers::WriteMode;
use serde::Deserialize;
use tracing::info;

use crate::error::ApiResult;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ViewParams {
    pub order: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SimulateRequest {
    pub simulated_text: String,
}

#[derive(Debug, Deserialize)]
pub struct ExtractRequest {
    pub search_query: String,
    pub news_count: usize,
}

/// Inference and file I/O block; keep them off the async workers.
async fn blocking<T, F>(aggregation: &Arc<AggregationService>, f: F) -> ApiResult<T>
where
    T: Send + 'static,
    F: FnOnce(&AggregationService) -> ns_core::Result<T> + Send + 'static,
{
    let aggregation = aggregation.clone();
    Ok(tokio::task::spawn_blocking(move || f(&aggregation)).await??)
}

pub async fn get_view(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ViewParams>,
) -> ApiResult<Json<PlotView>> {
    let order = match params.order.as_deref() {
        Some(order) => order.parse::<SortOrder>().map_err(Error::InvalidInput)?,
        None => SortOrder::default(),
    };
    let view = blocking(&state.aggregation, move |svc| svc.current_view(order)).await?;
    Ok(Json(view))
}

pub async fn refresh_plot(State(state): State<Arc<AppState>>) -> ApiResult<Json<PlotView>> {
    let view = blocking(&state.aggregation, |svc| {
        svc.refresh()?;
        svc.current_view(SortOrder::Ascending)
    })
    .await?;
    Ok(Json(view))
}

pub async fn simulate(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SimulateRequest>,
) -> ApiResult<Json<PlotView>> {
    let view = blocking(&state.aggregation, move |svc| svc.simulate(&request.simulated_text)).await?;
    Ok(Json(view))
}

pub async fn extract(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ExtractRequest>,
) -> ApiResult<Json<PlotView>> {
    if request.search_query.trim().is_empty() {
        return Err(Error::InvalidInput("search_query must not be empty".to_string()).into());
    }
    let collected = state
        .collector
        .collect(&request.search_query, request.news_count, WriteMode::Overwrite)
        .await?;
    info!("📰 Extracted {} items for {:?}", collected.len(), request.search_query);

    let view = blocking(&state.aggregation, |svc| {
        svc.refresh()?;
        svc.current_view(SortOrder::Ascending)
    })
    .await?;
    Ok(Json(view))
}

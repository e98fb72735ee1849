use axum::{
    extract::{Json, Path, State},
    routing::get,
    Router,
};

use super::AppState;
use crate::entities::product_summary;
use crate::{ApiResponse, ApiResult};

pub fn summary_routes() -> Router<AppState> {
    Router::new()
        .route("/product-summaries", get(list_summaries))
        .route("/product-summaries/:product_id", get(get_summary))
}

pub async fn list_summaries(
    State(state): State<AppState>,
) -> ApiResult<Vec<product_summary::Model>> {
    let summaries = state.services.summaries.list().await?;
    Ok(Json(ApiResponse::success(summaries)))
}

pub async fn get_summary(
    State(state): State<AppState>,
    Path(product_id): Path<String>,
) -> ApiResult<product_summary::Model> {
    let summary = state.services.summaries.get(&product_id).await?;
    Ok(Json(ApiResponse::success(summary)))
}

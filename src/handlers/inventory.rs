use axum::{
    extract::{Json, Path, Query, State},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::AppState;
use crate::commands::lots::UpdateLotCommand;
use crate::commands::Command;
use crate::entities::inventory_lot;
use crate::services::allocation::{AggregatedLot, AggregatedLotKey, AllocationPlan};
use crate::{ApiResponse, ApiResult};

#[derive(Debug, Default, Deserialize)]
pub struct LotFilters {
    pub product_id: Option<String>,
    #[serde(default)]
    pub in_stock: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PlanRequest {
    pub product_id: String,
    pub lot_number: Option<String>,
    pub quantity: i64,
}

pub fn inventory_routes() -> Router<AppState> {
    Router::new()
        .route("/lots", get(list_lots))
        .route("/lots/:id", get(get_lot).put(update_lot))
        .route("/products/:id/aggregated-lots", get(list_aggregated_lots))
        .route("/allocations/plan", post(plan_allocation))
}

pub async fn list_lots(
    State(state): State<AppState>,
    Query(filters): Query<LotFilters>,
) -> ApiResult<Vec<inventory_lot::Model>> {
    let lots = state
        .services
        .lots
        .list_lots(filters.product_id.as_deref(), filters.in_stock)
        .await?;
    Ok(Json(ApiResponse::success(lots)))
}

pub async fn get_lot(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<inventory_lot::Model> {
    let lot = state.services.lots.get_lot(id).await?;
    Ok(Json(ApiResponse::success(lot)))
}

pub async fn update_lot(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(mut command): Json<UpdateLotCommand>,
) -> ApiResult<inventory_lot::Model> {
    command.lot_id = id;
    let lot = command
        .execute(state.db.clone(), state.event_sender.clone())
        .await?;
    Ok(Json(ApiResponse::success(lot)))
}

pub async fn list_aggregated_lots(
    State(state): State<AppState>,
    Path(product_id): Path<String>,
) -> ApiResult<Vec<AggregatedLot>> {
    let groups = state
        .services
        .allocation
        .list_aggregated_lots(&product_id)
        .await?;
    Ok(Json(ApiResponse::success(groups)))
}

/// Previews a FEFO distribution without writing anything.
pub async fn plan_allocation(
    State(state): State<AppState>,
    Json(request): Json<PlanRequest>,
) -> ApiResult<AllocationPlan> {
    let key = AggregatedLotKey::new(&request.product_id, request.lot_number.as_deref());
    let plan = state.services.allocation.plan(&key, request.quantity).await?;
    Ok(Json(ApiResponse::success(plan)))
}

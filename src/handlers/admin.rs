use axum::{
    extract::{Json, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use tracing::error;

use super::AppState;
use crate::commands::publish;
use crate::events::Event;
use crate::reconciliation::HealthReport;
use crate::services::product_summary::BackfillReport;
use crate::services::team_backfill::TeamBackfillReport;
use crate::{ApiResponse, ApiResult};

#[derive(Debug, Default, Deserialize)]
pub struct HealthCheckParams {
    pub stale_days: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TeamBackfillParams {
    pub batch_size: Option<u64>,
}

pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/admin/product-summaries/backfill", post(backfill_summaries))
        .route("/admin/export-teams/backfill", post(backfill_export_teams))
        .route("/admin/health-check", get(health_check))
}

/// Rebuilds every product summary. Always answers `{status, message, ...}`.
pub async fn backfill_summaries(State(state): State<AppState>) -> impl IntoResponse {
    match state.services.summaries.backfill_all().await {
        Ok(report) => {
            publish(
                &state.event_sender,
                vec![Event::ProductSummariesRebuilt {
                    summaries_written: report.summaries_written,
                }],
            )
            .await;
            (StatusCode::OK, Json(report))
        }
        Err(e) => {
            error!(error = %e, "Summary backfill request failed");
            (e.status_code(), Json(BackfillReport::failed(&e)))
        }
    }
}

pub async fn backfill_export_teams(
    State(state): State<AppState>,
    Query(params): Query<TeamBackfillParams>,
) -> ApiResult<TeamBackfillReport> {
    let report = state
        .services
        .team_backfill
        .run(params.batch_size.unwrap_or(500))
        .await?;
    Ok(Json(ApiResponse::success(report)))
}

pub async fn health_check(
    State(state): State<AppState>,
    Query(params): Query<HealthCheckParams>,
) -> ApiResult<HealthReport> {
    let report = state.services.reconciliation.run(params.stale_days).await?;
    Ok(Json(ApiResponse::success(report)))
}

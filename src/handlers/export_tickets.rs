use axum::{
    extract::{Json, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use uuid::Uuid;

use super::{AppState, CreateMode, TicketFilters};
use crate::commands::export_tickets::{
    CancelExportCommand, ConfirmExportCommand, DirectExportCommand, ExportItemRequest,
    ExportTicketHeader, SaveExportDraftCommand, UpdateExportTicketCommand,
};
use crate::commands::Command;
use crate::entities::export_ticket;
use crate::errors::ServiceError;
use crate::services::tickets::ExportTicketDetails;
use crate::{ApiResponse, ApiResult};

#[derive(Debug, Deserialize)]
pub struct CreateExportTicketRequest {
    #[serde(default)]
    pub mode: CreateMode,
    #[serde(flatten)]
    pub header: ExportTicketHeader,
    pub items: Vec<ExportItemRequest>,
}

pub fn export_ticket_routes() -> Router<AppState> {
    Router::new()
        .route("/export-tickets", get(list_export_tickets).post(create_export_ticket))
        .route(
            "/export-tickets/:id",
            get(get_export_ticket).put(update_export_ticket),
        )
        .route("/export-tickets/:id/confirm", post(confirm_export_ticket))
        .route("/export-tickets/:id/cancel", post(cancel_export_ticket))
}

pub async fn list_export_tickets(
    State(state): State<AppState>,
    Query(filters): Query<TicketFilters>,
) -> ApiResult<Vec<export_ticket::Model>> {
    let tickets = state
        .services
        .tickets
        .list_export_tickets(filters.status()?)
        .await?;
    Ok(Json(ApiResponse::success(tickets)))
}

/// Saves a draft (soft lock) or performs a direct export, depending on `mode`.
pub async fn create_export_ticket(
    State(state): State<AppState>,
    Json(request): Json<CreateExportTicketRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let details = match request.mode {
        CreateMode::Draft => {
            SaveExportDraftCommand {
                header: request.header,
                items: request.items,
            }
            .execute(state.db.clone(), state.event_sender.clone())
            .await?
        }
        CreateMode::Direct => {
            DirectExportCommand {
                header: request.header,
                items: request.items,
            }
            .execute(state.db.clone(), state.event_sender.clone())
            .await?
        }
    };
    Ok((StatusCode::CREATED, Json(ApiResponse::success(details))))
}

pub async fn get_export_ticket(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<ExportTicketDetails> {
    let details = state.services.tickets.get_export_ticket(id).await?;
    Ok(Json(ApiResponse::success(details)))
}

pub async fn update_export_ticket(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(mut command): Json<UpdateExportTicketCommand>,
) -> ApiResult<ExportTicketDetails> {
    command.ticket_id = id;
    let details = command
        .execute(state.db.clone(), state.event_sender.clone())
        .await?;
    Ok(Json(ApiResponse::success(details)))
}

pub async fn confirm_export_ticket(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<ExportTicketDetails> {
    let details = ConfirmExportCommand { ticket_id: id }
        .execute(state.db.clone(), state.event_sender.clone())
        .await?;
    Ok(Json(ApiResponse::success(details)))
}

/// Cancels with the release policy the server is configured with.
pub async fn cancel_export_ticket(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<ExportTicketDetails> {
    let details = CancelExportCommand::new(id, state.config.allocation_release_policy)
        .execute(state.db.clone(), state.event_sender.clone())
        .await?;
    Ok(Json(ApiResponse::success(details)))
}

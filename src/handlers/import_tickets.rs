use axum::{
    extract::{Json, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{AppState, CreateMode, TicketFilters};
use crate::commands::import_tickets::direct_import_command::ImportResult;
use crate::commands::import_tickets::{
    CancelImportTicketCommand, ConfirmImportCommand, CreateImportTicketCommand,
    DeleteImportTicketCommand, DirectImportCommand, ImportItemRequest, ImportTicketHeader,
    UpdateImportTicketCommand,
};
use crate::commands::Command;
use crate::entities::import_ticket;
use crate::errors::ServiceError;
use crate::services::tickets::ImportTicketDetails;
use crate::{ApiResponse, ApiResult};

#[derive(Debug, Deserialize)]
pub struct CreateImportTicketRequest {
    #[serde(default)]
    pub mode: CreateMode,
    #[serde(flatten)]
    pub header: ImportTicketHeader,
    pub items: Vec<ImportItemRequest>,
}

/// Body of a created import: direct imports also return the lots they created.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum CreatedImport {
    Pending(ImportTicketDetails),
    Received(ImportResult),
}

pub fn import_ticket_routes() -> Router<AppState> {
    Router::new()
        .route("/import-tickets", get(list_import_tickets).post(create_import_ticket))
        .route(
            "/import-tickets/:id",
            get(get_import_ticket)
                .put(update_import_ticket)
                .delete(delete_import_ticket),
        )
        .route("/import-tickets/:id/confirm", post(confirm_import_ticket))
        .route("/import-tickets/:id/cancel", post(cancel_import_ticket))
}

pub async fn list_import_tickets(
    State(state): State<AppState>,
    Query(filters): Query<TicketFilters>,
) -> ApiResult<Vec<import_ticket::Model>> {
    let tickets = state
        .services
        .tickets
        .list_import_tickets(filters.status()?)
        .await?;
    Ok(Json(ApiResponse::success(tickets)))
}

pub async fn create_import_ticket(
    State(state): State<AppState>,
    Json(request): Json<CreateImportTicketRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let created = match request.mode {
        CreateMode::Draft => CreatedImport::Pending(
            CreateImportTicketCommand {
                header: request.header,
                items: request.items,
            }
            .execute(state.db.clone(), state.event_sender.clone())
            .await?,
        ),
        CreateMode::Direct => CreatedImport::Received(
            DirectImportCommand {
                header: request.header,
                items: request.items,
            }
            .execute(state.db.clone(), state.event_sender.clone())
            .await?,
        ),
    };
    Ok((StatusCode::CREATED, Json(ApiResponse::success(created))))
}

pub async fn get_import_ticket(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<ImportTicketDetails> {
    let details = state.services.tickets.get_import_ticket(id).await?;
    Ok(Json(ApiResponse::success(details)))
}

pub async fn update_import_ticket(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(mut command): Json<UpdateImportTicketCommand>,
) -> ApiResult<ImportTicketDetails> {
    command.ticket_id = id;
    let details = command
        .execute(state.db.clone(), state.event_sender.clone())
        .await?;
    Ok(Json(ApiResponse::success(details)))
}

pub async fn confirm_import_ticket(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<ImportResult> {
    let result = ConfirmImportCommand { ticket_id: id }
        .execute(state.db.clone(), state.event_sender.clone())
        .await?;
    Ok(Json(ApiResponse::success(result)))
}

pub async fn cancel_import_ticket(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<ImportTicketDetails> {
    let details = CancelImportTicketCommand { ticket_id: id }
        .execute(state.db.clone(), state.event_sender.clone())
        .await?;
    Ok(Json(ApiResponse::success(details)))
}

pub async fn delete_import_ticket(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ServiceError> {
    DeleteImportTicketCommand { ticket_id: id }
        .execute(state.db.clone(), state.event_sender.clone())
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

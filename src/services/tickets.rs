use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

use crate::db::DbPool;
use crate::entities::{
    export_ticket, export_ticket_item, import_ticket, import_ticket_item, TicketStatus,
};
use crate::errors::ServiceError;

/// Export ticket with its lines in entry order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportTicketDetails {
    pub ticket: export_ticket::Model,
    pub items: Vec<export_ticket_item::Model>,
}

impl ExportTicketDetails {
    pub fn total_quantity(&self) -> i64 {
        self.items.iter().map(|i| i.quantity).sum()
    }
}

/// Import ticket with its lines in entry order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportTicketDetails {
    pub ticket: import_ticket::Model,
    pub items: Vec<import_ticket_item::Model>,
}

pub(crate) async fn load_export_ticket<C: ConnectionTrait>(
    conn: &C,
    ticket_id: Uuid,
) -> Result<ExportTicketDetails, ServiceError> {
    let ticket = export_ticket::Entity::find_by_id(ticket_id)
        .one(conn)
        .await
        .map_err(ServiceError::db_error)?
        .ok_or_else(|| ServiceError::NotFound(format!("Export ticket {} not found", ticket_id)))?;

    let items = export_ticket_item::Entity::find()
        .filter(export_ticket_item::Column::TicketId.eq(ticket_id))
        .order_by_asc(export_ticket_item::Column::Position)
        .all(conn)
        .await
        .map_err(ServiceError::db_error)?;

    Ok(ExportTicketDetails { ticket, items })
}

pub(crate) async fn load_import_ticket<C: ConnectionTrait>(
    conn: &C,
    ticket_id: Uuid,
) -> Result<ImportTicketDetails, ServiceError> {
    let ticket = import_ticket::Entity::find_by_id(ticket_id)
        .one(conn)
        .await
        .map_err(ServiceError::db_error)?
        .ok_or_else(|| ServiceError::NotFound(format!("Import ticket {} not found", ticket_id)))?;

    let items = import_ticket_item::Entity::find()
        .filter(import_ticket_item::Column::TicketId.eq(ticket_id))
        .order_by_asc(import_ticket_item::Column::Position)
        .all(conn)
        .await
        .map_err(ServiceError::db_error)?;

    Ok(ImportTicketDetails { ticket, items })
}

/// Fails unless `status` is pending; `what` names the ticket in the message.
pub(crate) fn ensure_pending(
    status: &str,
    what: impl std::fmt::Display,
) -> Result<(), ServiceError> {
    match TicketStatus::parse(status) {
        Some(TicketStatus::Pending) => Ok(()),
        _ => Err(ServiceError::InvalidStatus(format!(
            "{} is {}, only pending tickets can change",
            what, status
        ))),
    }
}

/// Read access to tickets for handlers and the CLI.
#[derive(Clone)]
pub struct TicketQueryService {
    db_pool: Arc<DbPool>,
}

impl TicketQueryService {
    pub fn new(db_pool: Arc<DbPool>) -> Self {
        Self { db_pool }
    }

    #[instrument(skip(self))]
    pub async fn get_export_ticket(&self, id: Uuid) -> Result<ExportTicketDetails, ServiceError> {
        load_export_ticket(&*self.db_pool, id).await
    }

    #[instrument(skip(self))]
    pub async fn get_import_ticket(&self, id: Uuid) -> Result<ImportTicketDetails, ServiceError> {
        load_import_ticket(&*self.db_pool, id).await
    }

    /// Export tickets newest first, optionally filtered by status.
    #[instrument(skip(self))]
    pub async fn list_export_tickets(
        &self,
        status: Option<TicketStatus>,
    ) -> Result<Vec<export_ticket::Model>, ServiceError> {
        let mut query = export_ticket::Entity::find();
        if let Some(status) = status {
            query = query.filter(export_ticket::Column::Status.eq(status.as_str()));
        }
        query
            .order_by_desc(export_ticket::Column::CreatedAt)
            .all(&*self.db_pool)
            .await
            .map_err(ServiceError::db_error)
    }

    /// Import tickets newest first, optionally filtered by status.
    #[instrument(skip(self))]
    pub async fn list_import_tickets(
        &self,
        status: Option<TicketStatus>,
    ) -> Result<Vec<import_ticket::Model>, ServiceError> {
        let mut query = import_ticket::Entity::find();
        if let Some(status) = status {
            query = query.filter(import_ticket::Column::Status.eq(status.as_str()));
        }
        query
            .order_by_desc(import_ticket::Column::CreatedAt)
            .all(&*self.db_pool)
            .await
            .map_err(ServiceError::db_error)
    }
}

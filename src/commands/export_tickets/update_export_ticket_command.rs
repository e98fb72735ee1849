use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set, TransactionTrait};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

use super::{release_lines, validate_items, write_lines, ExportItemRequest, LineEffect};
use crate::commands::lot_writes::LotWriteLog;
use crate::commands::{ensure_partner_exists, map_txn_error, publish, Command};
use crate::db::DbPool;
use crate::entities::{export_ticket, export_ticket_item};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::metrics::record_failure;
use crate::services::tickets::{ensure_pending, load_export_ticket, ExportTicketDetails};

/// Replaces the lines of a pending export.
///
/// The old soft locks are released and the new lines planned against the freed
/// stock, all in one transaction, so an edit that no longer fits leaves the
/// ticket and its allocations untouched.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct UpdateExportTicketCommand {
    #[serde(default)]
    pub ticket_id: Uuid,
    #[validate(length(min = 1, message = "Partner is required"))]
    pub partner_id: Option<String>,
    #[validate(length(max = 1000))]
    pub description: Option<String>,
    pub items: Vec<ExportItemRequest>,
}

#[async_trait]
impl Command for UpdateExportTicketCommand {
    type Result = ExportTicketDetails;

    #[instrument(skip(self, db_pool, event_sender), fields(ticket_id = %self.ticket_id))]
    async fn execute(
        &self,
        db_pool: Arc<DbPool>,
        event_sender: Arc<EventSender>,
    ) -> Result<Self::Result, ServiceError> {
        self.run(db_pool, event_sender)
            .await
            .map_err(|e| record_failure("update_export_ticket", e))
    }
}

impl UpdateExportTicketCommand {
    async fn run(
        &self,
        db_pool: Arc<DbPool>,
        event_sender: Arc<EventSender>,
    ) -> Result<ExportTicketDetails, ServiceError> {
        self.validate()?;
        validate_items(&self.items)?;
        let ticket_id = self.ticket_id;

        let (details, log) = db_pool
            .transaction::<_, (ExportTicketDetails, LotWriteLog), ServiceError>(|txn| {
                let partner_id = self.partner_id.clone();
                let description = self.description.clone();
                let items = self.items.clone();
                Box::pin(async move {
                    let current = load_export_ticket(txn, ticket_id).await?;
                    ensure_pending(
                        &current.ticket.status,
                        format_args!("Export ticket {}", ticket_id),
                    )?;
                    if let Some(partner_id) = &partner_id {
                        ensure_partner_exists(txn, partner_id).await?;
                    }

                    let mut log = LotWriteLog::new();
                    release_lines(txn, &current.items, &mut log).await?;
                    export_ticket_item::Entity::delete_many()
                        .filter(export_ticket_item::Column::TicketId.eq(ticket_id))
                        .exec(txn)
                        .await
                        .map_err(ServiceError::db_error)?;

                    let lines =
                        write_lines(txn, ticket_id, &items, LineEffect::Allocate, &mut log).await?;

                    let mut ticket: export_ticket::ActiveModel = current.ticket.into();
                    if let Some(partner_id) = partner_id {
                        ticket.partner_id = Set(partner_id);
                    }
                    if description.is_some() {
                        ticket.description = Set(description);
                    }
                    ticket.updated_at = Set(Utc::now());
                    let ticket = ticket.update(txn).await.map_err(ServiceError::db_error)?;

                    Ok((ExportTicketDetails { ticket, items: lines }, log))
                })
            })
            .await
            .map_err(map_txn_error)?;

        info!(
            ticket_id = %ticket_id,
            lines = details.items.len(),
            lots = log.len(),
            "Export ticket updated"
        );

        let mut events = log.into_events();
        events.push(Event::ExportTicketUpdated(ticket_id));
        publish(&event_sender, events).await;

        Ok(details)
    }
}

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set, TransactionTrait};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

use super::{insert_items, validate_items, ImportItemRequest};
use crate::commands::{ensure_partner_exists, map_txn_error, publish, Command};
use crate::db::DbPool;
use crate::entities::{import_ticket, import_ticket_item};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::metrics::record_failure;
use crate::services::tickets::{ensure_pending, load_import_ticket, ImportTicketDetails};

/// Replaces the lines of a pending import.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct UpdateImportTicketCommand {
    #[serde(default)]
    pub ticket_id: Uuid,
    #[validate(length(min = 1, message = "Partner is required"))]
    pub partner_id: Option<String>,
    #[validate(length(max = 1000))]
    pub description: Option<String>,
    pub items: Vec<ImportItemRequest>,
}

#[async_trait]
impl Command for UpdateImportTicketCommand {
    type Result = ImportTicketDetails;

    #[instrument(skip(self, db_pool, event_sender), fields(ticket_id = %self.ticket_id))]
    async fn execute(
        &self,
        db_pool: Arc<DbPool>,
        event_sender: Arc<EventSender>,
    ) -> Result<Self::Result, ServiceError> {
        self.validate()
            .map_err(ServiceError::from)
            .and_then(|_| validate_items(&self.items))
            .map_err(|e| record_failure("update_import_ticket", e))?;
        let ticket_id = self.ticket_id;

        let details = db_pool
            .transaction::<_, ImportTicketDetails, ServiceError>(|txn| {
                let partner_id = self.partner_id.clone();
                let description = self.description.clone();
                let items = self.items.clone();
                Box::pin(async move {
                    let current = load_import_ticket(txn, ticket_id).await?;
                    ensure_pending(
                        &current.ticket.status,
                        format_args!("Import ticket {}", ticket_id),
                    )?;
                    if let Some(partner_id) = &partner_id {
                        ensure_partner_exists(txn, partner_id).await?;
                    }

                    import_ticket_item::Entity::delete_many()
                        .filter(import_ticket_item::Column::TicketId.eq(ticket_id))
                        .exec(txn)
                        .await
                        .map_err(ServiceError::db_error)?;
                    let items = insert_items(txn, ticket_id, &items).await?;

                    let mut ticket: import_ticket::ActiveModel = current.ticket.into();
                    if let Some(partner_id) = partner_id {
                        ticket.partner_id = Set(partner_id);
                    }
                    if description.is_some() {
                        ticket.description = Set(description);
                    }
                    ticket.updated_at = Set(Utc::now());
                    let ticket = ticket.update(txn).await.map_err(ServiceError::db_error)?;

                    Ok(ImportTicketDetails { ticket, items })
                })
            })
            .await
            .map_err(map_txn_error)
            .map_err(|e| record_failure("update_import_ticket", e))?;

        info!(ticket_id = %ticket_id, lines = details.items.len(), "Import ticket updated");
        publish(&event_sender, vec![Event::ImportTicketUpdated(ticket_id)]).await;

        Ok(details)
    }
}

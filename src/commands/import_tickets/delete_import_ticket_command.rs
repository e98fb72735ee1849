use async_trait::async_trait;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, TransactionTrait};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::commands::{map_txn_error, publish, Command};
use crate::db::DbPool;
use crate::entities::{import_ticket, import_ticket_item, TicketStatus};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::metrics::record_failure;
use crate::services::tickets::{ensure_pending, load_import_ticket};

/// Removes a pending import and its lines. Lots are never involved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteImportTicketCommand {
    pub ticket_id: Uuid,
}

#[async_trait]
impl Command for DeleteImportTicketCommand {
    type Result = ();

    #[instrument(skip(self, db_pool, event_sender), fields(ticket_id = %self.ticket_id))]
    async fn execute(
        &self,
        db_pool: Arc<DbPool>,
        event_sender: Arc<EventSender>,
    ) -> Result<Self::Result, ServiceError> {
        let ticket_id = self.ticket_id;

        let lines = db_pool
            .transaction::<_, usize, ServiceError>(|txn| {
                Box::pin(async move {
                    let current = load_import_ticket(txn, ticket_id).await?;
                    ensure_pending(
                        &current.ticket.status,
                        format_args!("Import ticket {}", ticket_id),
                    )?;

                    import_ticket_item::Entity::delete_many()
                        .filter(import_ticket_item::Column::TicketId.eq(ticket_id))
                        .exec(txn)
                        .await
                        .map_err(ServiceError::db_error)?;
                    let deleted = import_ticket::Entity::delete_many()
                        .filter(import_ticket::Column::Id.eq(ticket_id))
                        .filter(import_ticket::Column::Status.eq(TicketStatus::Pending.as_str()))
                        .exec(txn)
                        .await
                        .map_err(ServiceError::db_error)?;
                    if deleted.rows_affected == 0 {
                        return Err(ServiceError::ConcurrentModification(ticket_id));
                    }
                    Ok(current.items.len())
                })
            })
            .await
            .map_err(map_txn_error)
            .map_err(|e| record_failure("delete_import_ticket", e))?;

        info!(ticket_id = %ticket_id, lines, "Import ticket deleted");
        publish(&event_sender, vec![Event::ImportTicketDeleted(ticket_id)]).await;
        Ok(())
    }
}

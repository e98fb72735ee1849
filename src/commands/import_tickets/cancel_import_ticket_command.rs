use async_trait::async_trait;
use chrono::Utc;
use sea_orm::TransactionTrait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

use super::transition;
use crate::commands::{map_txn_error, publish, Command};
use crate::db::DbPool;
use crate::entities::TicketStatus;
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::metrics::{record_failure, TICKETS_COMMITTED};
use crate::services::tickets::{ensure_pending, load_import_ticket, ImportTicketDetails};

/// Marks a pending import cancelled; its lines are kept for history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelImportTicketCommand {
    pub ticket_id: Uuid,
}

#[async_trait]
impl Command for CancelImportTicketCommand {
    type Result = ImportTicketDetails;

    #[instrument(skip(self, db_pool, event_sender), fields(ticket_id = %self.ticket_id))]
    async fn execute(
        &self,
        db_pool: Arc<DbPool>,
        event_sender: Arc<EventSender>,
    ) -> Result<Self::Result, ServiceError> {
        let ticket_id = self.ticket_id;

        let details = db_pool
            .transaction::<_, ImportTicketDetails, ServiceError>(|txn| {
                Box::pin(async move {
                    let current = load_import_ticket(txn, ticket_id).await?;
                    ensure_pending(
                        &current.ticket.status,
                        format_args!("Import ticket {}", ticket_id),
                    )?;
                    let ticket =
                        transition(txn, ticket_id, TicketStatus::Cancelled, Utc::now()).await?;
                    Ok(ImportTicketDetails {
                        ticket,
                        items: current.items,
                    })
                })
            })
            .await
            .map_err(map_txn_error)
            .map_err(|e| record_failure("cancel_import_ticket", e))?;

        info!(ticket_id = %ticket_id, "Import ticket cancelled");
        TICKETS_COMMITTED.with_label_values(&["import", "cancelled"]).inc();
        publish(&event_sender, vec![Event::ImportTicketCancelled(ticket_id)]).await;

        Ok(details)
    }
}

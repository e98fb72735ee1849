use async_trait::async_trait;
use sea_orm::TransactionTrait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use validator::Validate;

use super::{insert_items, insert_ticket, validate_items, ImportItemRequest, ImportTicketHeader};
use crate::commands::{map_txn_error, publish, Command};
use crate::db::DbPool;
use crate::entities::TicketStatus;
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::metrics::{record_failure, TICKETS_COMMITTED};
use crate::services::tickets::ImportTicketDetails;

/// Records expected stock as a pending import. No lot is touched until confirmation.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateImportTicketCommand {
    #[validate]
    #[serde(flatten)]
    pub header: ImportTicketHeader,
    pub items: Vec<ImportItemRequest>,
}

#[async_trait]
impl Command for CreateImportTicketCommand {
    type Result = ImportTicketDetails;

    #[instrument(skip(self, db_pool, event_sender), fields(partner_id = %self.header.partner_id))]
    async fn execute(
        &self,
        db_pool: Arc<DbPool>,
        event_sender: Arc<EventSender>,
    ) -> Result<Self::Result, ServiceError> {
        self.validate()
            .map_err(ServiceError::from)
            .and_then(|_| validate_items(&self.items))
            .map_err(|e| record_failure("create_import_ticket", e))?;

        let details = db_pool
            .transaction::<_, ImportTicketDetails, ServiceError>(|txn| {
                let header = self.header.clone();
                let items = self.items.clone();
                Box::pin(async move {
                    let ticket = insert_ticket(txn, &header, TicketStatus::Pending).await?;
                    let items = insert_items(txn, ticket.id, &items).await?;
                    Ok(ImportTicketDetails { ticket, items })
                })
            })
            .await
            .map_err(map_txn_error)
            .map_err(|e| record_failure("create_import_ticket", e))?;

        info!(ticket_id = %details.ticket.id, lines = details.items.len(), "Import ticket created");
        TICKETS_COMMITTED.with_label_values(&["import", "pending"]).inc();

        publish(
            &event_sender,
            vec![Event::ImportTicketCreated {
                ticket_id: details.ticket.id,
                status: details.ticket.status.clone(),
            }],
        )
        .await;

        Ok(details)
    }
}

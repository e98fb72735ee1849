use async_trait::async_trait;
use sea_orm::TransactionTrait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use validator::Validate;

use super::{
    create_lots, insert_items, insert_ticket, validate_items, ImportItemRequest, ImportTicketHeader,
};
use crate::commands::lot_writes::LotWriteLog;
use crate::commands::{map_txn_error, publish, Command};
use crate::db::DbPool;
use crate::entities::{inventory_lot, TicketStatus};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::metrics::{record_failure, TICKETS_COMMITTED};
use crate::services::tickets::ImportTicketDetails;

/// Receives stock immediately: creates the lots and a completed ticket together.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct DirectImportCommand {
    #[validate]
    #[serde(flatten)]
    pub header: ImportTicketHeader,
    pub items: Vec<ImportItemRequest>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportResult {
    #[serde(flatten)]
    pub details: ImportTicketDetails,
    pub lots: Vec<inventory_lot::Model>,
}

#[async_trait]
impl Command for DirectImportCommand {
    type Result = ImportResult;

    #[instrument(skip(self, db_pool, event_sender), fields(partner_id = %self.header.partner_id))]
    async fn execute(
        &self,
        db_pool: Arc<DbPool>,
        event_sender: Arc<EventSender>,
    ) -> Result<Self::Result, ServiceError> {
        self.validate()
            .map_err(ServiceError::from)
            .and_then(|_| validate_items(&self.items))
            .map_err(|e| record_failure("direct_import", e))?;

        let (result, log) = db_pool
            .transaction::<_, (ImportResult, LotWriteLog), ServiceError>(|txn| {
                let header = self.header.clone();
                let items = self.items.clone();
                Box::pin(async move {
                    let ticket = insert_ticket(txn, &header, TicketStatus::Completed).await?;
                    let items = insert_items(txn, ticket.id, &items).await?;
                    let mut log = LotWriteLog::new();
                    let lots = create_lots(txn, &items, &ticket.partner_id, &mut log).await?;
                    Ok((
                        ImportResult {
                            details: ImportTicketDetails { ticket, items },
                            lots,
                        },
                        log,
                    ))
                })
            })
            .await
            .map_err(map_txn_error)
            .map_err(|e| record_failure("direct_import", e))?;

        let ticket_id = result.details.ticket.id;
        info!(ticket_id = %ticket_id, lots = result.lots.len(), "Direct import completed");
        TICKETS_COMMITTED.with_label_values(&["import", "completed"]).inc();

        let mut events = log.into_events();
        events.push(Event::ImportTicketCreated {
            ticket_id,
            status: result.details.ticket.status.clone(),
        });
        publish(&event_sender, events).await;

        Ok(result)
    }
}

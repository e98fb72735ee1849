use async_trait::async_trait;
use sea_orm::TransactionTrait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use validator::Validate;

use super::{create_ticket, validate_items, ExportItemRequest, ExportTicketHeader, LineEffect};
use crate::commands::lot_writes::LotWriteLog;
use crate::commands::{map_txn_error, publish, Command};
use crate::db::DbPool;
use crate::entities::TicketStatus;
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::metrics::{record_failure, TICKETS_COMMITTED};
use crate::services::tickets::ExportTicketDetails;

/// Persists an export draft as a pending ticket and soft-locks its stock.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SaveExportDraftCommand {
    #[validate]
    #[serde(flatten)]
    pub header: ExportTicketHeader,
    pub items: Vec<ExportItemRequest>,
}

#[async_trait]
impl Command for SaveExportDraftCommand {
    type Result = ExportTicketDetails;

    #[instrument(skip(self, db_pool, event_sender), fields(partner_id = %self.header.partner_id))]
    async fn execute(
        &self,
        db_pool: Arc<DbPool>,
        event_sender: Arc<EventSender>,
    ) -> Result<Self::Result, ServiceError> {
        self.run(db_pool, event_sender)
            .await
            .map_err(|e| record_failure("save_export_draft", e))
    }
}

impl SaveExportDraftCommand {
    async fn run(
        &self,
        db_pool: Arc<DbPool>,
        event_sender: Arc<EventSender>,
    ) -> Result<ExportTicketDetails, ServiceError> {
        self.validate()?;
        validate_items(&self.items)?;

        let (details, log) = db_pool
            .transaction::<_, (ExportTicketDetails, LotWriteLog), ServiceError>(|txn| {
                let header = self.header.clone();
                let items = self.items.clone();
                Box::pin(async move {
                    let mut log = LotWriteLog::new();
                    let (ticket, items) = create_ticket(
                        txn,
                        &header,
                        &items,
                        TicketStatus::Pending,
                        LineEffect::Allocate,
                        &mut log,
                    )
                    .await?;
                    Ok((ExportTicketDetails { ticket, items }, log))
                })
            })
            .await
            .map_err(map_txn_error)?;

        info!(
            ticket_id = %details.ticket.id,
            lines = details.items.len(),
            lots = log.len(),
            quantity = details.total_quantity(),
            "Export draft saved"
        );
        TICKETS_COMMITTED.with_label_values(&["export", "pending"]).inc();

        let mut events = log.into_events();
        events.push(Event::ExportTicketCreated {
            ticket_id: details.ticket.id,
            status: details.ticket.status.clone(),
        });
        publish(&event_sender, events).await;

        Ok(details)
    }
}

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::TransactionTrait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

use super::direct_import_command::ImportResult;
use super::{create_lots, transition};
use crate::commands::lot_writes::LotWriteLog;
use crate::commands::{map_txn_error, publish, Command};
use crate::db::DbPool;
use crate::entities::TicketStatus;
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::metrics::{record_failure, TICKETS_COMMITTED};
use crate::services::tickets::{ensure_pending, load_import_ticket, ImportTicketDetails};

/// Completes a pending import by creating one lot per line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmImportCommand {
    pub ticket_id: Uuid,
}

#[async_trait]
impl Command for ConfirmImportCommand {
    type Result = ImportResult;

    #[instrument(skip(self, db_pool, event_sender), fields(ticket_id = %self.ticket_id))]
    async fn execute(
        &self,
        db_pool: Arc<DbPool>,
        event_sender: Arc<EventSender>,
    ) -> Result<Self::Result, ServiceError> {
        let ticket_id = self.ticket_id;

        let (result, log) = db_pool
            .transaction::<_, (ImportResult, LotWriteLog), ServiceError>(|txn| {
                Box::pin(async move {
                    let current = load_import_ticket(txn, ticket_id).await?;
                    ensure_pending(
                        &current.ticket.status,
                        format_args!("Import ticket {}", ticket_id),
                    )?;
                    if current.items.is_empty() {
                        return Err(ServiceError::ValidationError(format!(
                            "Import ticket {} has no lines",
                            ticket_id
                        )));
                    }

                    let mut log = LotWriteLog::new();
                    let lots =
                        create_lots(txn, &current.items, &current.ticket.partner_id, &mut log)
                            .await?;
                    let ticket =
                        transition(txn, ticket_id, TicketStatus::Completed, Utc::now()).await?;

                    Ok((
                        ImportResult {
                            details: ImportTicketDetails {
                                ticket,
                                items: current.items,
                            },
                            lots,
                        },
                        log,
                    ))
                })
            })
            .await
            .map_err(map_txn_error)
            .map_err(|e| record_failure("confirm_import", e))?;

        info!(ticket_id = %ticket_id, lots = result.lots.len(), "Import ticket confirmed");
        TICKETS_COMMITTED.with_label_values(&["import", "completed"]).inc();

        let mut events = log.into_events();
        events.push(Event::ImportTicketConfirmed(ticket_id));
        publish(&event_sender, events).await;

        Ok(result)
    }
}

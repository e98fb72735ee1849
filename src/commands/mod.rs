use crate::{
    db::DbPool,
    entities::{partner, product, product::normalize_code},
    errors::ServiceError,
    events::{Event, EventSender},
};
use async_trait::async_trait;
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, TransactionError};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::error;

pub mod export_tickets;
pub mod import_tickets;
pub mod lot_writes;
pub mod lots;

/// Command trait for implementing the Command Pattern
///
/// This trait allows for encapsulating all the logic needed to execute a business operation
/// into a single object that can be validated, executed, and produce events.
#[async_trait]
pub trait Command: Send + Sync {
    /// The return type of the command when executed successfully
    type Result;

    /// Execute the command with the given dependencies
    ///
    /// # Arguments
    /// * `db_pool` - Database connection pool for persistence operations
    /// * `event_sender` - Channel to publish domain events
    async fn execute(
        &self,
        db_pool: Arc<DbPool>,
        event_sender: Arc<EventSender>,
    ) -> Result<Self::Result, ServiceError>;
}

pub(crate) fn map_txn_error(e: TransactionError<ServiceError>) -> ServiceError {
    match e {
        TransactionError::Connection(db_err) => ServiceError::DatabaseError(db_err),
        TransactionError::Transaction(service_err) => service_err,
    }
}

/// Publishes events for an operation that has already committed.
///
/// A send failure is logged and swallowed: the write stands, and any summary it
/// would have refreshed is repaired by the next write to that product or by a backfill.
pub(crate) async fn publish(event_sender: &EventSender, events: Vec<Event>) {
    if let Err(e) = event_sender.send_all(events).await {
        error!(error = %e, "Failed to publish events after commit");
    }
}

pub(crate) async fn ensure_partner_exists<C: ConnectionTrait>(
    conn: &C,
    partner_id: &str,
) -> Result<(), ServiceError> {
    partner::Entity::find_by_id(partner_id.to_string())
        .one(conn)
        .await
        .map_err(ServiceError::db_error)?
        .map(|_| ())
        .ok_or_else(|| ServiceError::NotFound(format!("Partner {} not found", partner_id)))
}

/// Loads every referenced product, keyed by normalized code; any missing code is an error.
pub(crate) async fn load_products<C, I>(
    conn: &C,
    codes: I,
) -> Result<HashMap<String, product::Model>, ServiceError>
where
    C: ConnectionTrait,
    I: IntoIterator<Item = String>,
{
    let codes: BTreeSet<String> = codes.into_iter().map(|c| normalize_code(&c)).collect();
    let found: HashMap<String, product::Model> = product::Entity::find()
        .filter(product::Column::Id.is_in(codes.iter().cloned()))
        .all(conn)
        .await
        .map_err(ServiceError::db_error)?
        .into_iter()
        .map(|p| (p.id.clone(), p))
        .collect();

    if let Some(missing) = codes.iter().find(|code| !found.contains_key(*code)) {
        return Err(ServiceError::NotFound(format!("Product {} not found", missing)));
    }
    Ok(found)
}

/// Rejects tickets without lines.
pub(crate) fn ensure_has_lines<T>(lines: &[T]) -> Result<(), ServiceError> {
    if lines.is_empty() {
        return Err(ServiceError::ValidationError(
            "Ticket must have at least one line".to_string(),
        ));
    }
    Ok(())
}

/// Rejects non-positive line quantities.
pub(crate) fn ensure_positive_quantities<I>(quantities: I) -> Result<(), ServiceError>
where
    I: IntoIterator<Item = i64>,
{
    for (index, quantity) in quantities.into_iter().enumerate() {
        if quantity <= 0 {
            return Err(ServiceError::ValidationError(format!(
                "Line {} has non-positive quantity {}",
                index + 1,
                quantity
            )));
        }
    }
    Ok(())
}

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, TransactionTrait};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use crate::commands::import_tickets::parse_expiry_date;
use crate::commands::{load_products, map_txn_error, publish, Command};
use crate::db::DbPool;
use crate::entities::inventory_lot::{self, Entity as InventoryLot};
use crate::entities::product::normalize_code;
use crate::errors::ServiceError;
use crate::events::{Event, EventSender, LotWrite};
use crate::metrics::record_failure;

/// Edits the descriptive fields of a lot.
///
/// Omitted fields are left alone; an empty string clears an optional field.
/// Quantities cannot be edited here. Moving a lot to another product is refused
/// while the lot carries soft-locked quantity.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct UpdateLotCommand {
    #[serde(default)]
    pub lot_id: Uuid,
    /// Version the caller read; a mismatch fails with a concurrency conflict
    pub expected_version: Option<i32>,
    #[validate(length(min = 1, max = 64))]
    pub product_id: Option<String>,
    #[validate(length(max = 100))]
    pub lot_number: Option<String>,
    pub expiry_date: Option<String>,
    pub supplier_id: Option<String>,
    #[validate(length(max = 2000))]
    pub notes: Option<String>,
}

fn blank_to_none(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

#[async_trait]
impl Command for UpdateLotCommand {
    type Result = inventory_lot::Model;

    #[instrument(skip(self, db_pool, event_sender), fields(lot_id = %self.lot_id))]
    async fn execute(
        &self,
        db_pool: Arc<DbPool>,
        event_sender: Arc<EventSender>,
    ) -> Result<Self::Result, ServiceError> {
        self.validate()
            .map_err(|e| record_failure("update_lot", e.into()))?;
        let expiry_date = match &self.expiry_date {
            Some(raw) => Some(parse_expiry_date(raw).map_err(|e| record_failure("update_lot", e))?),
            None => None,
        };

        let (before, after) = db_pool
            .transaction::<_, (inventory_lot::Model, inventory_lot::Model), ServiceError>(|txn| {
                let cmd = self.clone();
                Box::pin(async move {
                    let before = InventoryLot::find_by_id(cmd.lot_id)
                        .one(txn)
                        .await
                        .map_err(ServiceError::db_error)?
                        .ok_or_else(|| {
                            ServiceError::NotFound(format!("Lot {} not found", cmd.lot_id))
                        })?;

                    if let Some(expected) = cmd.expected_version {
                        if expected != before.version {
                            return Err(ServiceError::ConcurrentModification(cmd.lot_id));
                        }
                    }

                    let mut after = before.clone();
                    if let Some(raw) = &cmd.product_id {
                        let product_id = normalize_code(raw);
                        if product_id != before.product_id {
                            if before.quantity_allocated > 0 {
                                return Err(ServiceError::Conflict(format!(
                                    "Lot {} has {} allocated; release pending exports \
                                     before moving it to another product",
                                    before.id, before.quantity_allocated
                                )));
                            }
                            let products = load_products(txn, [product_id.clone()]).await?;
                            after.subgroup =
                                products.get(&product_id).and_then(|p| p.subgroup.clone());
                            after.product_id = product_id;
                        }
                    }
                    if let Some(lot_number) = &cmd.lot_number {
                        after.lot_number = blank_to_none(lot_number);
                    }
                    if let Some(expiry) = expiry_date {
                        after.expiry_date = expiry;
                    }
                    if let Some(supplier_id) = &cmd.supplier_id {
                        after.supplier_id = blank_to_none(supplier_id);
                    }
                    if let Some(notes) = &cmd.notes {
                        after.notes = blank_to_none(notes);
                    }
                    after.version = before.version + 1;
                    after.updated_at = Utc::now();

                    let result = InventoryLot::update_many()
                        .col_expr(
                            inventory_lot::Column::ProductId,
                            Expr::value(after.product_id.clone()),
                        )
                        .col_expr(
                            inventory_lot::Column::LotNumber,
                            Expr::value(after.lot_number.clone()),
                        )
                        .col_expr(inventory_lot::Column::ExpiryDate, Expr::value(after.expiry_date))
                        .col_expr(
                            inventory_lot::Column::SupplierId,
                            Expr::value(after.supplier_id.clone()),
                        )
                        .col_expr(inventory_lot::Column::Notes, Expr::value(after.notes.clone()))
                        .col_expr(
                            inventory_lot::Column::Subgroup,
                            Expr::value(after.subgroup.clone()),
                        )
                        .col_expr(inventory_lot::Column::Version, Expr::value(after.version))
                        .col_expr(inventory_lot::Column::UpdatedAt, Expr::value(after.updated_at))
                        .filter(inventory_lot::Column::Id.eq(before.id))
                        .filter(inventory_lot::Column::Version.eq(before.version))
                        .exec(txn)
                        .await
                        .map_err(ServiceError::db_error)?;
                    if result.rows_affected == 0 {
                        warn!(lot_id = %before.id, "Lot changed concurrently");
                        return Err(ServiceError::ConcurrentModification(before.id));
                    }

                    Ok((before, after))
                })
            })
            .await
            .map_err(map_txn_error)
            .map_err(|e| record_failure("update_lot", e))?;

        info!(
            lot_id = %after.id,
            product_id = %after.product_id,
            moved = before.product_id != after.product_id,
            "Lot updated"
        );

        let result = after.clone();
        publish(&event_sender, vec![Event::LotWritten(LotWrite::Updated { before, after })]).await;
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_values_clear_fields() {
        assert_eq!(blank_to_none("  "), None);
        assert_eq!(blank_to_none(" L9 "), Some("L9".to_string()));
    }

    #[test]
    fn omitted_fields_pass_validation() {
        let cmd = UpdateLotCommand {
            lot_id: Uuid::new_v4(),
            ..Default::default()
        };
        assert!(cmd.validate().is_ok());

        let bad = UpdateLotCommand {
            product_id: Some(String::new()),
            ..cmd
        };
        assert!(bad.validate().is_err());
    }
}

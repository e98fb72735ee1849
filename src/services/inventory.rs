use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, QueryOrder};
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

use crate::db::DbPool;
use crate::entities::inventory_lot::{self, Entity as InventoryLot};
use crate::entities::product::normalize_code;
use crate::errors::ServiceError;

/// Read access to inventory lots.
#[derive(Clone)]
pub struct InventoryLotService {
    db_pool: Arc<DbPool>,
}

impl InventoryLotService {
    pub fn new(db_pool: Arc<DbPool>) -> Self {
        Self { db_pool }
    }

    #[instrument(skip(self))]
    pub async fn get_lot(&self, id: Uuid) -> Result<inventory_lot::Model, ServiceError> {
        InventoryLot::find_by_id(id)
            .one(&*self.db_pool)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("Lot {} not found", id)))
    }

    /// Lots in FEFO order, optionally for one product. Drained lots are included
    /// unless `in_stock_only` is set.
    #[instrument(skip(self))]
    pub async fn list_lots(
        &self,
        product_id: Option<&str>,
        in_stock_only: bool,
    ) -> Result<Vec<inventory_lot::Model>, ServiceError> {
        let mut query = InventoryLot::find();
        if let Some(product_id) = product_id {
            query = query.filter(inventory_lot::Column::ProductId.eq(normalize_code(product_id)));
        }
        if in_stock_only {
            query = query.filter(inventory_lot::Column::QuantityRemaining.gt(0));
        }

        let mut lots = query
            .order_by_asc(inventory_lot::Column::ProductId)
            .all(&*self.db_pool)
            .await
            .map_err(ServiceError::db_error)?;
        lots.sort_by(|a, b| {
            a.product_id
                .cmp(&b.product_id)
                .then_with(|| crate::services::allocation::fefo_cmp(a, b))
        });
        Ok(lots)
    }
}

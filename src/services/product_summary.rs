//! Per-product stock summaries derived from the lot store.
//!
//! A summary is a cache: it is recomputed from scratch for a product whenever
//! one of that product's lots is written, and can be rebuilt for every product
//! with [`ProductSummaryService::backfill_all`]. Recomputing is idempotent, so a
//! duplicated or replayed lot event is harmless.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

use crate::commands::map_txn_error;
use crate::db::DbPool;
use crate::entities::inventory_lot::{self, Entity as InventoryLot};
use crate::entities::product::{self, normalize_code};
use crate::entities::product_summary::{self, Entity as ProductSummary};
use crate::errors::ServiceError;
use crate::events::{Event, EventHandler, LotWrite};
use crate::metrics::SUMMARY_RECOMPUTATIONS;

pub const DEFAULT_BATCH_SIZE: usize = 400;

/// Stock figures for one product, over lots with positive remaining quantity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockAggregate {
    pub total_remaining: i64,
    pub nearest_expiry_date: Option<NaiveDate>,
    pub lot_count: i32,
}

/// Aggregates `lots`, ignoring those without stock. `None` when nothing is left.
pub fn aggregate<'a, I>(lots: I) -> Option<StockAggregate>
where
    I: IntoIterator<Item = &'a inventory_lot::Model>,
{
    let mut result: Option<StockAggregate> = None;
    for lot in lots.into_iter().filter(|l| l.quantity_remaining > 0) {
        let agg = result.get_or_insert(StockAggregate {
            total_remaining: 0,
            nearest_expiry_date: None,
            lot_count: 0,
        });
        agg.total_remaining += lot.quantity_remaining;
        agg.lot_count += 1;
        agg.nearest_expiry_date = match (agg.nearest_expiry_date, lot.expiry_date) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
    }
    result
}

/// Builds the summary row for `product_id`, copying display fields from the master record.
pub fn build_summary(
    product_id: &str,
    aggregate: StockAggregate,
    product: Option<&product::Model>,
    now: DateTime<Utc>,
) -> product_summary::Model {
    product_summary::Model {
        product_id: product_id.to_string(),
        total_remaining: aggregate.total_remaining,
        nearest_expiry_date: aggregate.nearest_expiry_date,
        lot_count: aggregate.lot_count,
        product_name: product.map(|p| p.name.clone()),
        unit: product.and_then(|p| p.unit.clone()),
        packaging: product.and_then(|p| p.packaging.clone()),
        storage_temp: product.and_then(|p| p.storage_temp.clone()),
        manufacturer: product.and_then(|p| p.manufacturer.clone()),
        team: product.and_then(|p| p.team.clone()),
        subgroup: product.and_then(|p| p.subgroup.clone()),
        updated_at: now,
    }
}

/// Builds every summary from a full lot listing, keyed by product.
pub fn build_all(
    lots: &[inventory_lot::Model],
    products: &HashMap<String, product::Model>,
    now: DateTime<Utc>,
) -> BTreeMap<String, product_summary::Model> {
    let mut by_product: BTreeMap<&str, Vec<&inventory_lot::Model>> = BTreeMap::new();
    for lot in lots {
        by_product.entry(lot.product_id.as_str()).or_default().push(lot);
    }

    by_product
        .into_iter()
        .filter_map(|(product_id, lots)| {
            aggregate(lots).map(|agg| {
                let summary = build_summary(product_id, agg, products.get(product_id), now);
                (product_id.to_string(), summary)
            })
        })
        .collect()
}

fn into_active(summary: product_summary::Model) -> product_summary::ActiveModel {
    product_summary::ActiveModel {
        product_id: Set(summary.product_id),
        total_remaining: Set(summary.total_remaining),
        nearest_expiry_date: Set(summary.nearest_expiry_date),
        lot_count: Set(summary.lot_count),
        product_name: Set(summary.product_name),
        unit: Set(summary.unit),
        packaging: Set(summary.packaging),
        storage_temp: Set(summary.storage_temp),
        manufacturer: Set(summary.manufacturer),
        team: Set(summary.team),
        subgroup: Set(summary.subgroup),
        updated_at: Set(summary.updated_at),
    }
}

/// Outcome of one product recomputation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Recomputed {
    Upserted { summary: product_summary::Model },
    Deleted { product_id: String },
}

/// Result of a full rebuild, shaped for admin callers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackfillReport {
    pub status: String,
    pub message: String,
    pub summaries_written: u64,
    pub lots_scanned: u64,
    pub batches: u64,
}

impl BackfillReport {
    pub fn failed(err: &ServiceError) -> Self {
        Self {
            status: "error".to_string(),
            message: format!("Backfill failed: {}", err),
            summaries_written: 0,
            lots_scanned: 0,
            batches: 0,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == "success"
    }
}

/// Recomputes the summary of one product through `conn`.
pub async fn recompute_on<C: ConnectionTrait>(
    conn: &C,
    product_id: &str,
) -> Result<Recomputed, ServiceError> {
    let lots = InventoryLot::find()
        .filter(inventory_lot::Column::ProductId.eq(product_id))
        .filter(inventory_lot::Column::QuantityRemaining.gt(0))
        .all(conn)
        .await
        .map_err(ServiceError::db_error)?;

    let Some(agg) = aggregate(&lots) else {
        ProductSummary::delete_by_id(product_id.to_string())
            .exec(conn)
            .await
            .map_err(ServiceError::db_error)?;
        return Ok(Recomputed::Deleted {
            product_id: product_id.to_string(),
        });
    };

    let product = product::Entity::find_by_id(product_id.to_string())
        .one(conn)
        .await
        .map_err(ServiceError::db_error)?;
    if product.is_none() {
        warn!(product_id, "Summarizing stock of a product missing from the catalog");
    }

    let summary = build_summary(product_id, agg, product.as_ref(), Utc::now());
    ProductSummary::insert(into_active(summary.clone()))
        .on_conflict(
            OnConflict::column(product_summary::Column::ProductId)
                .update_columns([
                    product_summary::Column::TotalRemaining,
                    product_summary::Column::NearestExpiryDate,
                    product_summary::Column::LotCount,
                    product_summary::Column::ProductName,
                    product_summary::Column::Unit,
                    product_summary::Column::Packaging,
                    product_summary::Column::StorageTemp,
                    product_summary::Column::Manufacturer,
                    product_summary::Column::Team,
                    product_summary::Column::Subgroup,
                    product_summary::Column::UpdatedAt,
                ])
                .to_owned(),
        )
        .exec_without_returning(conn)
        .await
        .map_err(ServiceError::db_error)?;

    Ok(Recomputed::Upserted { summary })
}

#[derive(Clone)]
pub struct ProductSummaryService {
    db_pool: Arc<DbPool>,
    batch_size: usize,
}

impl ProductSummaryService {
    pub fn new(db_pool: Arc<DbPool>) -> Self {
        Self::with_batch_size(db_pool, DEFAULT_BATCH_SIZE)
    }

    pub fn with_batch_size(db_pool: Arc<DbPool>, batch_size: usize) -> Self {
        Self {
            db_pool,
            batch_size: batch_size.max(1),
        }
    }

    #[instrument(skip(self))]
    pub async fn recompute_for_product(
        &self,
        product_id: &str,
    ) -> Result<Recomputed, ServiceError> {
        let product_id = normalize_code(product_id);
        let outcome = recompute_on(&*self.db_pool, &product_id).await;
        let label = match &outcome {
            Ok(Recomputed::Upserted { .. }) => "upserted",
            Ok(Recomputed::Deleted { .. }) => "deleted",
            Err(_) => "failed",
        };
        SUMMARY_RECOMPUTATIONS.with_label_values(&[label]).inc();
        debug!(product_id = %product_id, outcome = label, "Recomputed product summary");
        outcome
    }

    /// Recomputes every product the write touched; a product change touches two.
    #[instrument(skip(self, write), fields(lot_id = %write.lot_id()))]
    pub async fn handle_lot_write(
        &self,
        write: &LotWrite,
    ) -> Result<Vec<Recomputed>, ServiceError> {
        let mut outcomes = Vec::new();
        for product_id in write.affected_product_ids() {
            outcomes.push(self.recompute_for_product(&product_id).await?);
        }
        Ok(outcomes)
    }

    /// Replaces every summary with one computed from the full lot store.
    ///
    /// Runs in one transaction: readers see either the old set or the new one.
    #[instrument(skip(self))]
    pub async fn backfill_all(&self) -> Result<BackfillReport, ServiceError> {
        let batch_size = self.batch_size;
        let report = self
            .db_pool
            .transaction::<_, BackfillReport, ServiceError>(|txn| {
                Box::pin(async move {
                    let lots = InventoryLot::find()
                        .all(txn)
                        .await
                        .map_err(ServiceError::db_error)?;
                    let products: HashMap<String, product::Model> = product::Entity::find()
                        .all(txn)
                        .await
                        .map_err(ServiceError::db_error)?
                        .into_iter()
                        .map(|p| (p.id.clone(), p))
                        .collect();

                    let summaries = build_all(&lots, &products, Utc::now());

                    ProductSummary::delete_many()
                        .exec(txn)
                        .await
                        .map_err(ServiceError::db_error)?;

                    let rows: Vec<product_summary::ActiveModel> =
                        summaries.into_values().map(into_active).collect();
                    let mut batches = 0u64;
                    for chunk in rows.chunks(batch_size) {
                        ProductSummary::insert_many(chunk.to_vec())
                            .exec_without_returning(txn)
                            .await
                            .map_err(ServiceError::db_error)?;
                        batches += 1;
                    }

                    Ok(BackfillReport {
                        status: "success".to_string(),
                        message: format!(
                            "Rebuilt {} product summaries from {} lots",
                            rows.len(),
                            lots.len()
                        ),
                        summaries_written: rows.len() as u64,
                        lots_scanned: lots.len() as u64,
                        batches,
                    })
                })
            })
            .await
            .map_err(map_txn_error);

        match &report {
            Ok(report) => info!(
                summaries = report.summaries_written,
                lots = report.lots_scanned,
                batches = report.batches,
                "Product summaries rebuilt"
            ),
            Err(e) => error!(error = %e, "Product summary backfill failed"),
        }
        report
    }

    #[instrument(skip(self))]
    pub async fn get(&self, product_id: &str) -> Result<product_summary::Model, ServiceError> {
        let product_id = normalize_code(product_id);
        ProductSummary::find_by_id(product_id.clone())
            .one(&*self.db_pool)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("No summary for product {}", product_id)))
    }

    /// Every summary, nearest expiry first.
    #[instrument(skip(self))]
    pub async fn list(&self) -> Result<Vec<product_summary::Model>, ServiceError> {
        ProductSummary::find()
            .order_by_asc(product_summary::Column::NearestExpiryDate)
            .order_by_asc(product_summary::Column::ProductId)
            .all(&*self.db_pool)
            .await
            .map_err(ServiceError::db_error)
    }
}

#[async_trait]
impl EventHandler for ProductSummaryService {
    async fn handle_event(&self, event: &Event) -> Result<(), ServiceError> {
        match event {
            Event::LotWritten(write) => self.handle_lot_write(write).await.map(|_| ()),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn lot(
        product_id: &str,
        remaining: i64,
        expiry: Option<(i32, u32, u32)>,
    ) -> inventory_lot::Model {
        let now = Utc::now();
        inventory_lot::Model {
            id: Uuid::new_v4(),
            product_id: product_id.into(),
            lot_number: Some("L1".into()),
            expiry_date: expiry.and_then(|(y, m, d)| NaiveDate::from_ymd_opt(y, m, d)),
            quantity_imported: remaining.max(1),
            quantity_remaining: remaining,
            quantity_allocated: 0,
            import_date: now,
            supplier_id: None,
            notes: None,
            subgroup: None,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn aggregate_ignores_empty_lots() {
        let lots = vec![
            lot("P", 5, Some((2026, 5, 1))),
            lot("P", 0, Some((2025, 1, 1))),
            lot("P", 3, None),
        ];
        let agg = aggregate(&lots).unwrap();
        assert_eq!(agg.total_remaining, 8);
        assert_eq!(agg.lot_count, 2);
        assert_eq!(agg.nearest_expiry_date, NaiveDate::from_ymd_opt(2026, 5, 1));
    }

    #[test]
    fn aggregate_of_drained_product_is_none() {
        assert!(aggregate(&[lot("P", 0, None)]).is_none());
        assert!(aggregate(&Vec::<inventory_lot::Model>::new()).is_none());
    }

    #[test]
    fn build_all_skips_products_without_stock() {
        let lots = vec![lot("A", 2, None), lot("B", 0, None), lot("A", 1, Some((2027, 1, 1)))];
        let summaries = build_all(&lots, &HashMap::new(), Utc::now());
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries["A"].total_remaining, 3);
        assert_eq!(summaries["A"].product_name, None);
    }
}

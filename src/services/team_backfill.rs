//! One-off repair that copies each product's current team onto its export lines.

use sea_orm::sea_query::Expr;
use sea_orm::{
    ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument};

use crate::db::DbPool;
use crate::entities::{export_ticket_item, product};
use crate::errors::ServiceError;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TeamBackfillReport {
    pub lines_scanned: u64,
    pub lines_updated: u64,
    /// Lines whose product is no longer in the catalog
    pub lines_without_product: u64,
    pub batches: u64,
}

#[derive(Clone)]
pub struct TeamBackfillService {
    db_pool: Arc<DbPool>,
}

impl TeamBackfillService {
    pub fn new(db_pool: Arc<DbPool>) -> Self {
        Self { db_pool }
    }

    /// Walks export lines page by page and rewrites `team` where it differs from the product.
    #[instrument(skip(self))]
    pub async fn run(&self, batch_size: u64) -> Result<TeamBackfillReport, ServiceError> {
        let db = &*self.db_pool;
        let teams: HashMap<String, Option<String>> = product::Entity::find()
            .all(db)
            .await
            .map_err(ServiceError::db_error)?
            .into_iter()
            .map(|p| (p.id, p.team))
            .collect();

        let mut report = TeamBackfillReport::default();
        let mut pages = export_ticket_item::Entity::find()
            .order_by_asc(export_ticket_item::Column::Id)
            .paginate(db, batch_size.max(1));

        while let Some(lines) = pages.fetch_and_next().await.map_err(ServiceError::db_error)? {
            report.batches += 1;
            let mut changes = Vec::new();
            for line in lines {
                report.lines_scanned += 1;
                let Some(team) = teams.get(&line.product_id) else {
                    report.lines_without_product += 1;
                    continue;
                };
                if line.team != *team {
                    changes.push((line.id, team.clone()));
                }
            }

            if !changes.is_empty() {
                // a page is written all-or-nothing
                let txn = db.begin().await.map_err(ServiceError::db_error)?;
                for (line_id, team) in &changes {
                    export_ticket_item::Entity::update_many()
                        .col_expr(export_ticket_item::Column::Team, Expr::value(team.clone()))
                        .filter(export_ticket_item::Column::Id.eq(*line_id))
                        .exec(&txn)
                        .await
                        .map_err(ServiceError::db_error)?;
                }
                txn.commit().await.map_err(ServiceError::db_error)?;
                report.lines_updated += changes.len() as u64;
            }
            info!(
                batch = report.batches,
                scanned = report.lines_scanned,
                updated = report.lines_updated,
                "Export team batch processed"
            );
        }

        Ok(report)
    }
}

// Stock allocation and lot queries
pub mod allocation;
pub mod inventory;

// Ticket reads
pub mod tickets;

// Derived data
pub mod product_summary;
pub mod team_backfill;

use std::sync::Arc;

use crate::db::DbPool;

use self::allocation::AllocationService;
use self::inventory::InventoryLotService;
use self::product_summary::ProductSummaryService;
use self::team_backfill::TeamBackfillService;
use self::tickets::TicketQueryService;
use crate::reconciliation::ReconciliationService;

/// Services shared by the HTTP handlers, all over the same injected pool.
#[derive(Clone)]
pub struct AppServices {
    pub allocation: Arc<AllocationService>,
    pub lots: Arc<InventoryLotService>,
    pub tickets: Arc<TicketQueryService>,
    pub summaries: Arc<ProductSummaryService>,
    pub team_backfill: Arc<TeamBackfillService>,
    pub reconciliation: Arc<ReconciliationService>,
}

impl AppServices {
    pub fn new(db_pool: Arc<DbPool>, summary_batch_size: usize, stale_pending_days: i64) -> Self {
        Self {
            allocation: Arc::new(AllocationService::new(db_pool.clone())),
            lots: Arc::new(InventoryLotService::new(db_pool.clone())),
            tickets: Arc::new(TicketQueryService::new(db_pool.clone())),
            summaries: Arc::new(ProductSummaryService::with_batch_size(
                db_pool.clone(),
                summary_batch_size,
            )),
            team_backfill: Arc::new(TeamBackfillService::new(db_pool.clone())),
            reconciliation: Arc::new(ReconciliationService::new(db_pool, stale_pending_days)),
        }
    }
}

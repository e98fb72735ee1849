use sea_orm::{ConnectionTrait, EntityTrait};
use std::collections::{HashMap, HashSet};

use crate::entities::{
    allowlist_entry, export_ticket, export_ticket_item, import_ticket, import_ticket_item,
    inventory_lot, partner, product, product_summary, user_account, TicketStatus,
};
use crate::errors::ServiceError;

/// Every collection the checks look at, read once.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub products: Vec<product::Model>,
    pub partners: Vec<partner::Model>,
    pub lots: Vec<inventory_lot::Model>,
    pub import_tickets: Vec<import_ticket::Model>,
    pub import_items: Vec<import_ticket_item::Model>,
    pub export_tickets: Vec<export_ticket::Model>,
    pub export_items: Vec<export_ticket_item::Model>,
    pub summaries: Vec<product_summary::Model>,
    pub allowlist: Vec<allowlist_entry::Model>,
    pub users: Vec<user_account::Model>,
}

impl Snapshot {
    pub async fn load<C: ConnectionTrait>(conn: &C) -> Result<Self, ServiceError> {
        Ok(Self {
            products: product::Entity::find().all(conn).await?,
            partners: partner::Entity::find().all(conn).await?,
            lots: inventory_lot::Entity::find().all(conn).await?,
            import_tickets: import_ticket::Entity::find().all(conn).await?,
            import_items: import_ticket_item::Entity::find().all(conn).await?,
            export_tickets: export_ticket::Entity::find().all(conn).await?,
            export_items: export_ticket_item::Entity::find().all(conn).await?,
            summaries: product_summary::Entity::find().all(conn).await?,
            allowlist: allowlist_entry::Entity::find().all(conn).await?,
            users: user_account::Entity::find().all(conn).await?,
        })
    }

    pub fn products_by_id(&self) -> HashMap<&str, &product::Model> {
        self.products.iter().map(|p| (p.id.as_str(), p)).collect()
    }

    pub fn partner_ids(&self) -> HashSet<&str> {
        self.partners.iter().map(|p| p.id.as_str()).collect()
    }

    pub fn lots_by_product(&self) -> HashMap<&str, Vec<&inventory_lot::Model>> {
        let mut map: HashMap<&str, Vec<&inventory_lot::Model>> = HashMap::new();
        for lot in &self.lots {
            map.entry(lot.product_id.as_str()).or_default().push(lot);
        }
        map
    }

    /// Ids of export tickets still holding soft locks.
    pub fn pending_export_ids(&self) -> HashSet<uuid::Uuid> {
        self.export_tickets
            .iter()
            .filter(|t| t.ticket_status() == Some(TicketStatus::Pending))
            .map(|t| t.id)
            .collect()
    }
}

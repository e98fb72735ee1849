use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lot-creation data carried by an import ticket until it is confirmed.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "import_ticket_items")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub ticket_id: Uuid,
    pub product_id: String,
    pub lot_number: Option<String>,
    /// Expiry as typed by the operator; parsed when the lot is created
    pub expiry_date: Option<String>,
    pub quantity: i64,
    pub notes: Option<String>,
    pub position: i32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::import_ticket::Entity",
        from = "Column::TicketId",
        to = "super::import_ticket::Column::Id",
        on_delete = "Cascade"
    )]
    Ticket,
}

impl Related<super::import_ticket::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Ticket.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

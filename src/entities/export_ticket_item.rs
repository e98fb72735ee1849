use chrono::NaiveDate;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One lot drawn by an export ticket.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "export_ticket_items")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub ticket_id: Uuid,
    pub lot_id: Uuid,
    pub product_id: String,
    pub lot_number: String,
    pub expiry_date: Option<NaiveDate>,
    pub quantity: i64,
    /// Denormalized from the product's team
    pub team: Option<String>,
    pub position: i32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::export_ticket::Entity",
        from = "Column::TicketId",
        to = "super::export_ticket::Column::Id",
        on_delete = "Cascade"
    )]
    Ticket,
}

impl Related<super::export_ticket::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Ticket.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveValue, Set};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lot number used for lots received without a batch number.
pub const NO_LOT_NUMBER: &str = "N/A";

/// One receipt of stock for one product.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "inventory_lots")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub product_id: String,
    pub lot_number: Option<String>,
    pub expiry_date: Option<NaiveDate>,
    /// Set once at creation
    pub quantity_imported: i64,
    pub quantity_remaining: i64,
    /// Soft-locked by pending export tickets
    pub quantity_allocated: i64,
    pub import_date: DateTime<Utc>,
    pub supplier_id: Option<String>,
    pub notes: Option<String>,
    /// Copied from the product at creation
    pub subgroup: Option<String>,
    /// Bumped on every write; conditional updates compare against it
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::product::Entity",
        from = "Column::ProductId",
        to = "super::product::Column::Id"
    )]
    Product,
}

impl Related<super::product::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Product.def()
    }
}

#[async_trait]
impl ActiveModelBehavior for ActiveModel {
    async fn before_save<C>(self, _db: &C, insert: bool) -> Result<Self, DbErr>
    where
        C: ConnectionTrait,
    {
        let mut active_model = self;
        let now = Utc::now();

        if insert {
            if let ActiveValue::NotSet = active_model.id {
                active_model.id = Set(Uuid::new_v4());
            }
            if let ActiveValue::NotSet = active_model.created_at {
                active_model.created_at = Set(now);
            }
            if let ActiveValue::NotSet = active_model.version {
                active_model.version = Set(0);
            }
        }

        if !active_model.updated_at.is_set() {
            active_model.updated_at = Set(now);
        }

        Ok(active_model)
    }
}

impl Model {
    /// Quantity that can still be soft-locked or exported.
    pub fn available(&self) -> i64 {
        self.quantity_remaining - self.quantity_allocated
    }

    /// Lot number as shown to users and used for aggregation.
    pub fn lot_key(&self) -> &str {
        normalize_lot_number(self.lot_number.as_deref())
    }
}

/// Maps a blank or missing lot number to [`NO_LOT_NUMBER`].
pub fn normalize_lot_number(raw: Option<&str>) -> &str {
    match raw.map(str::trim) {
        Some(value) if !value.is_empty() => value,
        _ => NO_LOT_NUMBER,
    }
}

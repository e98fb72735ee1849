use chrono::{DateTime, NaiveDate, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Denormalized stock view of one product; exists only while the product has stock.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "product_summaries")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub product_id: String,
    pub total_remaining: i64,
    pub nearest_expiry_date: Option<NaiveDate>,
    pub lot_count: i32,
    pub product_name: Option<String>,
    pub unit: Option<String>,
    pub packaging: Option<String>,
    pub storage_temp: Option<String>,
    pub manufacturer: Option<String>,
    pub team: Option<String>,
    pub subgroup: Option<String>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

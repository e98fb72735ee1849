use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Product master record, keyed by its human-assigned code.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize, Validate)]
#[sea_orm(table_name = "products")]
pub struct Model {
    /// Product code, stored uppercase
    #[sea_orm(primary_key, auto_increment = false)]
    #[validate(length(min = 1, max = 64, message = "Product code must be 1-64 characters"))]
    pub id: String,

    #[validate(length(
        min = 1,
        max = 255,
        message = "Product name must be between 1 and 255 characters"
    ))]
    pub name: String,

    /// Unit of measure ("box", "vial", ...)
    pub unit: Option<String>,
    pub packaging: Option<String>,
    /// Storage temperature class
    pub storage_temp: Option<String>,
    pub manufacturer: Option<String>,
    /// Organizational division owning the product
    pub team: Option<String>,
    /// Category driving the expiry policy
    pub subgroup: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::inventory_lot::Entity")]
    InventoryLots,
}

impl Related<super::inventory_lot::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::InventoryLots.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

/// Normalizes a product code the way it is stored: trimmed and uppercase.
pub fn normalize_code(raw: &str) -> String {
    raw.trim().to_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_trimmed_and_uppercased() {
        assert_eq!(normalize_code("  prd-01 "), "PRD-01");
        assert_eq!(normalize_code("Abc"), "ABC");
    }
}

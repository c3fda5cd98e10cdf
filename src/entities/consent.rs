use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "consent_records")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub partition_key: String,
    pub subject_name: String,
    pub subject_id: String,
    pub purpose: String,
    /// JSON array
    pub data_categories: String,
    pub collection_method: String,
    /// YYYY-MM-DD
    pub granted_at: String,
    pub retention_months: i32,
    /// YYYY-MM-DD
    pub expires_at: String,
    pub international_transfer: bool,
    /// JSON array
    pub destination_countries: String,
    pub notes: Option<String>,
    pub status: String,
    /// JSON array of history entries
    pub history: String,
    pub created_at: i64,
    pub updated_at: i64,
    pub version: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

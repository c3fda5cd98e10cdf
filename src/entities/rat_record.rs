use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "rat_records")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub partition_key: String,
    pub activity_name: String,
    pub purpose: String,
    pub legal_basis: String,
    pub data_categories: String,
    pub subject_categories: String,
    pub recipients: String,
    pub retention_period: String,
    pub international_transfer: bool,
    pub destination_countries: String,
    pub security_measures: Option<String>,
    pub owner: Option<String>,
    pub source: String,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

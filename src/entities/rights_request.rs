use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "rights_requests")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub partition_key: String,
    pub subject_name: String,
    pub subject_id: String,
    pub email: Option<String>,
    pub request_type: Option<String>,
    pub details: Option<String>,
    /// JSON array of URLs
    pub attachments: String,
    /// Status as sent by the form; used when `system_status` is unset
    pub status: Option<String>,
    pub system_status: Option<String>,
    pub notes: Option<String>,
    pub origin: String,
    pub ingested_at: i64,
    pub updated_at: Option<i64>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(RatRecords::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(RatRecords::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(string(RatRecords::PartitionKey))
                    .col(string(RatRecords::ActivityName))
                    .col(string(RatRecords::Purpose))
                    .col(string(RatRecords::LegalBasis))
                    .col(text(RatRecords::DataCategories))
                    .col(text(RatRecords::SubjectCategories))
                    .col(text(RatRecords::Recipients))
                    .col(string(RatRecords::RetentionPeriod))
                    .col(boolean(RatRecords::InternationalTransfer).default(false))
                    .col(text(RatRecords::DestinationCountries))
                    .col(text_null(RatRecords::SecurityMeasures))
                    .col(string_null(RatRecords::Owner))
                    .col(string(RatRecords::Source))
                    .col(big_integer(RatRecords::CreatedAt))
                    .col(big_integer(RatRecords::UpdatedAt))
                    .to_owned(),
            )
            .await?;

        // Listing is ordered by activity name
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_rat_records_activity")
                    .table(RatRecords::Table)
                    .col(RatRecords::ActivityName)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(RatRecords::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum RatRecords {
    Table,
    Id,
    PartitionKey,
    ActivityName,
    Purpose,
    LegalBasis,
    DataCategories,
    SubjectCategories,
    Recipients,
    RetentionPeriod,
    InternationalTransfer,
    DestinationCountries,
    SecurityMeasures,
    Owner,
    Source,
    CreatedAt,
    UpdatedAt,
}

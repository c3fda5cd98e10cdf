use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Create users table
        manager
            .create_table(
                Table::create()
                    .table(Users::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Users::Id).string().not_null().primary_key())
                    .col(string_uniq(Users::Email))
                    .col(string(Users::PasswordHash))
                    .col(string(Users::DisplayName))
                    .col(string(Users::Role))
                    .col(boolean(Users::Active).default(true))
                    .col(big_integer(Users::CreatedAt))
                    .to_owned(),
            )
            .await?;

        // Create sessions table
        manager
            .create_table(
                Table::create()
                    .table(Sessions::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Sessions::SessionId)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(string(Sessions::UserId))
                    .col(big_integer(Sessions::CreatedAt))
                    .col(big_integer(Sessions::ExpiresAt))
                    .col(string_null(Sessions::UserAgent))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_sessions_expires_at")
                    .table(Sessions::Table)
                    .col(Sessions::ExpiresAt)
                    .to_owned(),
            )
            .await?;

        // Create consent_records table
        manager
            .create_table(
                Table::create()
                    .table(ConsentRecords::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ConsentRecords::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(string(ConsentRecords::PartitionKey))
                    .col(string(ConsentRecords::SubjectName))
                    .col(string(ConsentRecords::SubjectId))
                    .col(string(ConsentRecords::Purpose))
                    .col(text(ConsentRecords::DataCategories))
                    .col(string(ConsentRecords::CollectionMethod))
                    .col(string(ConsentRecords::GrantedAt))
                    .col(integer(ConsentRecords::RetentionMonths))
                    .col(string(ConsentRecords::ExpiresAt))
                    .col(boolean(ConsentRecords::InternationalTransfer).default(false))
                    .col(text(ConsentRecords::DestinationCountries))
                    .col(text_null(ConsentRecords::Notes))
                    .col(string(ConsentRecords::Status))
                    .col(text(ConsentRecords::History))
                    .col(big_integer(ConsentRecords::CreatedAt))
                    .col(big_integer(ConsentRecords::UpdatedAt))
                    .col(big_integer(ConsentRecords::Version).default(1))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_consent_records_partition")
                    .table(ConsentRecords::Table)
                    .col(ConsentRecords::PartitionKey)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_consent_records_status")
                    .table(ConsentRecords::Table)
                    .col(ConsentRecords::Status)
                    .to_owned(),
            )
            .await?;

        // Create rights_requests table
        manager
            .create_table(
                Table::create()
                    .table(RightsRequests::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(RightsRequests::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(string(RightsRequests::PartitionKey))
                    .col(string(RightsRequests::SubjectName))
                    .col(string(RightsRequests::SubjectId))
                    .col(string_null(RightsRequests::Email))
                    .col(string_null(RightsRequests::RequestType))
                    .col(text_null(RightsRequests::Details))
                    .col(text(RightsRequests::Attachments))
                    .col(string_null(RightsRequests::Status))
                    .col(string_null(RightsRequests::SystemStatus))
                    .col(text_null(RightsRequests::Notes))
                    .col(string(RightsRequests::Origin))
                    .col(big_integer(RightsRequests::IngestedAt))
                    .col(big_integer_null(RightsRequests::UpdatedAt))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_rights_requests_ingested_at")
                    .table(RightsRequests::Table)
                    .col(RightsRequests::IngestedAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(RightsRequests::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(ConsentRecords::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Sessions::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Users::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Users {
    Table,
    Id,
    Email,
    PasswordHash,
    DisplayName,
    Role,
    Active,
    CreatedAt,
}

#[derive(DeriveIden)]
enum Sessions {
    Table,
    SessionId,
    UserId,
    CreatedAt,
    ExpiresAt,
    UserAgent,
}

#[derive(DeriveIden)]
enum ConsentRecords {
    Table,
    Id,
    PartitionKey,
    SubjectName,
    SubjectId,
    Purpose,
    DataCategories,
    CollectionMethod,
    GrantedAt,
    RetentionMonths,
    ExpiresAt,
    InternationalTransfer,
    DestinationCountries,
    Notes,
    Status,
    History,
    CreatedAt,
    UpdatedAt,
    Version,
}

#[derive(DeriveIden)]
enum RightsRequests {
    Table,
    Id,
    PartitionKey,
    SubjectName,
    SubjectId,
    Email,
    RequestType,
    Details,
    Attachments,
    Status,
    SystemStatus,
    Notes,
    Origin,
    IngestedAt,
    UpdatedAt,
}

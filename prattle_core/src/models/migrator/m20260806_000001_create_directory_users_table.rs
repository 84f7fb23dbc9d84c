use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(DirectoryUser::Table)
                    .col(pk_uuid(DirectoryUser::Id))
                    // Display name; not unique, several users may share it
                    .col(string(DirectoryUser::Username))
                    .col(uuid(DirectoryUser::PublicId))
                    .col(string_null(DirectoryUser::AvatarUrl))
                    .to_owned(),
            )
            .await?;

        // Create index on username for mention lookups
        manager
            .create_index(
                Index::create()
                    .name("idx_directory_users_username")
                    .table(DirectoryUser::Table)
                    .col(DirectoryUser::Username)
                    .to_owned(),
            )
            .await?;

        // Create unique index on public_id
        manager
            .create_index(
                Index::create()
                    .name("idx_directory_users_public_id")
                    .table(DirectoryUser::Table)
                    .col(DirectoryUser::PublicId)
                    .unique()
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(DirectoryUser::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum DirectoryUser {
    Table,
    Id,
    Username,
    PublicId,
    AvatarUrl,
}

use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Comment::Table)
                    .col(pk_uuid(Comment::Id))
                    // No FK on post_id: posts live in an external store
                    .col(uuid(Comment::PostId))
                    // No FK on author_id: the directory is an external
                    // projection and comments may outlive their author
                    .col(uuid(Comment::AuthorId))
                    .col(uuid_null(Comment::ParentId)) // For threaded replies
                    .col(integer(Comment::Depth))
                    .col(string(Comment::Content))
                    .col(timestamp_with_time_zone(Comment::CreatedAt))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-comment-parent_id")
                            .from(Comment::Table, Comment::ParentId)
                            .to(Comment::Table, Comment::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Create index on post_id
        manager
            .create_index(
                Index::create()
                    .name("idx_comments_post_id")
                    .table(Comment::Table)
                    .col(Comment::PostId)
                    .to_owned(),
            )
            .await?;

        // Create index on parent_id for reply and descendant lookups
        manager
            .create_index(
                Index::create()
                    .name("idx_comments_parent_id")
                    .table(Comment::Table)
                    .col(Comment::ParentId)
                    .to_owned(),
            )
            .await?;

        // Create index on created_at for thread ordering
        manager
            .create_index(
                Index::create()
                    .name("idx_comments_created_at")
                    .table(Comment::Table)
                    .col(Comment::CreatedAt)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Comment::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum Comment {
    Table,
    Id,
    PostId,
    AuthorId,
    ParentId,
    Depth,
    Content,
    CreatedAt,
}

use sea_orm_migration::{prelude::*, schema::*};

use super::m20260806_000002_create_comments_table::Comment;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(CommentMention::Table)
                    .col(pk_uuid(CommentMention::Id))
                    .col(uuid(CommentMention::CommentId))
                    // No FK on user_id: directory users are external
                    .col(uuid(CommentMention::UserId))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-comment-mention-comment_id")
                            .from(CommentMention::Table, CommentMention::CommentId)
                            .to(Comment::Table, Comment::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Mentions are a set per comment
        manager
            .create_index(
                Index::create()
                    .name("idx_comment_mentions_comment_user")
                    .table(CommentMention::Table)
                    .col(CommentMention::CommentId)
                    .col(CommentMention::UserId)
                    .unique()
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(CommentMention::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum CommentMention {
    Table,
    Id,
    CommentId,
    UserId,
}

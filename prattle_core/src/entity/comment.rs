use crate::ids::{CommentId, PostId, UserId};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "comment")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: CommentId,
    pub post_id: PostId,
    pub author_id: UserId,
    pub parent_id: Option<CommentId>, // NULL for root comments
    /// 1 = root, 2 = reply, 3 = nested reply (cap)
    pub depth: i32,
    pub content: String,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    // No database-level FK: the directory is an external projection, so a
    // comment may outlive its author. The join resolves to NULL in that case.
    #[sea_orm(
        belongs_to = "super::directory_user::Entity",
        from = "Column::AuthorId",
        to = "super::directory_user::Column::Id"
    )]
    Author,
    #[sea_orm(has_many = "super::comment_mention::Entity")]
    Mentions,
}

impl Related<super::directory_user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Author.def()
    }
}

impl Related<super::comment_mention::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Mentions.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

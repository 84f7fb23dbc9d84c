use chrono::Utc;
use sea_orm::{ConnectionTrait, QueryOrder, QuerySelect};
use thiserror::Error;

use crate::{
    entity::prelude::*,
    ids::{CommentId, MentionId, PostId, UserId},
};

/// Maximum nesting level. Replies targeting a comment at this depth are
/// redirected to siblings by the writer.
pub const MAX_DEPTH: i32 = 3;

/// Content length cap in characters, checked on the trimmed text.
pub const MAX_CONTENT_LEN: usize = 669;

#[derive(Debug, Error)]
pub enum CommentStoreError {
    #[error("fatal database error")]
    Db(#[from] DbErr),

    #[error("comment content is empty")]
    EmptyContent,

    #[error("comment content exceeds 669 characters")]
    ContentTooLong,

    #[error("comment depth {0} is outside the allowed range")]
    DepthOutOfRange(i32),

    #[error("root comment must not reference a parent")]
    RootWithParent,

    #[error("reply at depth {0} is missing a parent")]
    ReplyWithoutParent(i32),

    #[error("parent comment does not exist")]
    ParentNotFound,

    #[error("parent comment belongs to a different post")]
    ParentPostMismatch,

    #[error("parent depth does not precede comment depth")]
    ParentDepthMismatch,
}

/// Insert request for [`insert`]. The id and creation timestamp are assigned
/// by the store.
#[derive(Debug, Clone)]
pub struct NewComment {
    pub post_id: PostId,
    pub author_id: UserId,
    pub parent_id: Option<CommentId>,
    pub depth: i32,
    pub content: String,
    pub mentions: Vec<UserId>,
}

pub async fn get<C>(conn: &C, id: CommentId) -> Result<Option<CommentModel>, DbErr>
where
    C: ConnectionTrait,
{
    Comment::find_by_id(id).one(conn).await
}

/// Direct children of a comment within a post, oldest first.
pub async fn children<C>(
    conn: &C,
    post_id: PostId,
    parent_id: CommentId,
) -> Result<Vec<CommentModel>, DbErr>
where
    C: ConnectionTrait,
{
    Comment::find()
        .filter(CommentColumn::PostId.eq(post_id))
        .filter(CommentColumn::ParentId.eq(parent_id))
        .order_by_asc(CommentColumn::CreatedAt)
        .all(conn)
        .await
}

/// Root comments of a post, oldest first.
pub async fn roots<C>(
    conn: &C,
    post_id: PostId,
    offset: u64,
    limit: u64,
) -> Result<Vec<CommentModel>, DbErr>
where
    C: ConnectionTrait,
{
    Comment::find()
        .filter(CommentColumn::PostId.eq(post_id))
        .filter(CommentColumn::ParentId.is_null())
        .order_by_asc(CommentColumn::CreatedAt)
        .offset(offset)
        .limit(limit)
        .all(conn)
        .await
}

/// Insert a comment together with its mention rows.
///
/// Enforces the structural invariants before writing: depth within
/// `1..=MAX_DEPTH`, parent present exactly when depth > 1, parent in the same
/// post one level up, content trimmed/non-empty/within the cap. Run inside a
/// transaction when the mention rows must land atomically with the comment.
pub async fn insert<C>(conn: &C, new: NewComment) -> Result<CommentModel, CommentStoreError>
where
    C: ConnectionTrait,
{
    let content = new.content.trim();
    if content.is_empty() {
        return Err(CommentStoreError::EmptyContent);
    }
    if content.chars().count() > MAX_CONTENT_LEN {
        return Err(CommentStoreError::ContentTooLong);
    }
    if !(1..=MAX_DEPTH).contains(&new.depth) {
        return Err(CommentStoreError::DepthOutOfRange(new.depth));
    }

    match new.parent_id {
        None => {
            if new.depth != 1 {
                return Err(CommentStoreError::ReplyWithoutParent(new.depth));
            }
        }
        Some(parent_id) => {
            if new.depth == 1 {
                return Err(CommentStoreError::RootWithParent);
            }
            let parent = get(conn, parent_id)
                .await?
                .ok_or(CommentStoreError::ParentNotFound)?;
            if parent.post_id != new.post_id {
                return Err(CommentStoreError::ParentPostMismatch);
            }
            if parent.depth != new.depth - 1 {
                return Err(CommentStoreError::ParentDepthMismatch);
            }
        }
    }

    let comment = CommentActiveModel {
        id: Set(CommentId::new()),
        post_id: Set(new.post_id),
        author_id: Set(new.author_id),
        parent_id: Set(new.parent_id),
        depth: Set(new.depth),
        content: Set(content.to_string()),
        created_at: Set(Utc::now()),
    };

    let inserted = Comment::insert(comment).exec_with_returning(conn).await?;

    if !new.mentions.is_empty() {
        let rows = new.mentions.iter().map(|user_id| CommentMentionActiveModel {
            id: Set(MentionId::new()),
            comment_id: Set(inserted.id),
            user_id: Set(*user_id),
        });
        CommentMention::insert_many(rows).exec(conn).await?;
    }

    Ok(inserted)
}

/// Remove the given comments and their mention rows. Returns the number of
/// comments removed.
pub async fn bulk_delete<C>(conn: &C, ids: &[CommentId]) -> Result<u64, DbErr>
where
    C: ConnectionTrait,
{
    if ids.is_empty() {
        return Ok(0);
    }

    CommentMention::delete_many()
        .filter(CommentMentionColumn::CommentId.is_in(ids.iter().copied()))
        .exec(conn)
        .await?;

    let res = Comment::delete_many()
        .filter(CommentColumn::Id.is_in(ids.iter().copied()))
        .exec(conn)
        .await?;

    Ok(res.rows_affected)
}

/// Transitive descendant ids of `seed` within a post, excluding `seed`.
///
/// Breadth-first frontier expansion over `parent_id`. The depth cap bounds
/// this to two hops below a root today, but the loop makes no assumption
/// about how deep a subtree can get.
pub async fn descendant_ids<C>(
    conn: &C,
    post_id: PostId,
    seed: CommentId,
) -> Result<Vec<CommentId>, DbErr>
where
    C: ConnectionTrait,
{
    let mut collected: Vec<CommentId> = Vec::new();
    let mut frontier = vec![seed];

    while !frontier.is_empty() {
        let next: Vec<CommentId> = Comment::find()
            .select_only()
            .column(CommentColumn::Id)
            .filter(CommentColumn::PostId.eq(post_id))
            .filter(CommentColumn::ParentId.is_in(frontier))
            .into_tuple()
            .all(conn)
            .await?;

        collected.extend(next.iter().copied());
        frontier = next;
    }

    Ok(collected)
}

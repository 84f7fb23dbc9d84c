use std::collections::HashSet;

use chrono::{DateTime, Utc};
use sea_orm::{DatabaseConnection, TransactionTrait};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::{
    entity::prelude::*,
    ids::{CommentId, PostId, UserId},
    service::mentions,
    service::store::{self, CommentStoreError, NewComment},
};

pub const DEFAULT_PAGE_SIZE: u64 = 10;

#[derive(Debug, Error)]
pub enum CommentsServiceError {
    #[error("fatal database error")]
    Db(#[from] DbErr),

    #[error(transparent)]
    Store(#[from] CommentStoreError),

    #[error("invalid post id")]
    InvalidPostId,

    #[error("invalid comment id")]
    InvalidCommentId,

    #[error("comment not found")]
    CommentNotFound,

    #[error("unauthorized: not comment author")]
    Unauthorized,
}

/// Caller role as asserted by the external identity provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

/// Authenticated caller identity, supplied by the external identity provider.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Requester {
    pub id: UserId,
    pub role: Role,
}

/// Public profile fields of a comment author, from the directory projection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorView {
    pub id: UserId,
    pub username: String,
    pub public_id: Uuid,
    pub avatar_url: Option<String>,
}

impl From<DirectoryUserModel> for AuthorView {
    fn from(user: DirectoryUserModel) -> Self {
        AuthorView {
            id: user.id,
            username: user.username,
            public_id: user.public_id,
            avatar_url: user.avatar_url,
        }
    }
}

/// Thread listing entry: comment fields joined with the author's public
/// profile (None if the author left the directory) and the transitive
/// descendant count that drives lazy expansion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommentView {
    pub id: CommentId,
    pub post_id: PostId,
    pub parent_id: Option<CommentId>,
    pub depth: i32,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub author: Option<AuthorView>,
    pub replies_count: u64,
}

/// Result of a create, joined with the author so the caller can render it
/// without a second round trip.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatedComment {
    pub id: CommentId,
    pub post_id: PostId,
    pub parent_id: Option<CommentId>,
    pub depth: i32,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub mentions: Vec<UserId>,
    pub author: Option<AuthorView>,
}

#[derive(Clone)]
pub struct CommentsService {
    db: DatabaseConnection,
}

impl CommentsService {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Create a comment under a post, optionally as a reply.
    ///
    /// An absent, malformed, or unknown `parent_id` falls back to a root
    /// comment. A reply targeting a comment already at the depth cap is
    /// redirected to a sibling of the target, with the target's author
    /// called out via a mention prefix.
    pub async fn create_comment(
        &self,
        post_id: &str,
        author_id: UserId,
        parent_id: Option<&str>,
        content: &str,
    ) -> Result<CreatedComment, CommentsServiceError> {
        let post_id =
            PostId::parse_str(post_id).map_err(|_| CommentsServiceError::InvalidPostId)?;

        let trimmed = content.trim();
        if trimmed.is_empty() {
            return Err(CommentStoreError::EmptyContent.into());
        }
        if trimmed.chars().count() > store::MAX_CONTENT_LEN {
            return Err(CommentStoreError::ContentTooLong.into());
        }

        let target = match parent_id.and_then(|raw| CommentId::parse_str(raw).ok()) {
            Some(id) => {
                let target = store::get(&self.db, id).await?;
                if target.is_none() {
                    tracing::debug!(parent = %id, "parent comment not found, falling back to root");
                }
                target
            }
            None => None,
        };

        let mut final_content = trimmed.to_string();
        let mut promoted_mention: Option<UserId> = None;

        let (parent_id, depth) = match target {
            None => (None, 1),
            Some(target) if target.depth < store::MAX_DEPTH => {
                (Some(target.id), target.depth + 1)
            }
            Some(target) => {
                // Target is already at the cap: the new comment becomes a
                // sibling of the target, and the target's author is called
                // out so the redirected reply stays attributable.
                tracing::debug!(target = %target.id, "reply target at depth cap, promoting to sibling");
                if let Some(author) = DirectoryUser::find_by_id(target.author_id)
                    .one(&self.db)
                    .await?
                {
                    let token = format!("@{}", author.public_id);
                    if !final_content.starts_with(&token) {
                        final_content = format!("{token} {final_content}");
                    }
                    promoted_mention = Some(author.id);
                }
                (target.parent_id, target.depth)
            }
        };

        let tokens = mentions::extract_mentions(&final_content);
        let mut mention_ids: HashSet<UserId> = mentions::resolve(&self.db, &tokens).await?;
        mention_ids.extend(promoted_mention);

        let txn = self.db.begin().await?;
        let comment = store::insert(
            &txn,
            NewComment {
                post_id,
                author_id,
                parent_id,
                depth,
                content: final_content,
                mentions: mention_ids.iter().copied().collect(),
            },
        )
        .await?;
        txn.commit().await?;

        tracing::info!(comment = %comment.id, post = %post_id, depth = comment.depth, "created comment");

        let author = DirectoryUser::find_by_id(author_id).one(&self.db).await?;

        Ok(CreatedComment {
            id: comment.id,
            post_id: comment.post_id,
            parent_id: comment.parent_id,
            depth: comment.depth,
            content: comment.content,
            created_at: comment.created_at,
            mentions: mention_ids.into_iter().collect(),
            author: author.map(AuthorView::from),
        })
    }

    /// Root comments of a post, oldest first, with author join and
    /// transitive reply counts. `page` starts at 1; a zero `limit` falls
    /// back to [`DEFAULT_PAGE_SIZE`].
    pub async fn list_roots(
        &self,
        post_id: &str,
        page: u64,
        limit: u64,
    ) -> Result<Vec<CommentView>, CommentsServiceError> {
        let post_id =
            PostId::parse_str(post_id).map_err(|_| CommentsServiceError::InvalidPostId)?;

        let page = page.max(1);
        let limit = if limit == 0 { DEFAULT_PAGE_SIZE } else { limit };

        let roots = store::roots(&self.db, post_id, (page - 1) * limit, limit).await?;

        self.annotate(roots).await
    }

    /// Direct replies of a comment, oldest first, annotated like
    /// [`Self::list_roots`] so clients can expand a thread one level at a
    /// time. An unknown comment id yields an empty list.
    pub async fn list_replies(
        &self,
        post_id: &str,
        comment_id: &str,
    ) -> Result<Vec<CommentView>, CommentsServiceError> {
        let post_id =
            PostId::parse_str(post_id).map_err(|_| CommentsServiceError::InvalidPostId)?;
        let parent_id =
            CommentId::parse_str(comment_id).map_err(|_| CommentsServiceError::InvalidCommentId)?;

        let replies = store::children(&self.db, post_id, parent_id).await?;

        self.annotate(replies).await
    }

    /// Delete a comment and its whole descendant subtree. Only the author or
    /// an admin may delete. Returns the number of comments removed.
    ///
    /// Descendant collection and removal run in one transaction, so replies
    /// created concurrently cannot be orphaned by a half-applied delete.
    pub async fn delete_comment(
        &self,
        comment_id: &str,
        requester: &Requester,
    ) -> Result<u64, CommentsServiceError> {
        let comment_id =
            CommentId::parse_str(comment_id).map_err(|_| CommentsServiceError::InvalidCommentId)?;

        let txn = self.db.begin().await?;

        let target = store::get(&txn, comment_id)
            .await?
            .ok_or(CommentsServiceError::CommentNotFound)?;

        if requester.role != Role::Admin && requester.id != target.author_id {
            return Err(CommentsServiceError::Unauthorized);
        }

        let mut doomed = store::descendant_ids(&txn, target.post_id, comment_id).await?;
        doomed.push(comment_id);

        let removed = store::bulk_delete(&txn, &doomed).await?;
        txn.commit().await?;

        tracing::info!(comment = %comment_id, removed, "cascade deleted comment subtree");

        Ok(removed)
    }

    async fn annotate(
        &self,
        comments: Vec<CommentModel>,
    ) -> Result<Vec<CommentView>, CommentsServiceError> {
        let mut views = Vec::with_capacity(comments.len());

        for comment in comments {
            let author = DirectoryUser::find_by_id(comment.author_id)
                .one(&self.db)
                .await?;
            let replies_count = store::descendant_ids(&self.db, comment.post_id, comment.id)
                .await?
                .len() as u64;

            views.push(CommentView {
                id: comment.id,
                post_id: comment.post_id,
                parent_id: comment.parent_id,
                depth: comment.depth,
                content: comment.content,
                created_at: comment.created_at,
                author: author.map(AuthorView::from),
                replies_count,
            });
        }

        Ok(views)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::migrator::Migrator;
    use sea_orm::Database;
    use sea_orm_migration::MigratorTrait;

    async fn setup_test_service() -> CommentsService {
        let db = Database::connect("sqlite::memory:")
            .await
            .expect("Failed to create in-memory database");

        Migrator::up(&db, None)
            .await
            .expect("Failed to run migrations");

        CommentsService::new(db)
    }

    async fn create_test_user(service: &CommentsService, username: &str) -> DirectoryUserModel {
        let user = DirectoryUserActiveModel {
            id: Set(UserId::new()),
            username: Set(username.to_string()),
            public_id: Set(Uuid::now_v7()),
            avatar_url: Set(None),
        };
        DirectoryUser::insert(user)
            .exec_with_returning(&service.db)
            .await
            .expect("Failed to insert directory user")
    }

    fn as_user(user: &DirectoryUserModel) -> Requester {
        Requester {
            id: user.id,
            role: Role::User,
        }
    }

    #[tokio::test]
    async fn test_create_root_comment() {
        let service = setup_test_service().await;
        let alice = create_test_user(&service, "alice").await;
        let post_id = PostId::new();

        let created = service
            .create_comment(&post_id.to_string(), alice.id, None, "first!")
            .await
            .expect("Failed to create root comment");

        assert_eq!(created.post_id, post_id);
        assert_eq!(created.depth, 1);
        assert_eq!(created.parent_id, None);
        assert_eq!(created.content, "first!");
        assert!(created.mentions.is_empty());

        let author = created.author.expect("author should be joined");
        assert_eq!(author.id, alice.id);
        assert_eq!(author.username, "alice");
    }

    #[tokio::test]
    async fn test_reply_below_cap_extends_depth() {
        let service = setup_test_service().await;
        let alice = create_test_user(&service, "alice").await;
        let bob = create_test_user(&service, "bob").await;
        let post_id = PostId::new().to_string();

        let root = service
            .create_comment(&post_id, alice.id, None, "root")
            .await
            .unwrap();
        let reply = service
            .create_comment(&post_id, bob.id, Some(&root.id.to_string()), "reply")
            .await
            .unwrap();

        assert_eq!(reply.depth, 2);
        assert_eq!(reply.parent_id, Some(root.id));
        assert_eq!(reply.content, "reply", "no prefix below the cap");
    }

    #[tokio::test]
    async fn test_reply_at_cap_promotes_to_sibling() {
        let service = setup_test_service().await;
        let a = create_test_user(&service, "a").await;
        let b = create_test_user(&service, "b").await;
        let c = create_test_user(&service, "c").await;
        let d = create_test_user(&service, "d").await;
        let post_id = PostId::new().to_string();

        let root = service
            .create_comment(&post_id, a.id, None, "root")
            .await
            .unwrap();
        let c2 = service
            .create_comment(&post_id, b.id, Some(&root.id.to_string()), "reply")
            .await
            .unwrap();
        let c3 = service
            .create_comment(&post_id, c.id, Some(&c2.id.to_string()), "nested")
            .await
            .unwrap();
        assert_eq!(c3.depth, 3);

        // Replying to a depth-3 comment never yields depth 4
        let c4 = service
            .create_comment(&post_id, d.id, Some(&c3.id.to_string()), "too deep")
            .await
            .unwrap();

        assert_eq!(c4.depth, 3);
        assert_eq!(c4.parent_id, Some(c2.id), "promoted to sibling of target");
        let token = format!("@{}", c.public_id);
        assert_eq!(c4.content, format!("{token} too deep"));
        assert!(c4.mentions.contains(&c.id), "target author is mentioned");
    }

    #[tokio::test]
    async fn test_promotion_does_not_duplicate_prefix() {
        let service = setup_test_service().await;
        let a = create_test_user(&service, "a").await;
        let c = create_test_user(&service, "c").await;
        let post_id = PostId::new().to_string();

        let root = service
            .create_comment(&post_id, a.id, None, "root")
            .await
            .unwrap();
        let c2 = service
            .create_comment(&post_id, a.id, Some(&root.id.to_string()), "reply")
            .await
            .unwrap();
        let c3 = service
            .create_comment(&post_id, c.id, Some(&c2.id.to_string()), "nested")
            .await
            .unwrap();

        let token = format!("@{}", c.public_id);
        let already_prefixed = format!("{token} hi again");
        let c4 = service
            .create_comment(&post_id, a.id, Some(&c3.id.to_string()), &already_prefixed)
            .await
            .unwrap();

        assert_eq!(c4.content, already_prefixed);
    }

    #[tokio::test]
    async fn test_promotion_with_vanished_target_author() {
        let service = setup_test_service().await;
        let a = create_test_user(&service, "a").await;
        let c = create_test_user(&service, "c").await;
        let post_id = PostId::new().to_string();

        let root = service
            .create_comment(&post_id, a.id, None, "root")
            .await
            .unwrap();
        let c2 = service
            .create_comment(&post_id, a.id, Some(&root.id.to_string()), "reply")
            .await
            .unwrap();
        let c3 = service
            .create_comment(&post_id, c.id, Some(&c2.id.to_string()), "nested")
            .await
            .unwrap();

        // c leaves the directory before the promoted reply arrives
        DirectoryUser::delete_by_id(c.id)
            .exec(&service.db)
            .await
            .unwrap();

        let c4 = service
            .create_comment(&post_id, a.id, Some(&c3.id.to_string()), "still here")
            .await
            .unwrap();

        assert_eq!(c4.depth, 3);
        assert_eq!(c4.parent_id, Some(c2.id));
        assert_eq!(c4.content, "still here", "no prefix without an author");
        assert!(c4.mentions.is_empty());
    }

    #[tokio::test]
    async fn test_unresolved_parent_falls_back_to_root() {
        let service = setup_test_service().await;
        let alice = create_test_user(&service, "alice").await;
        let post_id = PostId::new().to_string();

        // well-formed id that matches no comment
        let ghost = CommentId::new().to_string();
        let created = service
            .create_comment(&post_id, alice.id, Some(&ghost), "hello?")
            .await
            .unwrap();
        assert_eq!(created.depth, 1);
        assert_eq!(created.parent_id, None);

        // malformed id
        let created = service
            .create_comment(&post_id, alice.id, Some("not-a-uuid"), "anyone?")
            .await
            .unwrap();
        assert_eq!(created.depth, 1);
        assert_eq!(created.parent_id, None);
    }

    #[tokio::test]
    async fn test_create_rejects_bad_input() {
        let service = setup_test_service().await;
        let alice = create_test_user(&service, "alice").await;
        let post_id = PostId::new().to_string();

        let result = service.create_comment("garbage", alice.id, None, "hi").await;
        assert!(matches!(result, Err(CommentsServiceError::InvalidPostId)));

        let result = service.create_comment(&post_id, alice.id, None, "   ").await;
        assert!(matches!(
            result,
            Err(CommentsServiceError::Store(CommentStoreError::EmptyContent))
        ));

        let at_cap = "x".repeat(store::MAX_CONTENT_LEN);
        service
            .create_comment(&post_id, alice.id, None, &at_cap)
            .await
            .expect("content at the cap should be accepted");

        let over_cap = "x".repeat(store::MAX_CONTENT_LEN + 1);
        let result = service
            .create_comment(&post_id, alice.id, None, &over_cap)
            .await;
        assert!(matches!(
            result,
            Err(CommentsServiceError::Store(
                CommentStoreError::ContentTooLong
            ))
        ));
    }

    #[tokio::test]
    async fn test_mentions_resolved_case_insensitively() {
        let service = setup_test_service().await;
        let alice = create_test_user(&service, "Alice").await;
        let author = create_test_user(&service, "writer").await;
        let post_id = PostId::new().to_string();

        let created = service
            .create_comment(&post_id, author.id, None, "cc @ALICE and @alice again")
            .await
            .unwrap();

        assert_eq!(created.mentions, vec![alice.id], "one id per user");
    }

    #[tokio::test]
    async fn test_unknown_mentions_are_ignored() {
        let service = setup_test_service().await;
        let author = create_test_user(&service, "writer").await;
        let post_id = PostId::new().to_string();

        let created = service
            .create_comment(&post_id, author.id, None, "hey @nobody.at-all")
            .await
            .unwrap();

        assert!(created.mentions.is_empty());
    }

    #[tokio::test]
    async fn test_list_roots_with_transitive_counts() {
        let service = setup_test_service().await;
        let alice = create_test_user(&service, "alice").await;
        let post_id = PostId::new().to_string();

        let first = service
            .create_comment(&post_id, alice.id, None, "first root")
            .await
            .unwrap();
        let second = service
            .create_comment(&post_id, alice.id, None, "second root")
            .await
            .unwrap();

        let c2 = service
            .create_comment(&post_id, alice.id, Some(&first.id.to_string()), "reply")
            .await
            .unwrap();
        service
            .create_comment(&post_id, alice.id, Some(&c2.id.to_string()), "nested")
            .await
            .unwrap();

        let roots = service.list_roots(&post_id, 1, 10).await.unwrap();
        assert_eq!(roots.len(), 2);

        // ordered by creation, counts span the whole subtree
        assert_eq!(roots[0].id, first.id);
        assert_eq!(roots[0].replies_count, 2);
        assert_eq!(roots[1].id, second.id);
        assert_eq!(roots[1].replies_count, 0);

        let author = roots[0].author.as_ref().expect("author should be joined");
        assert_eq!(author.username, "alice");
    }

    #[tokio::test]
    async fn test_list_roots_pagination() {
        let service = setup_test_service().await;
        let alice = create_test_user(&service, "alice").await;
        let post_id = PostId::new().to_string();

        for i in 0..3 {
            service
                .create_comment(&post_id, alice.id, None, &format!("root {i}"))
                .await
                .unwrap();
        }

        let page1 = service.list_roots(&post_id, 1, 2).await.unwrap();
        assert_eq!(page1.len(), 2);
        assert_eq!(page1[0].content, "root 0");

        let page2 = service.list_roots(&post_id, 2, 2).await.unwrap();
        assert_eq!(page2.len(), 1);
        assert_eq!(page2[0].content, "root 2");

        // page 0 is treated as page 1, limit 0 falls back to the default
        let clamped = service.list_roots(&post_id, 0, 0).await.unwrap();
        assert_eq!(clamped.len(), 3);
    }

    #[tokio::test]
    async fn test_list_roots_author_gone() {
        let service = setup_test_service().await;
        let alice = create_test_user(&service, "alice").await;
        let post_id = PostId::new().to_string();

        service
            .create_comment(&post_id, alice.id, None, "soon orphaned")
            .await
            .unwrap();
        DirectoryUser::delete_by_id(alice.id)
            .exec(&service.db)
            .await
            .unwrap();

        let roots = service.list_roots(&post_id, 1, 10).await.unwrap();
        assert_eq!(roots.len(), 1);
        assert!(roots[0].author.is_none());
    }

    #[tokio::test]
    async fn test_list_replies_direct_children_only() {
        let service = setup_test_service().await;
        let alice = create_test_user(&service, "alice").await;
        let post_id = PostId::new().to_string();

        let root = service
            .create_comment(&post_id, alice.id, None, "root")
            .await
            .unwrap();
        let c2 = service
            .create_comment(&post_id, alice.id, Some(&root.id.to_string()), "reply")
            .await
            .unwrap();
        service
            .create_comment(&post_id, alice.id, Some(&c2.id.to_string()), "nested")
            .await
            .unwrap();

        let replies = service
            .list_replies(&post_id, &root.id.to_string())
            .await
            .unwrap();
        assert_eq!(replies.len(), 1, "only direct children are listed");
        assert_eq!(replies[0].id, c2.id);
        assert_eq!(replies[0].replies_count, 1);

        // unknown comment id yields an empty list, not an error
        let replies = service
            .list_replies(&post_id, &CommentId::new().to_string())
            .await
            .unwrap();
        assert!(replies.is_empty());

        let result = service.list_replies(&post_id, "not-a-uuid").await;
        assert!(matches!(result, Err(CommentsServiceError::InvalidCommentId)));
    }

    #[tokio::test]
    async fn test_delete_cascades_through_subtree() {
        let service = setup_test_service().await;
        let a = create_test_user(&service, "a").await;
        let b = create_test_user(&service, "b").await;
        let c = create_test_user(&service, "c").await;
        let d = create_test_user(&service, "d").await;
        let post_id = PostId::new().to_string();

        let root = service
            .create_comment(&post_id, a.id, None, "root")
            .await
            .unwrap();
        let c2 = service
            .create_comment(&post_id, b.id, Some(&root.id.to_string()), "reply")
            .await
            .unwrap();
        let c3 = service
            .create_comment(&post_id, c.id, Some(&c2.id.to_string()), "nested")
            .await
            .unwrap();
        let c4 = service
            .create_comment(&post_id, d.id, Some(&c3.id.to_string()), "promoted")
            .await
            .unwrap();

        // c3 and c4 are both descendants of c2 (c4 was promoted to its child)
        let removed = service
            .delete_comment(&c2.id.to_string(), &as_user(&b))
            .await
            .unwrap();
        assert_eq!(removed, 3);

        for id in [c2.id, c3.id, c4.id] {
            assert!(store::get(&service.db, id).await.unwrap().is_none());
        }

        let roots = service.list_roots(&post_id, 1, 10).await.unwrap();
        assert_eq!(roots.len(), 1);
        assert_eq!(roots[0].id, root.id);
        assert_eq!(roots[0].replies_count, 0);
    }

    #[tokio::test]
    async fn test_delete_authorization() {
        let service = setup_test_service().await;
        let alice = create_test_user(&service, "alice").await;
        let mallory = create_test_user(&service, "mallory").await;
        let admin = create_test_user(&service, "admin").await;
        let post_id = PostId::new().to_string();

        let comment = service
            .create_comment(&post_id, alice.id, None, "mine")
            .await
            .unwrap();

        let result = service
            .delete_comment(&comment.id.to_string(), &as_user(&mallory))
            .await;
        assert!(matches!(result, Err(CommentsServiceError::Unauthorized)));
        assert!(store::get(&service.db, comment.id).await.unwrap().is_some());

        // admins may delete anyone's comment
        let removed = service
            .delete_comment(
                &comment.id.to_string(),
                &Requester {
                    id: admin.id,
                    role: Role::Admin,
                },
            )
            .await
            .unwrap();
        assert_eq!(removed, 1);
    }

    #[tokio::test]
    async fn test_delete_missing_or_malformed_target() {
        let service = setup_test_service().await;
        let alice = create_test_user(&service, "alice").await;

        let result = service
            .delete_comment(&CommentId::new().to_string(), &as_user(&alice))
            .await;
        assert!(matches!(result, Err(CommentsServiceError::CommentNotFound)));

        let result = service.delete_comment("not-a-uuid", &as_user(&alice)).await;
        assert!(matches!(result, Err(CommentsServiceError::InvalidCommentId)));
    }
}

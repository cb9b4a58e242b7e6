//! Post write service and author-history reads.

use crate::cursor::{decode_post_cursor, encode_post_cursor};
use crate::metrics::AppMetrics;
use chirp_core::error::PostError;
use chirp_core::event::DomainEvent;
use chirp_core::id::IdGenerator;
use chirp_core::model::{Page, Post, PostId, UserId};
use chirp_core::store::{Database, PostStore};
use chirp_core::RequestContext;
use std::sync::Arc;

/// Creates posts and pages an author's history.
pub struct PostService {
    database: Arc<dyn Database>,
    posts: Arc<dyn PostStore>,
    ids: Arc<IdGenerator>,
    metrics: Arc<AppMetrics>,
}

impl PostService {
    /// Assemble the service.
    #[must_use]
    pub fn new(
        database: Arc<dyn Database>,
        posts: Arc<dyn PostStore>,
        ids: Arc<IdGenerator>,
        metrics: Arc<AppMetrics>,
    ) -> Self {
        Self { database, posts, ids, metrics }
    }

    /// Create a post for the caller.
    ///
    /// The post row and its `POST_CREATED` outbox record are committed
    /// in one transaction: a failure to publish can never lose the
    /// post, and a published event can never reference an uncommitted
    /// one.
    ///
    /// # Errors
    ///
    /// [`PostError::Validation`] for empty or over-long content,
    /// [`PostError::Store`] when the transaction fails.
    pub async fn create_post(
        &self,
        ctx: &RequestContext,
        content: &str,
    ) -> Result<Post, PostError> {
        let post_id = PostId::from_uuid(self.ids.generate());
        let post = Post::create(post_id, ctx.user_id, content)?;

        let event = DomainEvent::post_created(
            self.ids.generate(),
            post.id,
            post.author,
            post.content.clone(),
        );

        let mut tx = self.database.begin(ctx.user_id).await?;
        tx.save_post(&post).await?;
        tx.append_outbox(&event, Some(&ctx.request_id)).await?;
        tx.commit().await?;

        self.metrics.increment_posts_created();
        tracing::info!(
            post_id = %post.id,
            user_id = %ctx.user_id,
            chars = post.content.chars().count(),
            "Post created"
        );

        Ok(post)
    }

    /// Page an author's posts, newest first. The cursor is an encoded
    /// post id; pages continue strictly below it.
    ///
    /// # Errors
    ///
    /// [`PostError::Store`] when the read fails.
    pub async fn get_user_posts(
        &self,
        author: UserId,
        cursor: Option<&str>,
        limit: usize,
    ) -> Result<Page<Post>, PostError> {
        let cursor_id = decode_post_cursor(cursor);
        let posts = self
            .posts
            .find_by_author(author, cursor_id, limit + 1)
            .await?;

        Ok(Page::clip(posts, limit, |post| encode_post_cursor(post.id)))
    }
}

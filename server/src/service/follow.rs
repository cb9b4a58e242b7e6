//! Follow-graph write service and listings.

use crate::cursor::{decode_follow_cursor, encode_follow_cursor};
use crate::metrics::AppMetrics;
use chirp_core::error::{FollowError, StoreError};
use chirp_core::event::DomainEvent;
use chirp_core::id::IdGenerator;
use chirp_core::model::{Follow, Page, User, UserId};
use chirp_core::store::{Database, FollowStore, FollowedUser};
use chirp_core::RequestContext;
use std::sync::Arc;

/// Creates and removes follow edges; pages the graph from either end.
pub struct FollowService {
    database: Arc<dyn Database>,
    follows: Arc<dyn FollowStore>,
    ids: Arc<IdGenerator>,
    metrics: Arc<AppMetrics>,
}

impl FollowService {
    /// Assemble the service.
    #[must_use]
    pub fn new(
        database: Arc<dyn Database>,
        follows: Arc<dyn FollowStore>,
        ids: Arc<IdGenerator>,
        metrics: Arc<AppMetrics>,
    ) -> Self {
        Self { database, follows, ids, metrics }
    }

    /// The caller follows `followee`.
    ///
    /// The followee is upserted first: a user can receive a follow
    /// before ever posting, so a placeholder row must exist. The edge
    /// and its `USER_FOLLOWED` outbox record commit together.
    ///
    /// # Errors
    ///
    /// [`FollowError::Validation`] on self-follow,
    /// [`FollowError::AlreadyFollowing`] when the edge exists,
    /// [`FollowError::Store`] on storage failure.
    pub async fn follow(
        &self,
        ctx: &RequestContext,
        followee: UserId,
    ) -> Result<(), FollowError> {
        let follow = Follow::create(ctx.user_id, followee)?;

        if self.follows.exists(ctx.user_id, followee).await? {
            tracing::debug!(follower = %ctx.user_id, followee = %followee, "Already following");
            return Err(FollowError::AlreadyFollowing { follower: ctx.user_id, followee });
        }

        let event = DomainEvent::user_followed(self.ids.generate(), ctx.user_id, followee);

        let mut tx = self.database.begin(ctx.user_id).await?;
        tx.upsert_user(&User::new(followee)).await?;
        tx.save_follow(&follow).await?;
        tx.append_outbox(&event, Some(&ctx.request_id)).await?;
        tx.commit().await?;

        self.metrics.increment_follows();
        tracing::info!(follower = %ctx.user_id, followee = %followee, "Follow created");
        Ok(())
    }

    /// The caller unfollows `followee`.
    ///
    /// # Errors
    ///
    /// [`FollowError::NotFollowing`] when no edge exists,
    /// [`FollowError::Store`] on storage failure.
    pub async fn unfollow(
        &self,
        ctx: &RequestContext,
        followee: UserId,
    ) -> Result<(), FollowError> {
        if !self.follows.exists(ctx.user_id, followee).await? {
            tracing::debug!(follower = %ctx.user_id, followee = %followee, "Not following");
            return Err(FollowError::NotFollowing { follower: ctx.user_id, followee });
        }

        let event = DomainEvent::user_unfollowed(self.ids.generate(), ctx.user_id, followee);

        let mut tx = self.database.begin(ctx.user_id).await?;
        tx.delete_follow(ctx.user_id, followee).await?;
        tx.append_outbox(&event, Some(&ctx.request_id)).await?;
        tx.commit().await?;

        self.metrics.increment_unfollows();
        tracing::info!(follower = %ctx.user_id, followee = %followee, "Unfollow completed");
        Ok(())
    }

    /// Page the users `user` follows, newest edge first.
    ///
    /// # Errors
    ///
    /// [`StoreError`] when the read fails.
    pub async fn get_following(
        &self,
        user: UserId,
        cursor: Option<&str>,
        limit: usize,
    ) -> Result<Page<FollowedUser>, StoreError> {
        let cursor = decode_follow_cursor(cursor);
        let edges = self.follows.find_following(user, cursor, limit + 1).await?;
        Ok(Page::clip(edges, limit, |edge| encode_follow_cursor(edge.followed_at)))
    }

    /// Page the users following `user`, newest edge first.
    ///
    /// # Errors
    ///
    /// [`StoreError`] when the read fails.
    pub async fn get_followers(
        &self,
        user: UserId,
        cursor: Option<&str>,
        limit: usize,
    ) -> Result<Page<FollowedUser>, StoreError> {
        let cursor = decode_follow_cursor(cursor);
        let edges = self.follows.find_followers(user, cursor, limit + 1).await?;
        Ok(Page::clip(edges, limit, |edge| encode_follow_cursor(edge.followed_at)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chirp_core::error::ValidationError;
    use chirp_core::store::{OutboxStore, UserStore};
    use chirp_testing::InMemoryDatabase;

    fn service(db: &InMemoryDatabase) -> FollowService {
        FollowService::new(
            Arc::new(db.clone()),
            Arc::new(db.clone()),
            Arc::new(IdGenerator::new()),
            Arc::new(AppMetrics::new()),
        )
    }

    fn ctx() -> RequestContext {
        RequestContext::new(UserId::random(), "req-1", 0)
    }

    #[tokio::test]
    async fn follow_upserts_followee_and_appends_event() {
        let db = InMemoryDatabase::new();
        let service = service(&db);
        let ctx = ctx();
        let followee = UserId::random();

        service.follow(&ctx, followee).await.unwrap();

        // Placeholder user exists even though the followee never acted.
        assert!(UserStore::exists(&db, followee).await.unwrap());
        assert!(FollowStore::exists(&db, ctx.user_id, followee).await.unwrap());

        let records = db.outbox_records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].event_type, "USER_FOLLOWED");
        assert_eq!(records[0].aggregate_id, ctx.user_id.to_string());
    }

    #[tokio::test]
    async fn self_follow_is_rejected() {
        let db = InMemoryDatabase::new();
        let service = service(&db);
        let ctx = ctx();

        let err = service.follow(&ctx, ctx.user_id).await.unwrap_err();
        assert!(matches!(
            err,
            FollowError::Validation(ValidationError::SelfFollow)
        ));
        assert!(db.outbox_records().is_empty());
    }

    #[tokio::test]
    async fn duplicate_follow_is_a_conflict() {
        let db = InMemoryDatabase::new();
        let service = service(&db);
        let ctx = ctx();
        let followee = UserId::random();

        service.follow(&ctx, followee).await.unwrap();
        let err = service.follow(&ctx, followee).await.unwrap_err();
        assert!(matches!(err, FollowError::AlreadyFollowing { .. }));
        // Only the first attempt reached the outbox.
        assert_eq!(db.outbox_records().len(), 1);
    }

    #[tokio::test]
    async fn unfollow_requires_an_edge() {
        let db = InMemoryDatabase::new();
        let service = service(&db);
        let ctx = ctx();
        let followee = UserId::random();

        let err = service.unfollow(&ctx, followee).await.unwrap_err();
        assert!(matches!(err, FollowError::NotFollowing { .. }));

        service.follow(&ctx, followee).await.unwrap();
        service.unfollow(&ctx, followee).await.unwrap();
        assert!(!FollowStore::exists(&db, ctx.user_id, followee).await.unwrap());

        let types: Vec<String> = db
            .outbox_records()
            .into_iter()
            .map(|r| r.event_type)
            .collect();
        assert_eq!(types, vec!["USER_FOLLOWED", "USER_UNFOLLOWED"]);
        assert_eq!(db.count_unprocessed().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn following_listing_pages_by_edge_time() {
        let db = InMemoryDatabase::new();
        let service = service(&db);
        let ctx = ctx();

        for _ in 0..3 {
            service.follow(&ctx, UserId::random()).await.unwrap();
            // Edge timestamps must differ for a deterministic order.
            tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        }

        let first = service
            .get_following(ctx.user_id, None, 2)
            .await
            .unwrap();
        assert_eq!(first.items.len(), 2);
        assert!(first.has_more());
        assert!(first.items[0].followed_at > first.items[1].followed_at);

        let rest = service
            .get_following(ctx.user_id, first.next_cursor.as_deref(), 2)
            .await
            .unwrap();
        assert_eq!(rest.items.len(), 1);
        assert!(!rest.has_more());
    }
}

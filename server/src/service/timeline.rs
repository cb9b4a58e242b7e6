//! Merged home-timeline read path.
//!
//! The materialized cache carries everything fanned out on write; posts
//! by followed celebrities are fetched on demand and merged at read
//! time. The merge key is the post id (time-ordered), descending, and
//! duplicates collapse by id (a post can legitimately arrive from both
//! sides, e.g. after a backfill of an author who later crossed the
//! celebrity threshold).

use crate::cursor::{decode_post_cursor, encode_post_cursor};
use crate::metrics::AppMetrics;
use chirp_core::error::StoreError;
use chirp_core::model::{Page, Post, UserId};
use chirp_core::store::{FollowStore, PostStore, TimelineCache};
use std::collections::HashSet;
use std::sync::Arc;

/// Serves the merged home timeline.
pub struct TimelineService {
    cache: Arc<dyn TimelineCache>,
    posts: Arc<dyn PostStore>,
    follows: Arc<dyn FollowStore>,
    celebrity_threshold: u64,
    metrics: Arc<AppMetrics>,
}

impl TimelineService {
    /// Assemble the service.
    #[must_use]
    pub fn new(
        cache: Arc<dyn TimelineCache>,
        posts: Arc<dyn PostStore>,
        follows: Arc<dyn FollowStore>,
        celebrity_threshold: u64,
        metrics: Arc<AppMetrics>,
    ) -> Self {
        Self { cache, posts, follows, celebrity_threshold, metrics }
    }

    /// One page of the reader's home timeline, newest first.
    ///
    /// The cursor is an encoded post id; its embedded timestamp is the
    /// exclusive upper score bound for both the cache range and the
    /// celebrity reads. An invalid cursor means the first page.
    ///
    /// # Errors
    ///
    /// [`StoreError`] when the cache or the relational reads fail.
    pub async fn get_timeline(
        &self,
        reader: UserId,
        cursor: Option<&str>,
        limit: usize,
    ) -> Result<Page<Post>, StoreError> {
        let max_score = decode_post_cursor(cursor).map(|id| id.timestamp_ms());

        let cached_ids = self.cache.range(reader, max_score, limit + 1).await?;
        let cached_posts = self.posts.find_by_ids(&cached_ids).await?;

        let celebrity_posts = self.fetch_celebrity_posts(reader, max_score, limit).await?;

        let cached_count = cached_posts.len();
        let celebrity_count = celebrity_posts.len();

        let mut seen: HashSet<_> = HashSet::new();
        let mut merged: Vec<Post> = cached_posts
            .into_iter()
            .chain(celebrity_posts)
            .filter(|post| seen.insert(post.id))
            .collect();
        merged.sort_by(|a, b| b.id.cmp(&a.id));
        merged.truncate(limit + 1);

        let page = Page::clip(merged, limit, |post| encode_post_cursor(post.id));

        self.metrics.increment_timeline_requests();
        tracing::info!(
            reader = %reader,
            served = page.items.len(),
            cached = cached_count,
            celebrity = celebrity_count,
            has_more = page.has_more(),
            "Timeline served"
        );
        Ok(page)
    }

    /// Recent posts from followed celebrities (fan-out on read).
    async fn fetch_celebrity_posts(
        &self,
        reader: UserId,
        max_score: Option<i64>,
        limit: usize,
    ) -> Result<Vec<Post>, StoreError> {
        let celebrities = self
            .follows
            .followed_celebrities(reader, self.celebrity_threshold)
            .await?;
        if celebrities.is_empty() {
            return Ok(Vec::new());
        }

        tracing::debug!(
            reader = %reader,
            celebrities = celebrities.len(),
            "Fetching celebrity posts on demand"
        );

        let mut posts = Vec::new();
        for celebrity in celebrities {
            let latest = self.posts.find_latest_by_author(celebrity, limit).await?;
            posts.extend(latest.into_iter().filter(|post| {
                max_score.map_or(true, |max| post.id.timestamp_ms() < max)
            }));
        }
        Ok(posts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chirp_core::id::IdGenerator;
    use chirp_core::model::{Follow, PostId};
    use chirp_core::store::{Database, ScoredPost};
    use chirp_testing::{InMemoryDatabase, InMemoryTimelineCache};

    struct Fixture {
        db: InMemoryDatabase,
        cache: InMemoryTimelineCache,
        ids: IdGenerator,
        service: TimelineService,
    }

    fn fixture(threshold: u64) -> Fixture {
        let db = InMemoryDatabase::new();
        let cache = InMemoryTimelineCache::new(800);
        let service = TimelineService::new(
            Arc::new(cache.clone()),
            Arc::new(db.clone()),
            Arc::new(db.clone()),
            threshold,
            Arc::new(AppMetrics::new()),
        );
        Fixture { db, cache, ids: IdGenerator::new(), service }
    }

    impl Fixture {
        fn seed_post(&self, author: UserId, content: &str) -> Post {
            let id = PostId::from_uuid(self.ids.generate());
            let post = Post::create(id, author, content).unwrap();
            self.db.insert_post(post.clone());
            post
        }

        async fn cache_post(&self, reader: UserId, post: &Post) {
            self.cache.add(reader, ScoredPost::new(post.id)).await.unwrap();
        }

        async fn seed_follow(&self, follower: UserId, followee: UserId) {
            let follow = Follow::create(follower, followee).unwrap();
            let mut tx = self.db.begin(follower).await.unwrap();
            tx.save_follow(&follow).await.unwrap();
            tx.commit().await.unwrap();
        }
    }

    #[tokio::test]
    async fn timeline_is_post_id_descending() {
        let f = fixture(10_000);
        let reader = UserId::random();
        let author = UserId::random();

        let p1 = f.seed_post(author, "first");
        let p2 = f.seed_post(author, "second");
        f.cache_post(reader, &p1).await;
        f.cache_post(reader, &p2).await;

        let page = f.service.get_timeline(reader, None, 20).await.unwrap();
        assert_eq!(
            page.items.iter().map(|p| p.id).collect::<Vec<_>>(),
            vec![p2.id, p1.id]
        );
        assert!(!page.has_more());
    }

    #[tokio::test]
    async fn celebrity_posts_merge_from_the_on_demand_path() {
        let f = fixture(1);
        let reader = UserId::random();
        let celebrity = UserId::random();

        // Two followers make the author a celebrity at threshold 1.
        f.seed_follow(reader, celebrity).await;
        f.seed_follow(UserId::random(), celebrity).await;

        // The post is only in the relational store, never cached.
        let post = f.seed_post(celebrity, "broadcast");

        let page = f.service.get_timeline(reader, None, 20).await.unwrap();
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].id, post.id);
    }

    #[tokio::test]
    async fn merge_deduplicates_posts_present_on_both_paths() {
        let f = fixture(1);
        let reader = UserId::random();
        let celebrity = UserId::random();

        f.seed_follow(reader, celebrity).await;
        f.seed_follow(UserId::random(), celebrity).await;

        // Backfilled into the cache and also fetched on demand.
        let post = f.seed_post(celebrity, "both paths");
        f.cache_post(reader, &post).await;

        let page = f.service.get_timeline(reader, None, 20).await.unwrap();
        assert_eq!(page.items.len(), 1);
    }

    #[tokio::test]
    async fn cursor_bounds_both_cache_and_celebrity_reads() {
        let f = fixture(1);
        let reader = UserId::random();
        let author = UserId::random();
        let celebrity = UserId::random();

        f.seed_follow(reader, celebrity).await;
        f.seed_follow(UserId::random(), celebrity).await;

        // The cursor bound is the id-embedded millisecond timestamp, so
        // the seeded posts must land in distinct milliseconds.
        let tick = || tokio::time::sleep(std::time::Duration::from_millis(2));

        let old_cached = f.seed_post(author, "old cached");
        f.cache_post(reader, &old_cached).await;
        tick().await;
        let old_celebrity = f.seed_post(celebrity, "old celebrity");
        tick().await;
        // Everything after this marker must be excluded by the cursor.
        let marker = f.seed_post(author, "marker");
        f.cache_post(reader, &marker).await;
        tick().await;
        let new_cached = f.seed_post(author, "new cached");
        f.cache_post(reader, &new_cached).await;
        tick().await;
        let _new_celebrity = f.seed_post(celebrity, "new celebrity");

        let cursor = crate::cursor::encode_post_cursor(marker.id);
        let page = f
            .service
            .get_timeline(reader, Some(&cursor), 20)
            .await
            .unwrap();

        let ids: Vec<PostId> = page.items.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![old_celebrity.id, old_cached.id]);
    }

    #[tokio::test]
    async fn pagination_walks_the_whole_timeline_without_gaps() {
        let f = fixture(10_000);
        let reader = UserId::random();
        let author = UserId::random();

        let mut expected = Vec::new();
        for i in 0..25 {
            let post = f.seed_post(author, &format!("post {i}"));
            f.cache_post(reader, &post).await;
            expected.push(post.id);
            // Distinct millisecond per post so the score cursor can
            // separate the pages.
            tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        }
        expected.reverse();

        let mut collected = Vec::new();
        let mut cursor: Option<String> = None;
        let mut sizes = Vec::new();
        loop {
            let page = f
                .service
                .get_timeline(reader, cursor.as_deref(), 10)
                .await
                .unwrap();
            sizes.push(page.items.len());
            collected.extend(page.items.iter().map(|p| p.id));
            if !page.has_more() {
                break;
            }
            cursor = page.next_cursor;
        }

        assert_eq!(sizes, vec![10, 10, 5]);
        assert_eq!(collected, expected);
    }
}

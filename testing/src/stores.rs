//! In-memory relational stores.
//!
//! One [`InMemoryDatabase`] models all four relational tables behind a
//! single lock. Transactions buffer their mutations and apply them
//! atomically on commit; a dropped transaction applies nothing. Outbox
//! claims mark rows as locked for their lifetime, mirroring the
//! skip-locked behavior of the Postgres adapter: a second claim skips
//! locked rows, and dropping an uncommitted claim releases them.

use async_trait::async_trait;
use chirp_core::error::StoreError;
use chirp_core::event::{DomainEvent, OutboxRecord};
use chirp_core::model::{Follow, Post, PostId, User, UserId};
use chirp_core::store::{
    ClaimedBatch, Database, FollowStore, FollowedUser, OutboxStore, PostStore, StorageTx,
    UserStore,
};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

#[derive(Default)]
struct Tables {
    users: HashMap<UserId, User>,
    posts: BTreeMap<PostId, Post>,
    follows: HashMap<(UserId, UserId), Follow>,
    outbox: Vec<OutboxRecord>,
    claimed: HashSet<Uuid>,
}

/// Shared in-memory database handle.
#[derive(Clone, Default)]
pub struct InMemoryDatabase {
    tables: Arc<Mutex<Tables>>,
}

impl InMemoryDatabase {
    /// An empty database.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Tables> {
        self.tables
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// All outbox rows, processed or not, for assertions.
    #[must_use]
    pub fn outbox_records(&self) -> Vec<OutboxRecord> {
        self.lock().outbox.clone()
    }

    /// Directly seed a post, bypassing the write service.
    pub fn insert_post(&self, post: Post) {
        self.lock().posts.insert(post.id, post);
    }
}

enum StagedOp {
    UpsertUser(User),
    SavePost(Post),
    SaveFollow(Follow),
    DeleteFollow(UserId, UserId),
    AppendOutbox(OutboxRecord),
}

/// A buffered transaction over [`InMemoryDatabase`].
pub struct InMemoryTx {
    tables: Arc<Mutex<Tables>>,
    staged: Vec<StagedOp>,
}

#[async_trait]
impl Database for InMemoryDatabase {
    async fn begin(&self, _aggregate: UserId) -> Result<Box<dyn StorageTx>, StoreError> {
        Ok(Box::new(InMemoryTx { tables: Arc::clone(&self.tables), staged: Vec::new() }))
    }
}

#[async_trait]
impl StorageTx for InMemoryTx {
    async fn upsert_user(&mut self, user: &User) -> Result<(), StoreError> {
        self.staged.push(StagedOp::UpsertUser(*user));
        Ok(())
    }

    async fn save_post(&mut self, post: &Post) -> Result<(), StoreError> {
        self.staged.push(StagedOp::SavePost(post.clone()));
        Ok(())
    }

    async fn save_follow(&mut self, follow: &Follow) -> Result<(), StoreError> {
        self.staged.push(StagedOp::SaveFollow(*follow));
        Ok(())
    }

    async fn delete_follow(
        &mut self,
        follower: UserId,
        followee: UserId,
    ) -> Result<bool, StoreError> {
        let existed = {
            let tables = self
                .tables
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            tables.follows.contains_key(&(follower, followee))
        };
        self.staged.push(StagedOp::DeleteFollow(follower, followee));
        Ok(existed)
    }

    async fn append_outbox(
        &mut self,
        event: &DomainEvent,
        request_id: Option<&str>,
    ) -> Result<(), StoreError> {
        let payload = event
            .payload_json()
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        self.staged.push(StagedOp::AppendOutbox(OutboxRecord {
            id: event.event_id(),
            event_type: event.event_type().to_string(),
            aggregate_id: event.aggregate_id(),
            payload,
            request_id: request_id.map(ToString::to_string),
            created_at: event.occurred_at(),
            processed_at: None,
        }));
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let mut tables = self
            .tables
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        for op in self.staged {
            match op {
                StagedOp::UpsertUser(user) => {
                    tables.users.entry(user.id).or_insert(user);
                }
                StagedOp::SavePost(post) => {
                    tables.posts.insert(post.id, post);
                }
                StagedOp::SaveFollow(follow) => {
                    tables
                        .follows
                        .entry((follow.follower, follow.followee))
                        .or_insert(follow);
                }
                StagedOp::DeleteFollow(follower, followee) => {
                    tables.follows.remove(&(follower, followee));
                }
                StagedOp::AppendOutbox(record) => {
                    tables.outbox.push(record);
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl UserStore for InMemoryDatabase {
    async fn upsert_if_absent(&self, user: &User) -> Result<(), StoreError> {
        self.lock().users.entry(user.id).or_insert(*user);
        Ok(())
    }

    async fn exists(&self, id: UserId) -> Result<bool, StoreError> {
        Ok(self.lock().users.contains_key(&id))
    }

    async fn count(&self) -> Result<u64, StoreError> {
        Ok(self.lock().users.len() as u64)
    }

    async fn delete_all(&self) -> Result<u64, StoreError> {
        let mut tables = self.lock();
        let count = tables.users.len() as u64;
        tables.users.clear();
        Ok(count)
    }
}

#[async_trait]
impl PostStore for InMemoryDatabase {
    async fn find_by_id(&self, id: PostId) -> Result<Option<Post>, StoreError> {
        Ok(self.lock().posts.get(&id).cloned())
    }

    async fn find_by_author(
        &self,
        author: UserId,
        cursor: Option<PostId>,
        limit: usize,
    ) -> Result<Vec<Post>, StoreError> {
        let tables = self.lock();
        Ok(tables
            .posts
            .values()
            .rev()
            .filter(|p| p.author == author)
            .filter(|p| cursor.map_or(true, |c| p.id < c))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn find_latest_by_author(
        &self,
        author: UserId,
        limit: usize,
    ) -> Result<Vec<Post>, StoreError> {
        self.find_by_author(author, None, limit).await
    }

    async fn find_by_ids(&self, ids: &[PostId]) -> Result<Vec<Post>, StoreError> {
        let tables = self.lock();
        Ok(ids.iter().filter_map(|id| tables.posts.get(id).cloned()).collect())
    }

    async fn count(&self) -> Result<u64, StoreError> {
        Ok(self.lock().posts.len() as u64)
    }

    async fn delete_all(&self) -> Result<u64, StoreError> {
        let mut tables = self.lock();
        let count = tables.posts.len() as u64;
        tables.posts.clear();
        Ok(count)
    }
}

#[async_trait]
impl FollowStore for InMemoryDatabase {
    async fn exists(&self, follower: UserId, followee: UserId) -> Result<bool, StoreError> {
        Ok(self.lock().follows.contains_key(&(follower, followee)))
    }

    async fn find_following(
        &self,
        user: UserId,
        cursor: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<Vec<FollowedUser>, StoreError> {
        let tables = self.lock();
        let mut edges: Vec<&Follow> = tables
            .follows
            .values()
            .filter(|f| f.follower == user)
            .filter(|f| cursor.map_or(true, |c| f.created_at < c))
            .collect();
        edges.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(edges
            .into_iter()
            .take(limit)
            .map(|f| FollowedUser {
                user: tables
                    .users
                    .get(&f.followee)
                    .copied()
                    .unwrap_or_else(|| User::new(f.followee)),
                followed_at: f.created_at,
            })
            .collect())
    }

    async fn find_followers(
        &self,
        user: UserId,
        cursor: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<Vec<FollowedUser>, StoreError> {
        let tables = self.lock();
        let mut edges: Vec<&Follow> = tables
            .follows
            .values()
            .filter(|f| f.followee == user)
            .filter(|f| cursor.map_or(true, |c| f.created_at < c))
            .collect();
        edges.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(edges
            .into_iter()
            .take(limit)
            .map(|f| FollowedUser {
                user: tables
                    .users
                    .get(&f.follower)
                    .copied()
                    .unwrap_or_else(|| User::new(f.follower)),
                followed_at: f.created_at,
            })
            .collect())
    }

    async fn follower_ids(&self, user: UserId) -> Result<Vec<UserId>, StoreError> {
        Ok(self
            .lock()
            .follows
            .values()
            .filter(|f| f.followee == user)
            .map(|f| f.follower)
            .collect())
    }

    async fn count_followers(&self, user: UserId) -> Result<u64, StoreError> {
        Ok(self
            .lock()
            .follows
            .values()
            .filter(|f| f.followee == user)
            .count() as u64)
    }

    async fn followed_celebrities(
        &self,
        user: UserId,
        threshold: u64,
    ) -> Result<Vec<UserId>, StoreError> {
        let tables = self.lock();
        let mut follower_counts: HashMap<UserId, u64> = HashMap::new();
        for follow in tables.follows.values() {
            *follower_counts.entry(follow.followee).or_default() += 1;
        }
        Ok(tables
            .follows
            .values()
            .filter(|f| f.follower == user)
            .map(|f| f.followee)
            .filter(|followee| follower_counts.get(followee).copied().unwrap_or(0) > threshold)
            .collect())
    }

    async fn count(&self) -> Result<u64, StoreError> {
        Ok(self.lock().follows.len() as u64)
    }

    async fn delete_all(&self) -> Result<u64, StoreError> {
        let mut tables = self.lock();
        let count = tables.follows.len() as u64;
        tables.follows.clear();
        Ok(count)
    }
}

#[async_trait]
impl OutboxStore for InMemoryDatabase {
    async fn claim_batch(&self, limit: usize) -> Result<Box<dyn ClaimedBatch>, StoreError> {
        let mut tables = self.lock();

        let mut candidates: Vec<OutboxRecord> = tables
            .outbox
            .iter()
            .filter(|r| r.processed_at.is_none() && !tables.claimed.contains(&r.id))
            .cloned()
            .collect();
        candidates.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        candidates.truncate(limit);

        for record in &candidates {
            tables.claimed.insert(record.id);
        }

        Ok(Box::new(InMemoryClaimedBatch {
            tables: Arc::clone(&self.tables),
            records: candidates,
            committed: false,
        }))
    }

    async fn compact_processed_before(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut tables = self.lock();
        let before = tables.outbox.len();
        tables
            .outbox
            .retain(|r| r.processed_at.map_or(true, |t| t >= cutoff));
        Ok((before - tables.outbox.len()) as u64)
    }

    async fn count_unprocessed(&self) -> Result<u64, StoreError> {
        Ok(self
            .lock()
            .outbox
            .iter()
            .filter(|r| r.processed_at.is_none())
            .count() as u64)
    }

    async fn delete_all(&self) -> Result<u64, StoreError> {
        let mut tables = self.lock();
        let count = tables.outbox.len() as u64;
        tables.outbox.clear();
        tables.claimed.clear();
        Ok(count)
    }
}

/// A claimed outbox slice; uncommitted claims are released on drop.
pub struct InMemoryClaimedBatch {
    tables: Arc<Mutex<Tables>>,
    records: Vec<OutboxRecord>,
    committed: bool,
}

#[async_trait]
impl ClaimedBatch for InMemoryClaimedBatch {
    fn records(&self) -> &[OutboxRecord] {
        &self.records
    }

    async fn commit(mut self: Box<Self>) -> Result<(), StoreError> {
        let now = Utc::now();
        let mut tables = self
            .tables
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        for record in &self.records {
            tables.claimed.remove(&record.id);
            if let Some(row) = tables.outbox.iter_mut().find(|r| r.id == record.id) {
                row.processed_at = Some(now);
            }
        }
        self.committed = true;
        Ok(())
    }
}

impl Drop for InMemoryClaimedBatch {
    fn drop(&mut self) {
        if !self.committed {
            let mut tables = self
                .tables
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            for record in &self.records {
                tables.claimed.remove(&record.id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chirp_core::id::IdGenerator;

    fn post(generator: &IdGenerator, author: UserId, content: &str) -> Post {
        let id = PostId::from_uuid(generator.generate());
        Post::create(id, author, content).unwrap()
    }

    #[tokio::test]
    async fn transaction_is_atomic() {
        let db = InMemoryDatabase::new();
        let author = UserId::random();
        let generator = IdGenerator::new();

        // Dropped without commit: nothing applies.
        {
            let mut tx = db.begin(author).await.unwrap();
            tx.save_post(&post(&generator, author, "lost")).await.unwrap();
        }
        assert_eq!(PostStore::count(&db).await.unwrap(), 0);

        // Committed: both the post and the outbox row appear.
        let p = post(&generator, author, "kept");
        let event = DomainEvent::post_created(
            generator.generate(),
            p.id,
            author,
            p.content.clone(),
        );
        let mut tx = db.begin(author).await.unwrap();
        tx.save_post(&p).await.unwrap();
        tx.append_outbox(&event, Some("req-1")).await.unwrap();
        tx.commit().await.unwrap();

        assert_eq!(PostStore::count(&db).await.unwrap(), 1);
        assert_eq!(db.count_unprocessed().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn find_by_author_pages_id_descending() {
        let db = InMemoryDatabase::new();
        let author = UserId::random();
        let generator = IdGenerator::new();

        let posts: Vec<Post> = (0..5).map(|i| post(&generator, author, &format!("p{i}"))).collect();
        for p in &posts {
            db.insert_post(p.clone());
        }

        let first = db.find_by_author(author, None, 2).await.unwrap();
        assert_eq!(first[0].id, posts[4].id);
        assert_eq!(first[1].id, posts[3].id);

        let rest = db
            .find_by_author(author, Some(first[1].id), 10)
            .await
            .unwrap();
        assert_eq!(
            rest.iter().map(|p| p.id).collect::<Vec<_>>(),
            vec![posts[2].id, posts[1].id, posts[0].id]
        );
    }

    #[tokio::test]
    async fn claims_skip_locked_rows_and_release_on_drop() {
        let db = InMemoryDatabase::new();
        let author = UserId::random();
        let generator = IdGenerator::new();

        let event = DomainEvent::post_created(
            generator.generate(),
            PostId::from_uuid(generator.generate()),
            author,
            "x".to_string(),
        );
        let mut tx = db.begin(author).await.unwrap();
        tx.append_outbox(&event, None).await.unwrap();
        tx.commit().await.unwrap();

        // While the first claim is live a second claim sees nothing.
        let first = db.claim_batch(10).await.unwrap();
        assert_eq!(first.records().len(), 1);
        let second = db.claim_batch(10).await.unwrap();
        assert!(second.records().is_empty());

        // Dropping the first claim releases the row unprocessed.
        drop(second);
        drop(first);
        let retry = db.claim_batch(10).await.unwrap();
        assert_eq!(retry.records().len(), 1);

        // Committing marks it processed for good.
        retry.commit().await.unwrap();
        assert_eq!(db.count_unprocessed().await.unwrap(), 0);
        let after = db.claim_batch(10).await.unwrap();
        assert!(after.records().is_empty());
    }

    #[tokio::test]
    async fn celebrity_query_uses_strict_threshold() {
        let db = InMemoryDatabase::new();
        let reader = UserId::random();
        let celebrity = UserId::random();
        let regular = UserId::random();

        for target in [celebrity, regular] {
            let follow = Follow::create(reader, target).unwrap();
            let mut tx = db.begin(reader).await.unwrap();
            tx.save_follow(&follow).await.unwrap();
            tx.commit().await.unwrap();
        }
        // Push the celebrity past a threshold of 2 (reader + 2 = 3 > 2).
        for _ in 0..2 {
            let fan = UserId::random();
            let follow = Follow::create(fan, celebrity).unwrap();
            let mut tx = db.begin(fan).await.unwrap();
            tx.save_follow(&follow).await.unwrap();
            tx.commit().await.unwrap();
        }

        assert_eq!(db.followed_celebrities(reader, 2).await.unwrap(), vec![celebrity]);
        // Exactly at the threshold does not qualify.
        assert!(db.followed_celebrities(reader, 3).await.unwrap().is_empty());
    }
}

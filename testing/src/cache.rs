//! In-memory timeline cache.
//!
//! Mirrors the Redis sorted-set semantics: one set per reader, members
//! keyed by score, ties broken by member string the way Redis breaks
//! them, every write trimmed to the configured cap.

use async_trait::async_trait;
use chirp_core::error::StoreError;
use chirp_core::model::{PostId, UserId};
use chirp_core::store::{ScoredPost, TimelineCache};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Shared in-memory timeline cache handle.
#[derive(Clone)]
pub struct InMemoryTimelineCache {
    timelines: Arc<Mutex<HashMap<UserId, HashMap<PostId, i64>>>>,
    max_size: usize,
}

impl InMemoryTimelineCache {
    /// An empty cache with the given per-reader cap.
    #[must_use]
    pub fn new(max_size: usize) -> Self {
        Self { timelines: Arc::new(Mutex::new(HashMap::new())), max_size }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<UserId, HashMap<PostId, i64>>> {
        self.timelines
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Current timeline of `reader`, score-descending, for assertions.
    #[must_use]
    pub fn timeline(&self, reader: UserId) -> Vec<PostId> {
        self.lock()
            .get(&reader)
            .map(|set| Self::sorted_desc(set, None, usize::MAX))
            .unwrap_or_default()
    }

    /// Members sorted the way Redis returns a reverse range: score
    /// descending, equal scores by member descending.
    fn sorted_desc(
        set: &HashMap<PostId, i64>,
        max_score_exclusive: Option<i64>,
        limit: usize,
    ) -> Vec<PostId> {
        let mut entries: Vec<(i64, PostId)> = set
            .iter()
            .filter(|(_, score)| max_score_exclusive.map_or(true, |max| **score < max))
            .map(|(id, score)| (*score, *id))
            .collect();
        entries.sort_by(|a, b| b.cmp(a));
        entries.into_iter().take(limit).map(|(_, id)| id).collect()
    }

    fn trim_locked(set: &mut HashMap<PostId, i64>, max_size: usize) {
        if set.len() <= max_size {
            return;
        }
        let keep = Self::sorted_desc(set, None, max_size);
        set.retain(|id, _| keep.contains(id));
    }
}

#[async_trait]
impl TimelineCache for InMemoryTimelineCache {
    async fn add(&self, reader: UserId, entry: ScoredPost) -> Result<(), StoreError> {
        let mut timelines = self.lock();
        let set = timelines.entry(reader).or_default();
        set.insert(entry.post_id, entry.score);
        Self::trim_locked(set, self.max_size);
        Ok(())
    }

    async fn add_many(&self, reader: UserId, entries: &[ScoredPost]) -> Result<(), StoreError> {
        if entries.is_empty() {
            return Ok(());
        }
        let mut timelines = self.lock();
        let set = timelines.entry(reader).or_default();
        for entry in entries {
            set.insert(entry.post_id, entry.score);
        }
        Self::trim_locked(set, self.max_size);
        Ok(())
    }

    async fn remove(&self, reader: UserId, post_id: PostId) -> Result<(), StoreError> {
        if let Some(set) = self.lock().get_mut(&reader) {
            set.remove(&post_id);
        }
        Ok(())
    }

    async fn remove_many(&self, reader: UserId, post_ids: &[PostId]) -> Result<(), StoreError> {
        if let Some(set) = self.lock().get_mut(&reader) {
            for id in post_ids {
                set.remove(id);
            }
        }
        Ok(())
    }

    async fn range(
        &self,
        reader: UserId,
        max_score_exclusive: Option<i64>,
        limit: usize,
    ) -> Result<Vec<PostId>, StoreError> {
        Ok(self
            .lock()
            .get(&reader)
            .map(|set| Self::sorted_desc(set, max_score_exclusive, limit))
            .unwrap_or_default())
    }

    async fn trim(&self, reader: UserId, max_size: usize) -> Result<(), StoreError> {
        if let Some(set) = self.lock().get_mut(&reader) {
            Self::trim_locked(set, max_size);
        }
        Ok(())
    }

    async fn flush_all(&self) -> Result<u64, StoreError> {
        let mut timelines = self.lock();
        let count = timelines.len() as u64;
        timelines.clear();
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn scored(score: i64) -> ScoredPost {
        // Hand-assemble an id whose embedded timestamp equals `score`.
        let high = ((score as u64) << 16) | (0x7 << 12);
        ScoredPost::new(PostId::from_uuid(Uuid::from_u64_pair(high, 1 << 63)))
    }

    #[tokio::test]
    async fn range_is_score_descending() {
        let cache = InMemoryTimelineCache::new(10);
        let reader = UserId::random();
        let (a, b, c) = (scored(1), scored(3), scored(2));

        cache.add_many(reader, &[a, b, c]).await.unwrap();

        let ids = cache.range(reader, None, 10).await.unwrap();
        assert_eq!(ids, vec![b.post_id, c.post_id, a.post_id]);
    }

    #[tokio::test]
    async fn max_score_bound_is_exclusive() {
        let cache = InMemoryTimelineCache::new(10);
        let reader = UserId::random();
        let (a, b, c) = (scored(1), scored(2), scored(3));
        cache.add_many(reader, &[a, b, c]).await.unwrap();

        let ids = cache.range(reader, Some(3), 10).await.unwrap();
        assert_eq!(ids, vec![b.post_id, a.post_id]);
    }

    #[tokio::test]
    async fn writes_trim_to_cap_evicting_lowest_scores() {
        let cache = InMemoryTimelineCache::new(3);
        let reader = UserId::random();
        for score in 1..=5 {
            cache.add(reader, scored(score)).await.unwrap();
        }

        let ids = cache.timeline(reader);
        assert_eq!(ids.len(), 3);
        assert_eq!(ids[0], scored(5).post_id);
        assert_eq!(ids[2], scored(3).post_id);
    }

    #[tokio::test]
    async fn duplicate_add_is_idempotent() {
        let cache = InMemoryTimelineCache::new(10);
        let reader = UserId::random();
        let entry = scored(7);

        cache.add(reader, entry).await.unwrap();
        cache.add(reader, entry).await.unwrap();

        assert_eq!(cache.timeline(reader), vec![entry.post_id]);
    }

    #[tokio::test]
    async fn remove_of_absent_member_is_noop() {
        let cache = InMemoryTimelineCache::new(10);
        let reader = UserId::random();
        let present = scored(1);
        cache.add(reader, present).await.unwrap();

        cache
            .remove_many(reader, &[present.post_id, scored(9).post_id])
            .await
            .unwrap();
        assert!(cache.timeline(reader).is_empty());
    }
}

//! # In-Memory Store
//!
//! Local development and test backend. Feedback entries carry a version
//! counter that plays the role of Redis `WATCH`: a write commits only if the
//! version is unchanged since the read.
use async_trait::async_trait;
use dashmap::DashMap;

use crate::{
    models::{Feedback, FeedbackKey, Meal, UserData, UserId},
    store::{ApplyFn, Store, StoreError, TxnOutcome},
};

#[derive(Default)]
struct Versioned {
    version: u64,
    record: Option<Feedback>,
}

#[derive(Default)]
pub struct MemoryStore {
    users: DashMap<UserId, UserData>,
    meals: DashMap<String, Meal>,
    feedback: DashMap<FeedbackKey, Versioned>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feedback_count(&self) -> usize {
        self.feedback
            .iter()
            .filter(|entry| entry.record.is_some())
            .count()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn user(&self, id: UserId) -> Result<Option<UserData>, StoreError> {
        Ok(self.users.get(&id).map(|user| user.clone()))
    }

    async fn put_user(&self, user: &UserData) -> Result<(), StoreError> {
        self.users.insert(user.id, user.clone());
        Ok(())
    }

    async fn meal(&self, id: &str) -> Result<Option<Meal>, StoreError> {
        Ok(self.meals.get(id).map(|meal| meal.clone()))
    }

    async fn put_meal(&self, meal: &Meal) -> Result<(), StoreError> {
        self.meals.insert(meal.id.clone(), meal.clone());
        Ok(())
    }

    async fn feedback(&self, key: &FeedbackKey) -> Result<Option<Feedback>, StoreError> {
        Ok(self.feedback.get(key).and_then(|entry| entry.record.clone()))
    }

    async fn meal_feedback(&self, meal_id: &str) -> Result<Vec<Feedback>, StoreError> {
        let mut feedback: Vec<Feedback> = self
            .feedback
            .iter()
            .filter(|entry| entry.key().meal_id == meal_id)
            .filter_map(|entry| entry.record.clone())
            .collect();

        feedback.sort_by_key(|f| f.author);
        Ok(feedback)
    }

    async fn try_write_feedback(
        &self,
        key: &FeedbackKey,
        apply: ApplyFn<'_>,
    ) -> Result<TxnOutcome, StoreError> {
        // no shard lock may be held while `apply` runs
        let (seen_version, current) = match self.feedback.get(key) {
            Some(entry) => (entry.version, entry.record.clone()),
            None => (0, None),
        };

        let next = apply(current);

        let mut entry = self.feedback.entry(key.clone()).or_default();
        if entry.version != seen_version {
            return Ok(TxnOutcome::Conflict);
        }

        entry.version += 1;
        entry.record = Some(next.clone());

        Ok(TxnOutcome::Committed(next))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Stars;

    fn key(meal_id: &str, author: UserId) -> FeedbackKey {
        FeedbackKey {
            meal_id: meal_id.to_string(),
            author,
        }
    }

    fn record(key: &FeedbackKey, stars: i64, text: &str) -> Feedback {
        Feedback {
            meal_id: key.meal_id.clone(),
            author: key.author,
            stars: Stars::try_from(stars).unwrap(),
            text: text.to_string(),
        }
    }

    #[tokio::test]
    async fn test_write_then_read() {
        let store = MemoryStore::new();
        let key = key("abc", 1);

        let outcome = store
            .try_write_feedback(&key, &|current| {
                assert!(current.is_none());
                record(&key, 4, "good")
            })
            .await
            .unwrap();

        assert_eq!(outcome, TxnOutcome::Committed(record(&key, 4, "good")));
        assert_eq!(store.feedback(&key).await.unwrap(), Some(record(&key, 4, "good")));
    }

    #[tokio::test]
    async fn test_write_sees_existing_record() {
        let store = MemoryStore::new();
        let key = key("abc", 1);

        store
            .try_write_feedback(&key, &|_| record(&key, 2, "meh"))
            .await
            .unwrap();

        store
            .try_write_feedback(&key, &|current| {
                assert_eq!(current, Some(record(&key, 2, "meh")));
                record(&key, 3, "fine")
            })
            .await
            .unwrap();

        assert_eq!(store.feedback_count(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_commit_is_a_conflict() {
        let store = MemoryStore::new();
        let key = key("abc", 1);

        let outcome = store
            .try_write_feedback(&key, &|_| {
                // another writer commits between our read and our write
                store.feedback.entry(key.clone()).or_default().version += 1;
                record(&key, 5, "lost")
            })
            .await
            .unwrap();

        assert_eq!(outcome, TxnOutcome::Conflict);
        assert_eq!(store.feedback(&key).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_meal_feedback_filters_by_meal() {
        let store = MemoryStore::new();

        for (meal_id, author) in [("abc", 2), ("abc", 1), ("def", 1)] {
            let key = key(meal_id, author);
            store
                .try_write_feedback(&key, &|_| record(&key, 3, "ok"))
                .await
                .unwrap();
        }

        let authors: Vec<UserId> = store
            .meal_feedback("abc")
            .await
            .unwrap()
            .iter()
            .map(|f| f.author)
            .collect();

        assert_eq!(authors, vec![1, 2]);
    }
}

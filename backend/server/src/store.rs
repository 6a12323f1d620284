use async_trait::async_trait;
use thiserror::Error;

use crate::models::{Feedback, FeedbackKey, Meal, UserData, UserId};

/// Builds the record to commit from whatever is currently stored at the key.
pub type ApplyFn<'a> = &'a (dyn Fn(Option<Feedback>) -> Feedback + Send + Sync);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxnOutcome {
    Committed(Feedback),
    Conflict,
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Corrupt record at {key}: {reason}")]
    Corrupt { key: String, reason: String },
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn user(&self, id: UserId) -> Result<Option<UserData>, StoreError>;

    async fn put_user(&self, user: &UserData) -> Result<(), StoreError>;

    async fn meal(&self, id: &str) -> Result<Option<Meal>, StoreError>;

    async fn put_meal(&self, meal: &Meal) -> Result<(), StoreError>;

    async fn feedback(&self, key: &FeedbackKey) -> Result<Option<Feedback>, StoreError>;

    async fn meal_feedback(&self, meal_id: &str) -> Result<Vec<Feedback>, StoreError>;

    /// One optimistic read-modify-write of the record at `key`. Commits only
    /// if nothing else committed to `key` between the read and the write.
    async fn try_write_feedback(
        &self,
        key: &FeedbackKey,
        apply: ApplyFn<'_>,
    ) -> Result<TxnOutcome, StoreError>;
}

//! # Feedback Upserts
//!
//! One record per (meal, author). Submitting again overwrites `stars` and
//! `text` in place.
//!
//! Stars are validated before anything touches the store. The read-modify-write
//! then runs as a unit against the store; when another writer commits to the
//! same key in between, the whole unit is retried from the read, up to
//! [`TxnPolicy::attempts`] times and within [`TxnPolicy::timeout`] overall.
use tokio::time::timeout;
use tracing::{debug, error, warn};

use crate::{
    config::TxnPolicy,
    error::AppError,
    models::{Feedback, FeedbackKey, Stars},
    store::{ApplyFn, Store, TxnOutcome},
};

/// Full overwrite of the existing record, or a fresh one for the key.
fn apply_submission(
    existing: Option<Feedback>,
    key: &FeedbackKey,
    stars: Stars,
    text: &str,
) -> Feedback {
    let mut feedback = existing.unwrap_or_else(|| Feedback {
        meal_id: key.meal_id.clone(),
        author: key.author,
        stars,
        text: String::new(),
    });

    feedback.stars = stars;
    feedback.text = text.to_string();
    feedback
}

pub async fn upsert_feedback(
    store: &dyn Store,
    policy: &TxnPolicy,
    key: &FeedbackKey,
    stars: i64,
    text: &str,
) -> Result<Feedback, AppError> {
    let stars = Stars::try_from(stars)?;
    let apply = |existing: Option<Feedback>| apply_submission(existing, key, stars, text);

    timeout(policy.timeout, write_with_retries(store, key, &apply, policy.attempts))
        .await
        .map_err(|_| {
            error!("Feedback write on {key} timed out after {:?}", policy.timeout);
            AppError::TransactionTimeout
        })?
}

async fn write_with_retries(
    store: &dyn Store,
    key: &FeedbackKey,
    apply: ApplyFn<'_>,
    attempts: u32,
) -> Result<Feedback, AppError> {
    for attempt in 1..=attempts {
        match store.try_write_feedback(key, apply).await? {
            TxnOutcome::Committed(feedback) => {
                debug!("Feedback on {key} committed on attempt {attempt}");
                return Ok(feedback);
            }
            TxnOutcome::Conflict => {
                warn!("Feedback write conflict on {key}, attempt {attempt}/{attempts}");
            }
        }
    }

    error!("Feedback on {key} still conflicting after {attempts} attempts");
    Err(AppError::TransactionConflict { attempts })
}

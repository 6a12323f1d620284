//! # Redis
//!
//! RAM database holding users, meals and feedback.
//!
//! ## Layout
//!
//! - `user:{id}`: hash with `full_name`
//! - `meal:{id}`: hash with `title` and `dt` (RFC 3339)
//! - `feedback:{author}:{meal}`: hash with `meal`, `stars`, `text`
//! - `meal:{id}:feedback`: set of author ids that left feedback on the meal
//!
//! The feedback hash key is built from the (author, meal) pair, so there is
//! never more than one record per pair. No searching involved.
//!
//! ## Feedback Writes
//!
//! Optimistic locking, one dedicated connection per attempt:
//! 1. `WATCH feedback:{author}:{meal}`
//! 2. `HGETALL` the current record
//! 3. Build the new record
//! 4. `MULTI` / `HSET` + `SADD` / `EXEC`
//!
//! A nil `EXEC` reply means someone else touched the key after step 1. The
//! caller retries from step 1. Writes on other keys never wait on this one.
//!
//! The shared [`ConnectionManager`] is multiplexed, so `WATCH` state on it
//! would leak across requests. Hence the dedicated connection.
use std::{collections::HashMap, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::{
    AsyncCommands, Client,
    aio::{ConnectionManager, ConnectionManagerConfig},
};

use crate::{
    models::{Feedback, FeedbackKey, Meal, Stars, UserData, UserId},
    store::{ApplyFn, Store, StoreError, TxnOutcome},
};

type Fields = HashMap<String, String>;

pub struct RedisStore {
    client: Client,
    connection: ConnectionManager,
}

pub async fn init_redis(redis_url: &str) -> Result<RedisStore, StoreError> {
    let config = ConnectionManagerConfig::new()
        .set_number_of_retries(1)
        .set_connection_timeout(Duration::from_millis(100));

    let client = Client::open(redis_url)?;
    let connection = client.get_connection_manager_with_config(config).await?;

    Ok(RedisStore { client, connection })
}

fn user_key(id: UserId) -> String {
    format!("user:{id}")
}

fn meal_key(id: &str) -> String {
    format!("meal:{id}")
}

fn meal_feedback_key(id: &str) -> String {
    format!("meal:{id}:feedback")
}

fn feedback_key(key: &FeedbackKey) -> String {
    format!("feedback:{}:{}", key.author, key.meal_id)
}

fn corrupt(key: &str, reason: impl Into<String>) -> StoreError {
    StoreError::Corrupt {
        key: key.to_string(),
        reason: reason.into(),
    }
}

fn field<'a>(fields: &'a Fields, redis_key: &str, name: &str) -> Result<&'a str, StoreError> {
    fields
        .get(name)
        .map(String::as_str)
        .ok_or_else(|| corrupt(redis_key, format!("missing field {name}")))
}

fn parse_user(id: UserId, fields: &Fields) -> Result<Option<UserData>, StoreError> {
    if fields.is_empty() {
        return Ok(None);
    }

    let redis_key = user_key(id);

    Ok(Some(UserData {
        id,
        full_name: field(fields, &redis_key, "full_name")?.to_string(),
    }))
}

fn parse_meal(id: &str, fields: &Fields) -> Result<Option<Meal>, StoreError> {
    if fields.is_empty() {
        return Ok(None);
    }

    let redis_key = meal_key(id);
    let dt = DateTime::parse_from_rfc3339(field(fields, &redis_key, "dt")?)
        .map_err(|e| corrupt(&redis_key, format!("bad dt: {e}")))?
        .with_timezone(&Utc);

    Ok(Some(Meal {
        id: id.to_string(),
        title: field(fields, &redis_key, "title")?.to_string(),
        dt,
    }))
}

fn parse_feedback(key: &FeedbackKey, fields: &Fields) -> Result<Option<Feedback>, StoreError> {
    if fields.is_empty() {
        return Ok(None);
    }

    let redis_key = feedback_key(key);
    let stars = field(fields, &redis_key, "stars")?
        .parse::<i64>()
        .ok()
        .and_then(|stars| Stars::try_from(stars).ok())
        .ok_or_else(|| corrupt(&redis_key, "bad stars"))?;

    Ok(Some(Feedback {
        meal_id: field(fields, &redis_key, "meal")?.to_string(),
        author: key.author,
        stars,
        text: field(fields, &redis_key, "text")?.to_string(),
    }))
}

#[async_trait]
impl Store for RedisStore {
    async fn user(&self, id: UserId) -> Result<Option<UserData>, StoreError> {
        let mut connection = self.connection.clone();
        let fields: Fields = connection.hgetall(user_key(id)).await?;

        parse_user(id, &fields)
    }

    async fn put_user(&self, user: &UserData) -> Result<(), StoreError> {
        let mut connection = self.connection.clone();
        let _: () = connection
            .hset(user_key(user.id), "full_name", &user.full_name)
            .await?;

        Ok(())
    }

    async fn meal(&self, id: &str) -> Result<Option<Meal>, StoreError> {
        let mut connection = self.connection.clone();
        let fields: Fields = connection.hgetall(meal_key(id)).await?;

        parse_meal(id, &fields)
    }

    async fn put_meal(&self, meal: &Meal) -> Result<(), StoreError> {
        let mut connection = self.connection.clone();
        let _: () = connection
            .hset_multiple(
                meal_key(&meal.id),
                &[
                    ("title", meal.title.clone()),
                    ("dt", meal.dt.to_rfc3339()),
                ],
            )
            .await?;

        Ok(())
    }

    async fn feedback(&self, key: &FeedbackKey) -> Result<Option<Feedback>, StoreError> {
        let mut connection = self.connection.clone();
        let fields: Fields = connection.hgetall(feedback_key(key)).await?;

        parse_feedback(key, &fields)
    }

    async fn meal_feedback(&self, meal_id: &str) -> Result<Vec<Feedback>, StoreError> {
        let mut connection = self.connection.clone();
        let mut authors: Vec<UserId> = connection.smembers(meal_feedback_key(meal_id)).await?;
        authors.sort_unstable();

        let keys: Vec<FeedbackKey> = authors
            .into_iter()
            .map(|author| FeedbackKey {
                meal_id: meal_id.to_string(),
                author,
            })
            .collect();

        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let mut pipe = redis::pipe();
        for key in &keys {
            pipe.hgetall(feedback_key(key));
        }
        let records: Vec<Fields> = pipe.query_async(&mut connection).await?;

        let mut feedback = Vec::with_capacity(keys.len());
        for (key, fields) in keys.iter().zip(records) {
            if let Some(record) = parse_feedback(key, &fields)? {
                feedback.push(record);
            }
        }

        Ok(feedback)
    }

    async fn try_write_feedback(
        &self,
        key: &FeedbackKey,
        apply: ApplyFn<'_>,
    ) -> Result<TxnOutcome, StoreError> {
        let redis_key = feedback_key(key);
        let mut connection = self.client.get_multiplexed_async_connection().await?;

        redis::cmd("WATCH")
            .arg(&redis_key)
            .query_async::<()>(&mut connection)
            .await?;

        let fields: Fields = connection.hgetall(&redis_key).await?;
        let next = apply(parse_feedback(key, &fields)?);

        // nil EXEC reply when the watched key changed
        let committed: Option<(i64,)> = redis::pipe()
            .atomic()
            .hset_multiple(
                &redis_key,
                &[
                    ("meal", next.meal_id.clone()),
                    ("stars", next.stars.get().to_string()),
                    ("text", next.text.clone()),
                ],
            )
            .ignore()
            .sadd(meal_feedback_key(&key.meal_id), key.author)
            .ignore()
            .hlen(&redis_key)
            .query_async(&mut connection)
            .await?;

        Ok(match committed {
            Some(_) => TxnOutcome::Committed(next),
            None => TxnOutcome::Conflict,
        })
    }
}

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::AppError;

pub type UserId = i64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserData {
    pub id: UserId,
    pub full_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Meal {
    pub id: String,
    pub title: String,
    pub dt: DateTime<Utc>,
}

/// Identity of a feedback record. One author gets exactly one record per meal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FeedbackKey {
    pub meal_id: String,
    pub author: UserId,
}

impl fmt::Display for FeedbackKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.meal_id, self.author)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Feedback {
    pub meal_id: String,
    pub author: UserId,
    pub stars: Stars,
    pub text: String,
}

impl Feedback {
    pub fn key(&self) -> FeedbackKey {
        FeedbackKey {
            meal_id: self.meal_id.clone(),
            author: self.author,
        }
    }
}

/// Star rating, always within `1..=5`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct Stars(u8);

impl Stars {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 5;

    pub fn get(self) -> u8 {
        self.0
    }
}

impl TryFrom<i64> for Stars {
    type Error = AppError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match u8::try_from(value) {
            Ok(stars) if (Self::MIN..=Self::MAX).contains(&stars) => Ok(Self(stars)),
            _ => Err(AppError::Validation(format!(
                "stars must be between {} and {}, got {value}",
                Self::MIN,
                Self::MAX
            ))),
        }
    }
}

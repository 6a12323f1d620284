use std::sync::Arc;

use axum::{
    Extension, Form, Json,
    extract::{Path, State},
    http::{StatusCode, header::LOCATION},
    response::IntoResponse,
};
use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{
    error::AppError,
    feedback::upsert_feedback,
    models::{Feedback, FeedbackKey, Meal, UserData},
    session::CurrentUser,
    state::AppState,
    store::StoreError,
};

#[derive(Deserialize)]
pub struct FeedbackForm {
    #[serde(default)]
    stars: String,
    #[serde(default)]
    text: String,
}

#[derive(Serialize)]
pub struct FeedbackWithAuthor {
    pub feedback: Feedback,
    pub author: Option<UserData>,
}

#[derive(Serialize)]
pub struct MealView {
    pub user_data: UserData,
    pub meal: Meal,
    pub feedback_with_authors: Vec<FeedbackWithAuthor>,
}

fn is_meal_id(id: &str) -> bool {
    !id.is_empty() && id.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

async fn find_meal(state: &AppState, meal_id: &str) -> Result<Meal, AppError> {
    if !is_meal_id(meal_id) {
        return Err(AppError::MealNotFound(meal_id.to_string()));
    }

    state
        .store
        .meal(meal_id)
        .await?
        .ok_or_else(|| AppError::MealNotFound(meal_id.to_string()))
}

fn parse_stars(stars: &str) -> Result<i64, AppError> {
    stars
        .trim()
        .parse()
        .map_err(|_| AppError::Validation(format!("stars must be a number, got {stars:?}")))
}

pub async fn view_meal_handler(
    State(state): State<Arc<AppState>>,
    Path(meal_id): Path<String>,
    Extension(CurrentUser(user_data)): Extension<CurrentUser>,
) -> Result<impl IntoResponse, AppError> {
    let meal = find_meal(&state, &meal_id).await?;
    let store = state.store.as_ref();

    // all author lookups in flight at once
    let feedback_with_authors = try_join_all(
        store
            .meal_feedback(&meal.id)
            .await?
            .into_iter()
            .map(|feedback| async move {
                let author = store.user(feedback.author).await?;
                Ok::<_, StoreError>(FeedbackWithAuthor { feedback, author })
            }),
    )
    .await?;

    Ok(Json(MealView {
        user_data,
        meal,
        feedback_with_authors,
    }))
}

pub async fn post_meal_feedback_handler(
    State(state): State<Arc<AppState>>,
    Path(meal_id): Path<String>,
    Extension(CurrentUser(user_data)): Extension<CurrentUser>,
    Form(form): Form<FeedbackForm>,
) -> Result<impl IntoResponse, AppError> {
    let meal = find_meal(&state, &meal_id).await?;
    let stars = parse_stars(&form.stars)?;

    let key = FeedbackKey {
        meal_id: meal.id,
        author: user_data.id,
    };
    upsert_feedback(state.store.as_ref(), &state.config.txn, &key, stars, &form.text).await?;

    info!("Feedback saved for {key}");

    Ok((StatusCode::FOUND, [(LOCATION, format!("/meals/{}", key.meal_id))]))
}

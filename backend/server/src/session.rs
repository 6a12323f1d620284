//! # Sessions
//!
//! Every request passes through [`resolve_session`], which attaches a
//! [`Session`] extension:
//! - no `sid` / `sid_sig` pair: anonymous
//! - pair present but signature wrong: anonymous, silently
//! - pair trusted: the user id, with the user record fetched lazily
//!
//! The user record is fetched at most once per request and the result is kept
//! for the rest of it, including "not found". A user deleted mid-request is
//! still seen by that request.
//!
//! Routes that need a user sit behind [`require_login`], which answers 401 when
//! the session has no user record and otherwise hands the handler a
//! [`CurrentUser`].
use std::sync::Arc;

use axum::{
    Extension,
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::cookie::CookieJar;
use tokio::sync::OnceCell;
use tracing::warn;

use crate::{
    error::AppError,
    models::{UserData, UserId},
    signing::{CookieSigner, read_signed_cookie},
    state::AppState,
    store::Store,
};

pub const SESSION_COOKIE: &str = "sid";

#[derive(Clone)]
pub struct Session {
    user_id: Option<UserId>,
    user: Arc<OnceCell<Option<UserData>>>,
    store: Arc<dyn Store>,
}

impl Session {
    pub fn anonymous(store: Arc<dyn Store>) -> Self {
        Self::for_user(None, store)
    }

    fn for_user(user_id: Option<UserId>, store: Arc<dyn Store>) -> Self {
        Self {
            user_id,
            user: Arc::new(OnceCell::new()),
            store,
        }
    }

    pub fn from_cookies(jar: &CookieJar, signer: &CookieSigner, store: Arc<dyn Store>) -> Self {
        let user_id = read_signed_cookie(jar, signer, SESSION_COOKIE).and_then(|value| {
            value
                .parse::<UserId>()
                .map_err(|e| warn!("Signed {SESSION_COOKIE} is not a user id: {e}"))
                .ok()
        });

        Self::for_user(user_id, store)
    }

    pub fn user_id(&self) -> Option<UserId> {
        self.user_id
    }

    pub async fn current_user(&self) -> Result<Option<UserData>, AppError> {
        let Some(id) = self.user_id else {
            return Ok(None);
        };

        let user = self
            .user
            .get_or_try_init(|| self.store.user(id))
            .await?;

        Ok(user.clone())
    }
}

#[derive(Debug, Clone)]
pub struct CurrentUser(pub UserData);

pub async fn resolve_session(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Response {
    let jar = CookieJar::from_headers(request.headers());
    let session = Session::from_cookies(&jar, &state.signer, state.store.clone());

    request.extensions_mut().insert(session);
    next.run(request).await
}

pub async fn require_login(
    Extension(session): Extension<Session>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let user = session.current_user().await?.ok_or(AppError::Unauthorized)?;

    request.extensions_mut().insert(CurrentUser(user));
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use axum_extra::extract::cookie::Cookie;

    use super::*;
    use crate::{
        memory::MemoryStore,
        models::{Feedback, FeedbackKey, Meal},
        store::{ApplyFn, StoreError, TxnOutcome},
    };

    #[derive(Default)]
    struct CountingStore {
        inner: MemoryStore,
        user_lookups: AtomicUsize,
    }

    #[async_trait]
    impl Store for CountingStore {
        async fn user(&self, id: UserId) -> Result<Option<UserData>, StoreError> {
            self.user_lookups.fetch_add(1, Ordering::SeqCst);
            self.inner.user(id).await
        }

        async fn put_user(&self, user: &UserData) -> Result<(), StoreError> {
            self.inner.put_user(user).await
        }

        async fn meal(&self, id: &str) -> Result<Option<Meal>, StoreError> {
            self.inner.meal(id).await
        }

        async fn put_meal(&self, meal: &Meal) -> Result<(), StoreError> {
            self.inner.put_meal(meal).await
        }

        async fn feedback(&self, key: &FeedbackKey) -> Result<Option<Feedback>, StoreError> {
            self.inner.feedback(key).await
        }

        async fn meal_feedback(&self, meal_id: &str) -> Result<Vec<Feedback>, StoreError> {
            self.inner.meal_feedback(meal_id).await
        }

        async fn try_write_feedback(
            &self,
            key: &FeedbackKey,
            apply: ApplyFn<'_>,
        ) -> Result<TxnOutcome, StoreError> {
            self.inner.try_write_feedback(key, apply).await
        }
    }

    fn signer() -> CookieSigner {
        CookieSigner::new(b"session-test").unwrap()
    }

    fn signed_jar(signer: &CookieSigner, value: &str) -> CookieJar {
        CookieJar::new()
            .add(Cookie::new("sid", value.to_string()))
            .add(Cookie::new("sid_sig", signer.sign("sid", value)))
    }

    fn ada() -> UserData {
        UserData {
            id: 7,
            full_name: "Ada".to_string(),
        }
    }

    #[tokio::test]
    async fn test_no_cookies_is_anonymous() {
        let store = Arc::new(CountingStore::default());
        let session = Session::from_cookies(&CookieJar::new(), &signer(), store.clone());

        assert_eq!(session.user_id(), None);
        assert_eq!(session.current_user().await.unwrap(), None);
        assert_eq!(store.user_lookups.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_forged_cookie_is_anonymous() {
        let store = Arc::new(CountingStore::default());
        store.put_user(&ada()).await.unwrap();

        let jar = CookieJar::new()
            .add(Cookie::new("sid", "7"))
            .add(Cookie::new("sid_sig", signer().sign("sid", "8")));
        let session = Session::from_cookies(&jar, &signer(), store.clone());

        assert_eq!(session.user_id(), None);
        assert_eq!(session.current_user().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_signed_non_numeric_value_is_anonymous() {
        let signer = signer();
        let session = Session::from_cookies(
            &signed_jar(&signer, "seven"),
            &signer,
            Arc::new(MemoryStore::new()),
        );

        assert_eq!(session.user_id(), None);
    }

    #[tokio::test]
    async fn test_user_is_fetched_once() {
        let signer = signer();
        let store = Arc::new(CountingStore::default());
        store.put_user(&ada()).await.unwrap();

        let session = Session::from_cookies(&signed_jar(&signer, "7"), &signer, store.clone());
        assert_eq!(session.user_id(), Some(7));
        assert_eq!(store.user_lookups.load(Ordering::SeqCst), 0);

        let copy = session.clone();
        assert_eq!(session.current_user().await.unwrap(), Some(ada()));
        assert_eq!(copy.current_user().await.unwrap(), Some(ada()));
        assert_eq!(store.user_lookups.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_missing_user_is_cached_for_the_request() {
        let signer = signer();
        let store = Arc::new(CountingStore::default());

        let session = Session::from_cookies(&signed_jar(&signer, "7"), &signer, store.clone());
        assert_eq!(session.current_user().await.unwrap(), None);

        store.put_user(&ada()).await.unwrap();
        assert_eq!(session.current_user().await.unwrap(), None);
        assert_eq!(store.user_lookups.load(Ordering::SeqCst), 1);

        let next_request = Session::from_cookies(&signed_jar(&signer, "7"), &signer, store.clone());
        assert_eq!(next_request.current_user().await.unwrap(), Some(ada()));
    }
}

#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{HeaderMap, Request, Response, header},
};
use chrono::{TimeZone, Utc};
use meals::{
    app,
    config::Config,
    memory::MemoryStore,
    models::{Meal, UserData},
    signing::CookieSigner,
    state::AppState,
    store::Store,
};
use tower::ServiceExt;

pub const SECRET: &[u8] = b"integration-secret";

pub struct TestApp {
    pub router: Router,
    pub store: Arc<MemoryStore>,
    pub signer: CookieSigner,
}

impl TestApp {
    pub async fn new() -> Self {
        let store = Arc::new(MemoryStore::new());

        store
            .put_user(&UserData {
                id: 7,
                full_name: "Ada".to_string(),
            })
            .await
            .unwrap();
        store
            .put_user(&UserData {
                id: 8,
                full_name: "Grace".to_string(),
            })
            .await
            .unwrap();
        store
            .put_meal(&Meal {
                id: "abc".to_string(),
                title: "Dinner".to_string(),
                dt: Utc.with_ymd_and_hms(2025, 11, 14, 18, 0, 0).unwrap(),
            })
            .await
            .unwrap();

        let state = Arc::new(AppState {
            config: Config::default(),
            signer: CookieSigner::new(SECRET).unwrap(),
            store: store.clone(),
        });

        Self {
            router: app(state),
            store,
            signer: CookieSigner::new(SECRET).unwrap(),
        }
    }

    pub fn session_cookie(&self, user_id: &str) -> String {
        format!("sid={user_id}; sid_sig={}", self.signer.sign("sid", user_id))
    }

    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router.clone().oneshot(request).await.unwrap()
    }

    pub async fn get(&self, uri: &str, cookie: Option<&str>) -> Response<Body> {
        let mut request = Request::builder().uri(uri);
        if let Some(cookie) = cookie {
            request = request.header(header::COOKIE, cookie);
        }

        self.send(request.body(Body::empty()).unwrap()).await
    }

    pub async fn post_form(&self, uri: &str, cookie: Option<&str>, form: &str) -> Response<Body> {
        let mut request = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
        if let Some(cookie) = cookie {
            request = request.header(header::COOKIE, cookie);
        }

        self.send(request.body(Body::from(form.to_string())).unwrap())
            .await
    }
}

pub async fn body_text(response: Response<Body>) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

pub fn set_cookies(headers: &HeaderMap) -> Vec<String> {
    headers
        .get_all(header::SET_COOKIE)
        .iter()
        .map(|value| value.to_str().unwrap().to_string())
        .collect()
}

pub fn location(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::LOCATION)
        .map(|value| value.to_str().unwrap())
}

//! # Login Handshake
//!
//! Users never type a password. They receive a link out-of-band (email, chat)
//! carrying a signed user id:
//!
//! ```text
//! /login?sid=42&sid_sig=<hex>&continue=/meals/abc
//! ```
//!
//! Opening it verifies the pair against our own key, sets the long-lived
//! `sid` / `sid_sig` cookies and redirects to `continue`.
//!
//! ## Notes
//! - `continue` must start with `/`, so the redirect stays on this host, and
//!   must fit in a `Location` header
//! - A repeated parameter keeps its first value
//! - The cookie signature is recomputed here, never copied from the link
//! - Links are not one-time use; replaying one just sets the same cookies
//!   again, so a leaked link stays valid for as long as the key does
use std::sync::Arc;

use axum::{
    extract::{RawQuery, State},
    http::{HeaderValue, StatusCode, header::LOCATION},
    response::IntoResponse,
};
use axum_extra::extract::cookie::CookieJar;
use time::OffsetDateTime;
use tracing::{debug, info};

use crate::{
    error::AppError,
    models::UserId,
    session::SESSION_COOKIE,
    signing::{CookieSigner, SIGNATURE_SUFFIX, set_signed_cookie},
    state::AppState,
};

#[derive(Default)]
pub struct LoginParams {
    sid: Option<String>,
    sid_sig: Option<String>,
    continue_path: Option<String>,
}

impl LoginParams {
    /// First value wins when a parameter repeats, unknown parameters are ignored.
    fn from_query(query: Option<&str>) -> Result<Self, AppError> {
        let pairs: Vec<(String, String)> = serde_urlencoded::from_str(query.unwrap_or_default())
            .map_err(|_| AppError::MissingCredential)?;

        let mut params = Self::default();
        for (name, value) in pairs {
            let slot = match name.as_str() {
                "sid" => &mut params.sid,
                "sid_sig" => &mut params.sid_sig,
                "continue" => &mut params.continue_path,
                _ => continue,
            };
            slot.get_or_insert(value);
        }

        Ok(params)
    }
}

/// Checks the handshake parameters, returning the trusted value and the
/// `Location` to send the user to next.
fn check_handshake(
    signer: &CookieSigner,
    params: LoginParams,
) -> Result<(String, HeaderValue), AppError> {
    let value = params.sid.unwrap_or_default();
    let signature = params.sid_sig.unwrap_or_default();
    let continue_path = params.continue_path.unwrap_or_else(|| "/".to_string());

    if value.is_empty() || signature.is_empty() {
        return Err(AppError::MissingCredential);
    }

    if !continue_path.starts_with('/') {
        return Err(AppError::OpenRedirectRejected);
    }

    let location = HeaderValue::from_bytes(continue_path.as_bytes())
        .map_err(|_| AppError::OpenRedirectRejected)?;

    if !signer.verify(SESSION_COOKIE, &value, &signature) {
        return Err(AppError::SignatureInvalid);
    }

    Ok((value, location))
}

pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    RawQuery(query): RawQuery,
) -> Result<impl IntoResponse, AppError> {
    let (value, location) = LoginParams::from_query(query.as_deref())
        .and_then(|params| check_handshake(&state.signer, params))
        .inspect_err(|e| debug!("Login rejected: {e:?}"))?;

    let jar = set_signed_cookie(
        jar,
        &state.signer,
        SESSION_COOKIE,
        &value,
        OffsetDateTime::now_utc(),
    );

    info!("Session issued for {SESSION_COOKIE}={value}, continuing to {location:?}");

    Ok((StatusCode::FOUND, jar, [(LOCATION, location)]))
}

/// Builds the link handed to a user so they can log in.
pub fn login_link(
    signer: &CookieSigner,
    base_url: &str,
    user_id: UserId,
    continue_path: &str,
) -> Result<String, serde_urlencoded::ser::Error> {
    let value = user_id.to_string();
    let signature = signer.sign(SESSION_COOKIE, &value);
    let signature_param = format!("{SESSION_COOKIE}{SIGNATURE_SUFFIX}");

    let query = serde_urlencoded::to_string(&[
        (SESSION_COOKIE, value.as_str()),
        (signature_param.as_str(), signature.as_str()),
        ("continue", continue_path),
    ])?;

    Ok(format!("{}/login?{query}", base_url.trim_end_matches('/')))
}

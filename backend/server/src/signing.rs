//! # Signed Cookies
//!
//! Every cookie the server trusts travels as a pair: the value under its own
//! name, and an HMAC-SHA256 hex digest of `name|value` under `<name>_sig`.
//!
//! - The secret key lives only inside [`CookieSigner`]
//! - Signatures are lowercase hex, 64 chars
//! - A pair is trusted only if the digest matches what we would sign ourselves
//!
//! ## Comparison
//!
//! Digests of equal length are compared without short-circuiting on the first
//! differing byte. A length mismatch returns early; the length of our own
//! digest is public anyway.
use std::fmt;

use axum_extra::extract::cookie::{Cookie, CookieJar};
use hmac::{Hmac, Mac, digest::InvalidLength};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;
use time::{Duration, OffsetDateTime};
use tracing::debug;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_SUFFIX: &str = "_sig";

pub const COOKIE_LIFETIME: Duration = Duration::days(365);

#[derive(Error, Debug)]
pub enum SignerError {
    #[error("Signing secret is empty")]
    EmptySecret,

    #[error("Invalid signing key: {0}")]
    InvalidKey(#[from] InvalidLength),
}

#[derive(Clone)]
pub struct CookieSigner {
    mac: HmacSha256,
}

impl CookieSigner {
    pub fn new(secret: &[u8]) -> Result<Self, SignerError> {
        if secret.is_empty() {
            return Err(SignerError::EmptySecret);
        }

        Ok(Self {
            mac: HmacSha256::new_from_slice(secret)?,
        })
    }

    pub fn sign(&self, name: &str, value: &str) -> String {
        let mut mac = self.mac.clone();
        mac.update(name.as_bytes());
        mac.update(b"|");
        mac.update(value.as_bytes());

        hex::encode(mac.finalize().into_bytes())
    }

    pub fn verify(&self, name: &str, value: &str, signature: &str) -> bool {
        let expected = self.sign(name, value);

        if expected.len() != signature.len() {
            return false;
        }

        expected.as_bytes().ct_eq(signature.as_bytes()).into()
    }
}

impl fmt::Debug for CookieSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CookieSigner").finish_non_exhaustive()
    }
}

pub fn signature_cookie_name(name: &str) -> String {
    format!("{name}{SIGNATURE_SUFFIX}")
}

/// Returns the value of `name` only if both halves of the pair are present
/// and the signature checks out.
pub fn read_signed_cookie(jar: &CookieJar, signer: &CookieSigner, name: &str) -> Option<String> {
    let value = jar.get(name)?.value();
    let signature = jar.get(&signature_cookie_name(name))?.value();

    if value.is_empty() || signature.is_empty() {
        return None;
    }

    if !signer.verify(name, value, signature) {
        debug!("Rejected signature for cookie {name}");
        return None;
    }

    Some(value.to_string())
}

pub fn set_signed_cookie(
    jar: CookieJar,
    signer: &CookieSigner,
    name: &str,
    value: &str,
    now: OffsetDateTime,
) -> CookieJar {
    let signature = signer.sign(name, value);
    let expires = now + COOKIE_LIFETIME;

    jar.add(
        Cookie::build((name.to_string(), value.to_string()))
            .path("/")
            .expires(expires),
    )
    .add(
        Cookie::build((signature_cookie_name(name), signature))
            .path("/")
            .expires(expires),
    )
}

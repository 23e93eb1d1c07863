//! Voter and admin identity cookies.
//!
//! A voter is an opaque identifier minted server-side on first contact and
//! echoed back by the client on every later request. The request that arrives
//! without one is still served; its response just carries the `Set-Cookie`.
//! The identity is client-trusted, it only has to be stable, not
//! tamper-proof.

use axum::http::{header::COOKIE, HeaderMap, HeaderValue};
use uuid::Uuid;

pub const VOTER_COOKIE: &str = "voter_id";
pub const ADMIN_COOKIE: &str = "admin_session";

const VOTER_COOKIE_MAX_AGE_SECS: i64 = 365 * 24 * 60 * 60;

/// First cookie named `name` across all `Cookie` headers.
pub fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .find_map(|pair| {
            let (k, v) = pair.trim().split_once('=')?;
            (k == name && !v.is_empty()).then(|| v.to_string())
        })
}

#[derive(Debug, Clone)]
pub struct Voter {
    pub id: String,
    minted: bool,
}

impl Voter {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        match cookie_value(headers, VOTER_COOKIE) {
            Some(id) => Self { id, minted: false },
            None => Self {
                id: Uuid::new_v4().to_string(),
                minted: true,
            },
        }
    }

    /// `Set-Cookie` value for a freshly minted identity, `None` when the
    /// client already presented one.
    pub fn issue_cookie(&self) -> Option<HeaderValue> {
        if !self.minted {
            return None;
        }

        HeaderValue::from_str(&format!(
            "{VOTER_COOKIE}={}; Path=/; Max-Age={VOTER_COOKIE_MAX_AGE_SECS}; HttpOnly; SameSite=Lax",
            self.id
        ))
        .ok()
    }
}

/// Session-scoped cookie carrying an admin token.
pub fn admin_cookie(token: &str) -> Option<HeaderValue> {
    HeaderValue::from_str(&format!(
        "{ADMIN_COOKIE}={token}; Path=/; HttpOnly; SameSite=Lax"
    ))
    .ok()
}

pub fn clear_admin_cookie() -> HeaderValue {
    HeaderValue::from_static("admin_session=; Path=/; Max-Age=0")
}

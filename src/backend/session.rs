//! Mutable state of one authenticated backend session.
//!
//! The state only changes through [`SessionState::merge_cookies`] and
//! [`SessionState::store_token`]. The owning session is itself held behind an
//! async mutex by the orchestrator, so these transitions never race.

use std::time::{Duration, Instant};

/// How long a fetched anti-forgery token is reused.
pub const TOKEN_TTL: Duration = Duration::from_secs(60);

/// Cookies in first-seen order. Setting a known name replaces its value in place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CookieJar {
    cookies: Vec<(String, String)>,
}

impl CookieJar {
    pub fn set(&mut self, name: &str, value: &str) {
        match self.cookies.iter_mut().find(|(n, _)| n == name) {
            Some(slot) => slot.1 = value.to_string(),
            None => self.cookies.push((name.to_string(), value.to_string())),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.cookies
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn len(&self) -> usize {
        self.cookies.len()
    }

    /// Value for the `Cookie` request header.
    pub fn header_value(&self) -> String {
        self.cookies
            .iter()
            .map(|(n, v)| format!("{n}={v}"))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    expires_at: Instant,
}

/// Cookies plus the cached anti-forgery token.
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    cookies: CookieJar,
    token: Option<CachedToken>,
}

impl SessionState {
    /// State right after a successful login.
    pub fn authenticated<'a>(cookies: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let mut state = Self::default();
        state.merge_cookies(cookies);
        state
    }

    /// Merge cookies set by a response: replace known names, append new ones.
    pub fn merge_cookies<'a>(&mut self, cookies: impl IntoIterator<Item = (&'a str, &'a str)>) {
        for (name, value) in cookies {
            self.cookies.set(name, value);
        }
    }

    pub fn cookies(&self) -> &CookieJar {
        &self.cookies
    }

    /// The cached token if it has not expired at `now`.
    pub fn valid_token(&self, now: Instant) -> Option<&str> {
        self.token
            .as_ref()
            .filter(|t| now < t.expires_at)
            .map(|t| t.value.as_str())
    }

    /// Cache a freshly fetched token. Empty tokens are never cached.
    pub fn store_token(&mut self, value: String, now: Instant) {
        if value.is_empty() {
            return;
        }
        self.token = Some(CachedToken {
            value,
            expires_at: now + TOKEN_TTL,
        });
    }
}

//! Login gate: credential check with lockout, in-memory sessions, and the
//! static API token accepted by the socket and API routes.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
    Json,
};
use rand::RngCore;
use tracing::warn;

use crate::state::AppState;
use crate::types::ActionOutcome;

pub const SESSION_COOKIE: &str = "hostdash_session";

#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn matches(&self, username: &str, password: &str) -> bool {
        // compare both fields fully so timing does not reveal which one failed
        let u = ct_eq(self.username.as_bytes(), username.as_bytes());
        let p = ct_eq(self.password.as_bytes(), password.as_bytes());
        u & p
    }
}

fn ct_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

// ---------- Lockout ----------

/// Upper bound on tracked usernames; anyone can post arbitrary names.
pub const MAX_TRACKED_LOGINS: usize = 4096;

#[derive(Debug, Clone, Copy)]
struct Attempts {
    failures: u32,
    last_failure: Instant,
    locked_until: Option<Instant>,
}

impl Attempts {
    fn locked_at(&self, now: Instant) -> bool {
        self.locked_until.is_some_and(|until| now < until)
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum LoginError {
    BadCredentials { remaining: u32 },
    Locked { retry_after: Duration },
}

/// Failed-attempt tracker: `max_failures` in a row locks the key for
/// `lockout`; the lock lapses on its own once the duration has passed.
/// Unlocked failures older than `lockout` are forgotten.
pub struct LoginLimiter {
    max_failures: u32,
    lockout: Duration,
    capacity: usize,
    entries: Mutex<HashMap<String, Attempts>>,
}

impl LoginLimiter {
    pub fn new(max_failures: u32, lockout: Duration) -> Self {
        Self {
            max_failures: max_failures.max(1),
            lockout,
            capacity: MAX_TRACKED_LOGINS,
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn stale(&self, a: &Attempts, now: Instant) -> bool {
        match a.locked_until {
            Some(until) => now >= until,
            None => now.saturating_duration_since(a.last_failure) >= self.lockout,
        }
    }

    /// Refuses while locked; forgets an expired lock.
    pub fn check(&self, key: &str, now: Instant) -> Result<(), LoginError> {
        let mut map = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(a) = map.get(key).copied() {
            if let Some(until) = a.locked_until.filter(|until| now < *until) {
                return Err(LoginError::Locked {
                    retry_after: until - now,
                });
            }
            if self.stale(&a, now) {
                map.remove(key);
            }
        }
        Ok(())
    }

    pub fn record_failure(&self, key: &str, now: Instant) -> LoginError {
        let mut map = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        map.retain(|_, a| !self.stale(a, now));

        if !map.contains_key(key) && map.len() >= self.capacity {
            // make room by forgetting the oldest unlocked name; locks are kept
            let oldest = map
                .iter()
                .filter(|(_, a)| !a.locked_at(now))
                .min_by_key(|(_, a)| a.last_failure)
                .map(|(k, _)| k.clone());
            match oldest {
                Some(k) => {
                    map.remove(&k);
                }
                None => {
                    // table full of live locks: refuse untracked names too
                    let retry_after = map
                        .values()
                        .filter_map(|a| a.locked_until)
                        .min()
                        .map_or(self.lockout, |until| until.saturating_duration_since(now));
                    warn!(user = key, "login table full of locked names");
                    return LoginError::Locked { retry_after };
                }
            }
        }

        let a = map.entry(key.to_string()).or_insert(Attempts {
            failures: 0,
            last_failure: now,
            locked_until: None,
        });
        a.failures += 1;
        a.last_failure = now;
        if a.failures >= self.max_failures {
            a.locked_until = Some(now + self.lockout);
            warn!(user = key, "login locked after {} failures", a.failures);
            LoginError::Locked {
                retry_after: self.lockout,
            }
        } else {
            LoginError::BadCredentials {
                remaining: self.max_failures - a.failures,
            }
        }
    }

    pub fn record_success(&self, key: &str) {
        let mut map = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        map.remove(key);
    }

    /// Full login step: lock check, credential check, bookkeeping.
    pub fn attempt(
        &self,
        creds: &Credentials,
        username: &str,
        password: &str,
        now: Instant,
    ) -> Result<(), LoginError> {
        self.check(username, now)?;
        if creds.matches(username, password) {
            self.record_success(username);
            Ok(())
        } else {
            Err(self.record_failure(username, now))
        }
    }

    #[cfg(test)]
    fn tracked(&self) -> usize {
        self.entries.lock().unwrap_or_else(|p| p.into_inner()).len()
    }
}

// ---------- Sessions ----------

#[derive(Debug, Clone)]
pub struct Session {
    pub username: String,
    expires_at: Instant,
}

pub struct SessionStore {
    ttl: Duration,
    sessions: Mutex<HashMap<String, Session>>,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn create(&self, username: &str, now: Instant) -> String {
        let mut raw = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut raw);
        let token: String = raw.iter().map(|b| format!("{b:02x}")).collect();
        let mut map = self.sessions.lock().unwrap_or_else(|p| p.into_inner());
        // drop expired entries while we hold the lock anyway
        map.retain(|_, s| s.expires_at > now);
        map.insert(
            token.clone(),
            Session {
                username: username.to_string(),
                expires_at: now + self.ttl,
            },
        );
        token
    }

    pub fn get(&self, token: &str, now: Instant) -> Option<Session> {
        let mut map = self.sessions.lock().unwrap_or_else(|p| p.into_inner());
        match map.get(token) {
            Some(s) if s.expires_at > now => Some(s.clone()),
            Some(_) => {
                map.remove(token);
                None
            }
            None => None,
        }
    }

    pub fn remove(&self, token: &str) {
        let mut map = self.sessions.lock().unwrap_or_else(|p| p.into_inner());
        map.remove(token);
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}

// ---------- Request helpers ----------

pub fn session_cookie(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|kv| kv.trim().split_once('='))
        .find(|(k, _)| *k == SESSION_COOKIE)
        .map(|(_, v)| v.to_string())
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

fn query_token(query: Option<&str>) -> Option<&str> {
    query?
        .split('&')
        .filter_map(|kv| kv.split_once('='))
        .find(|(k, _)| *k == "token")
        .map(|(_, v)| v)
}

/// Session cookie, bearer header, or `?token=` (for websocket clients that
/// cannot set headers).
pub fn is_authorized(state: &AppState, headers: &HeaderMap, query: Option<&str>) -> bool {
    if let Some(expected) = state.api_token.as_deref() {
        let given = bearer_token(headers).or_else(|| query_token(query));
        if given.is_some_and(|t| ct_eq(t.as_bytes(), expected.as_bytes())) {
            return true;
        }
    }
    session_cookie(headers)
        .and_then(|t| state.sessions.get(&t, Instant::now()))
        .is_some()
}

pub async fn require_auth(State(state): State<AppState>, req: Request, next: Next) -> Response {
    if is_authorized(&state, req.headers(), req.uri().query()) {
        return next.run(req).await;
    }
    let path = req.uri().path();
    if path.starts_with("/api/") || path == "/ws" {
        (
            StatusCode::UNAUTHORIZED,
            Json(ActionOutcome::failed("authentication required")),
        )
            .into_response()
    } else {
        Redirect::to("/login").into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn creds() -> Credentials {
        Credentials {
            username: "admin".into(),
            password: "s3cret".into(),
        }
    }

    #[test]
    fn locks_after_threshold_and_refuses_correct_password() {
        let lim = LoginLimiter::new(3, Duration::from_secs(60));
        let t0 = Instant::now();
        assert_eq!(
            lim.attempt(&creds(), "admin", "x", t0),
            Err(LoginError::BadCredentials { remaining: 2 })
        );
        assert!(lim.attempt(&creds(), "admin", "x", t0).is_err());
        assert!(matches!(
            lim.attempt(&creds(), "admin", "x", t0),
            Err(LoginError::Locked { .. })
        ));
        assert!(matches!(
            lim.attempt(&creds(), "admin", "s3cret", t0 + Duration::from_secs(30)),
            Err(LoginError::Locked { retry_after }) if retry_after == Duration::from_secs(30)
        ));
    }

    #[test]
    fn lock_expires_on_its_own() {
        let lim = LoginLimiter::new(1, Duration::from_secs(10));
        let t0 = Instant::now();
        assert!(lim.attempt(&creds(), "admin", "nope", t0).is_err());
        assert!(lim.check("admin", t0 + Duration::from_secs(5)).is_err());
        assert_eq!(
            lim.attempt(&creds(), "admin", "s3cret", t0 + Duration::from_secs(11)),
            Ok(())
        );
    }

    #[test]
    fn success_resets_the_counter() {
        let lim = LoginLimiter::new(2, Duration::from_secs(10));
        let t0 = Instant::now();
        assert!(lim.attempt(&creds(), "admin", "bad", t0).is_err());
        assert!(lim.attempt(&creds(), "admin", "s3cret", t0).is_ok());
        assert_eq!(
            lim.attempt(&creds(), "admin", "bad", t0),
            Err(LoginError::BadCredentials { remaining: 1 })
        );
    }

    #[test]
    fn random_usernames_do_not_grow_the_table_forever() {
        let lim = LoginLimiter::new(5, Duration::from_secs(900));
        let t0 = Instant::now();
        for i in 0..20_000 {
            let _ = lim.attempt(&creds(), &format!("user{i}"), "x", t0);
        }
        assert!(lim.tracked() <= MAX_TRACKED_LOGINS);

        let later = t0 + Duration::from_secs(3600);
        let _ = lim.attempt(&creds(), "someone", "x", later);
        assert_eq!(lim.tracked(), 1);
    }

    #[test]
    fn full_table_keeps_existing_locks() {
        let mut lim = LoginLimiter::new(1, Duration::from_secs(60));
        lim.capacity = 2;
        let t0 = Instant::now();
        assert!(lim.attempt(&creds(), "admin", "x", t0).is_err());
        assert!(lim.attempt(&creds(), "a", "x", t0).is_err());
        // no unlocked entry to evict: the newcomer is refused, admin stays locked
        assert!(matches!(
            lim.attempt(&creds(), "b", "x", t0),
            Err(LoginError::Locked { .. })
        ));
        assert!(lim.check("admin", t0 + Duration::from_secs(1)).is_err());
        assert_eq!(lim.tracked(), 2);
    }

    #[test]
    fn old_unlocked_failures_are_forgotten() {
        let lim = LoginLimiter::new(2, Duration::from_secs(10));
        let t0 = Instant::now();
        assert!(lim.attempt(&creds(), "admin", "x", t0).is_err());
        assert_eq!(
            lim.attempt(&creds(), "admin", "x", t0 + Duration::from_secs(11)),
            Err(LoginError::BadCredentials { remaining: 1 })
        );
    }

    #[test]
    fn keys_are_tracked_independently() {
        let lim = LoginLimiter::new(1, Duration::from_secs(10));
        let t0 = Instant::now();
        assert!(lim.attempt(&creds(), "mallory", "x", t0).is_err());
        assert!(lim.attempt(&creds(), "admin", "s3cret", t0).is_ok());
    }

    #[test]
    fn sessions_expire() {
        let store = SessionStore::new(Duration::from_secs(5));
        let t0 = Instant::now();
        let tok = store.create("admin", t0);
        assert_eq!(tok.len(), 64);
        assert_eq!(store.get(&tok, t0).unwrap().username, "admin");
        assert!(store.get(&tok, t0 + Duration::from_secs(6)).is_none());
        assert!(store.get("bogus", t0).is_none());
    }

    #[test]
    fn logout_removes_session() {
        let store = SessionStore::new(Duration::from_secs(60));
        let t0 = Instant::now();
        let tok = store.create("admin", t0);
        store.remove(&tok);
        assert!(store.get(&tok, t0).is_none());
    }

    #[test]
    fn finds_session_cookie_among_others() {
        let mut h = HeaderMap::new();
        h.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; hostdash_session=abc123; lang=en"),
        );
        assert_eq!(session_cookie(&h).as_deref(), Some("abc123"));
    }

    #[test]
    fn token_from_query_or_bearer() {
        assert_eq!(query_token(Some("a=1&token=xyz")), Some("xyz"));
        assert_eq!(query_token(Some("tok=1")), None);
        let mut h = HeaderMap::new();
        h.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer t0k"));
        assert_eq!(bearer_token(&h), Some("t0k"));
    }
}
